use crate::object::Object;
use crate::status::Notification;

/// Single-shot callback woken by `Object::notify` or `Object::abort`.
///
/// A waiter that still needs more data registers itself again. Waiters get
/// the object as an argument and should not capture a strong handle to it.
pub type Waiter = Box<dyn FnOnce(&Object, Notification)>;

/// Registration handle, used to cancel a waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// Ordered registry of pending waiters.
#[derive(Default)]
pub(crate) struct WaiterList {
    next_id: u64,
    waiters: Vec<(WaiterId, Waiter)>,
}

impl WaiterList {
    pub(crate) fn register(&mut self, waiter: Waiter) -> WaiterId {
        self.next_id += 1;
        let id = WaiterId(self.next_id);
        self.waiters.push((id, waiter));
        id
    }

    pub(crate) fn cancel(&mut self, id: WaiterId) -> bool {
        match self.waiters.iter().position(|(w, _)| *w == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Remove and return every waiter in registration order.
    pub(crate) fn take(&mut self) -> Vec<(WaiterId, Waiter)> {
        std::mem::take(&mut self.waiters)
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}
