//! Timer registration seam.
//!
//! The cache never polls or sleeps. It hands callbacks to a [`Scheduler`]
//! owned by the host event loop: a periodic reclaim handler and one-shot
//! deferred reclaims.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Identifier of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

pub type PeriodicTask = Box<dyn FnMut()>;
pub type OnceTask = Box<dyn FnOnce()>;

/// External event scheduler.
pub trait Scheduler {
    /// Run `task` every `interval` until cancelled.
    fn schedule_periodic(&mut self, interval: Duration, task: PeriodicTask) -> TimerId;

    /// Run `task` once after `delay`.
    fn schedule_once(&mut self, delay: Duration, task: OnceTask) -> TimerId;

    /// Cancel a timer. Returns `true` if it was still pending.
    fn cancel(&mut self, id: TimerId) -> bool;
}

enum TimerTask {
    Once(OnceTask),
    Periodic {
        interval: Duration,
        task: PeriodicTask,
    },
}

struct Timer {
    due: Duration,
    task: TimerTask,
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
}

impl SchedulerState {
    fn insert(&mut self, due: Duration, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.insert(id, Timer { due, task });
        id
    }

    /// Earliest timer due at or before `limit`, ties broken by id.
    fn pop_due(&mut self, limit: Duration) -> Option<(TimerId, Timer)> {
        let id = self
            .timers
            .iter()
            .filter(|(_, t)| t.due <= limit)
            .min_by_key(|(id, t)| (t.due, **id))
            .map(|(id, _)| *id)?;
        self.timers.remove(&id).map(|t| (id, t))
    }
}

/// Deterministic scheduler driven by virtual time.
///
/// Clones share the same timer queue, so a test can keep one clone while the
/// cache owns another. Tasks run on the caller's stack inside
/// [`advance`](ManualScheduler::advance) and may schedule further timers.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward by `by`, running every task that falls due
    /// in order. Returns how many task invocations ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.borrow().now + by;
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().pop_due(target);
            let Some((id, timer)) = next else {
                break;
            };
            self.state.borrow_mut().now = timer.due;
            ran += 1;
            match timer.task {
                TimerTask::Once(task) => task(),
                TimerTask::Periodic { interval, mut task } => {
                    task();
                    let due = timer.due + interval;
                    self.state.borrow_mut().timers.insert(
                        id,
                        Timer {
                            due,
                            task: TimerTask::Periodic { interval, task },
                        },
                    );
                }
            }
        }
        self.state.borrow_mut().now = target;
        ran
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.borrow().now
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_periodic(&mut self, interval: Duration, task: PeriodicTask) -> TimerId {
        let interval = interval.max(Duration::from_millis(1));
        let mut state = self.state.borrow_mut();
        let due = state.now + interval;
        state.insert(due, TimerTask::Periodic { interval, task })
    }

    fn schedule_once(&mut self, delay: Duration, task: OnceTask) -> TimerId {
        let mut state = self.state.borrow_mut();
        let due = state.now + delay;
        state.insert(due, TimerTask::Once(task))
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        self.state.borrow_mut().timers.remove(&id).is_some()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.timers.len())
            .finish()
    }
}
