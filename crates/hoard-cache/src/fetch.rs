//! The fetch callback contract.
//!
//! A [`FetchHandler`] is registered when an object is created. The engine
//! invokes it to ask for the object to be (re)populated; the handler reports
//! progress back through the object's own operations (`add_data`,
//! `mark_partial`, `finish_fetch`, `abort`). The engine never parses or
//! produces wire bytes.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::object::Object;

/// Opaque handle identifying the request on whose behalf a fetch runs.
pub type RequestHandle = Rc<dyn Any>;

/// What the handler is asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchOp {
    /// Fetch body bytes.
    Get,
    /// Fetch headers only.
    Head,
    /// Revalidate a stale copy with the origin.
    ConditionalGet,
}

/// Arguments of a fetch request.
#[derive(Clone)]
pub struct FetchRequest {
    pub op: FetchOp,
    /// First body byte wanted.
    pub offset: usize,
    /// Bytes wanted from `offset`; `None` means up to the end.
    pub length: Option<usize>,
    pub requestor: Option<RequestHandle>,
}

impl FetchRequest {
    /// A full-body request.
    pub fn get() -> Self {
        Self {
            op: FetchOp::Get,
            offset: 0,
            length: None,
            requestor: None,
        }
    }

    /// A conditional revalidation request.
    pub fn conditional() -> Self {
        Self {
            op: FetchOp::ConditionalGet,
            ..Self::get()
        }
    }

    /// A ranged request for `length` bytes at `offset`.
    pub fn range(offset: usize, length: Option<usize>) -> Self {
        Self {
            offset,
            length,
            ..Self::get()
        }
    }

    pub fn with_requestor(mut self, requestor: RequestHandle) -> Self {
        self.requestor = Some(requestor);
        self
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("op", &self.op)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("has_requestor", &self.requestor.is_some())
            .finish()
    }
}

/// Handler's answer to a fetch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchOutcome {
    /// Work started; progress will be reported later.
    Pending,
    /// Already satisfied synchronously.
    Completed,
    /// The handler declined; the object is not in progress.
    Refused,
}

/// Collaborator that populates objects.
///
/// Closures of the matching shape implement this directly; whatever they
/// capture plays the role of the handler's private state.
pub trait FetchHandler {
    fn request(&mut self, object: &Object, request: &FetchRequest) -> FetchOutcome;
}

impl<F> FetchHandler for F
where
    F: FnMut(&Object, &FetchRequest) -> FetchOutcome,
{
    fn request(&mut self, object: &Object, request: &FetchRequest) -> FetchOutcome {
        self(object, request)
    }
}
