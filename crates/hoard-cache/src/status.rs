//! Object lifecycle vocabulary.

/// Where an object is in its fetch lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created; no headers yet.
    Initial,
    /// Headers known; body may be partial.
    Ready,
    /// Permanently failed. Terminal.
    Aborted,
}

/// Who may use an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Shared through the object table.
    Public,
    /// Requestor-exclusive, not in the table.
    Private,
    /// Private and usable only by the one requestor that created it.
    Linear,
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }
}

/// Snapshot of an object's status: one phase plus orthogonal flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectStatus {
    pub phase: Phase,
    pub visibility: Visibility,
    /// A fetch is populating the object.
    pub in_progress: bool,
    /// A conditional revalidation is in flight.
    pub validating: bool,
    /// Unreachable through lookup; kept alive by existing holders.
    pub superseded: bool,
    /// The last fetch failed transiently.
    pub failed: bool,
    /// Backed by a local resource rather than fetched.
    pub local: bool,
    /// The disk copy is fully written.
    pub disk_entry_complete: bool,
    /// Suspected dynamic; exempt from predictive logic and watermark eviction.
    pub dynamic: bool,
    /// Body is being rewritten; readers must wait.
    pub mutating: bool,
}

impl ObjectStatus {
    pub fn is_initial(&self) -> bool {
        self.phase == Phase::Initial
    }

    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    pub fn is_public(&self) -> bool {
        self.visibility.is_public()
    }
}

/// Whether the materialized body covers the declared length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Completeness {
    /// Every byte up to the declared length is present.
    Complete,
    /// Bytes are missing, or the length is not yet known.
    Partial,
}

/// Where a byte range can be served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Residency {
    Memory,
    Disk,
    Missing,
}

/// What a waiter is told when it is woken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Notification {
    /// New data or metadata may be available.
    Updated,
    /// The object left the table; holders may keep reading it.
    Superseded,
    /// The fetch failed permanently with this status code.
    Aborted { code: u16 },
}

impl Notification {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
