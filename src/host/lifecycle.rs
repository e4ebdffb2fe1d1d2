use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Identifier of a display surface handed to us by the framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The only lifecycle signals consumed from the display framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// A surface is live and may show a screen
    Attach(SurfaceId),

    /// The surface is hidden; it may be attached again later
    Detach(SurfaceId),

    /// The surface is gone for good
    Destroy(SurfaceId),
}

impl SurfaceSignal {
    pub fn surface(&self) -> SurfaceId {
        match self {
            SurfaceSignal::Attach(id)
            | SurfaceSignal::Detach(id)
            | SurfaceSignal::Destroy(id) => *id,
        }
    }
}

/// State of the surface tracked by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// No surface has been attached yet, or the last one was destroyed
    Absent,

    /// A surface is live; a controller is attached to it
    Attached,

    /// The surface is hidden; navigation only updates history
    Detached,
}

/// Reason a screen controller is being discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Replaced by a navigation
    Navigated,

    /// Surface detached
    SurfaceDetached,

    /// Surface destroyed
    SurfaceDestroyed,

    /// Attach failed; the controller never became active
    InstantiationFailed,

    /// Host shutting down
    Shutdown,
}

/// Live handle to the attached surface, lent to controllers while they are attached
///
/// Refuses to serialize, so it can never end up in a navigation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceHandle {
    id: SurfaceId,
    attached_at: DateTime<Utc>,
}

impl SurfaceHandle {
    pub(crate) fn new(id: SurfaceId) -> Self {
        Self {
            id,
            attached_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }
}

impl Serialize for SurfaceHandle {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(format!(
            "captures live display surface {}",
            self.id
        )))
    }
}
