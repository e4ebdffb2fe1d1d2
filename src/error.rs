//! Error taxonomy for the hosting and navigation layer
//!
//! Every variant is a programmer-error class detected eagerly. Only
//! `UnresolvedDestination` and `InstantiationFailed` are recovered at runtime
//! (the screen host falls back to a default destination); everything else is
//! surfaced immediately to the caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A service identity was registered twice.
    #[error("service '{0}' is already registered")]
    DuplicateRegistration(String),

    /// A service was looked up before (or without) being registered.
    #[error("service '{0}' was never registered")]
    UnregisteredService(String),

    /// A service was looked up with a type other than the one it was registered with.
    #[error("service '{key}' is registered as {registered}, not {requested}")]
    ServiceTypeMismatch {
        key: String,
        registered: &'static str,
        requested: &'static str,
    },

    /// Registration attempted after bootstrap sealed the directory.
    #[error("service directory is sealed; '{0}' cannot be registered after bootstrap")]
    DirectorySealed(String),

    /// A service factory re-entered its own construction.
    #[error("cyclic service dependency: {0}")]
    CyclicDependency(String),

    /// No route definition matches the requested key.
    #[error("no route matches '{0}'")]
    UnresolvedDestination(String),

    /// The parameter payload is not plain data, or violates the route's requirements.
    #[error("invalid navigation parameter '{name}': {reason}")]
    InvalidNavigationParameter { name: String, reason: String },

    /// Navigation was attempted before bootstrap completed.
    #[error("service directory is not ready; bootstrap has not completed")]
    DirectoryNotReady,

    /// A route pattern could not be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    /// An event payload could not be serialized for delivery.
    #[error("event '{topic}' has an invalid payload: {reason}")]
    InvalidEventPayload { topic: String, reason: String },

    /// A screen controller could not be created or attached.
    #[error("screen '{route}' failed to instantiate: {reason}")]
    InstantiationFailed { route: String, reason: String },

    /// A subscription was bound on a guard that already released.
    #[error("subscription guard for '{0}' has already been released")]
    GuardReleased(String),

    /// The interaction thread is no longer accepting requests.
    #[error("screen host has shut down")]
    HostClosed,

    /// The interaction thread could not be started.
    #[error("failed to start interaction thread: {0}")]
    HostSpawn(String),
}

impl Error {
    /// Whether the screen host recovers from this error by falling back
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedDestination(_) | Error::InstantiationFailed { .. }
        )
    }

    pub(crate) fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidNavigationParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn instantiation(route: impl Into<String>, reason: impl ToString) -> Self {
        Error::InstantiationFailed {
            route: route.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_resolution_and_instantiation_are_recoverable() {
        assert!(Error::UnresolvedDestination("nowhere".into()).is_recoverable());
        assert!(Error::instantiation("feed", "boom").is_recoverable());

        assert!(!Error::DuplicateRegistration("catalog".into()).is_recoverable());
        assert!(!Error::UnregisteredService("catalog".into()).is_recoverable());
        assert!(!Error::DirectoryNotReady.is_recoverable());
        assert!(!Error::invalid_param("feedId", "missing").is_recoverable());
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = Error::invalid_param("surface", "captures a live display surface");
        assert_eq!(
            err.to_string(),
            "invalid navigation parameter 'surface': captures a live display surface"
        );
    }
}
