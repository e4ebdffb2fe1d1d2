//! Navigation: route resolution, payloads and per-identity history

pub mod graph;
pub mod history;
pub mod params;
pub mod route;

pub use graph::{Destination, NavigationGraph, Route, RouteInfo, RouteMatch};
pub use history::{HISTORY, HistoryEntry, NavigationHistory};
pub use params::NavParams;
pub use route::{RouteKey, RoutePattern};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key separating independent navigation contexts, such as user accounts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
