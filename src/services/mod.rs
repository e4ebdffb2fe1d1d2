//! Process-scoped service hosting
//!
//! Durable application state lives in singletons registered here at process
//! start. Display surfaces come and go; the directory does not.

pub mod directory;

pub use directory::{ConstructionPolicy, ServiceDirectory, ServiceKey};
