//! Lifecycle-independent state hosting and deterministic screen navigation
//!
//! Durable state lives in a process-scoped [`services::ServiceDirectory`].
//! Navigation requests resolve through a [`navigation::NavigationGraph`] to
//! plain-data destinations, and a single [`host::ScreenHost`] swaps disposable
//! screen controllers in and out, binding each controller's event
//! subscriptions to its own lifetime through a [`host::SubscriptionGuard`].

mod macros;

pub mod config;
pub mod error;
pub mod host;
pub mod navigation;
pub mod screens;
pub mod services;

pub use error::{Error, Result};
