//! Screen hosting: one long-lived container, disposable controllers
//!
//! The `ScreenHost` owns at most one active `ScreenController`. Each
//! navigation discards the previous controller (releasing its subscriptions)
//! before the next one attaches. Durable state lives in services and in the
//! navigation history, never in controllers, so a surface can be detached,
//! destroyed and re-attached without losing where the user was.

pub mod controller;
pub mod events;
pub mod lifecycle;
pub mod runtime;
pub mod screen_host;
pub mod subscription;

pub use controller::{
    ControllerFactory, Screen, ScreenCommand, ScreenContext, ScreenController, boxed,
};
pub use events::{Delivery, EVENTS, EventBus, EventSink, SubscriptionToken};
pub use lifecycle::{DiscardReason, SurfaceHandle, SurfaceId, SurfaceSignal, SurfaceState};
pub use runtime::{HostHandle, HostRuntime, Pending, PendingTransition};
pub use screen_host::{ANONYMOUS, ScreenHost, ScreenHostBuilder, ScreenSnapshot, Transition};
pub use subscription::{CancellationFlag, SubscriptionDescriptor, SubscriptionGuard};
