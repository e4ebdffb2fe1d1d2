use super::events::{Delivery, EVENTS, SubscriptionToken};
use super::lifecycle::{DiscardReason, SurfaceHandle};
use super::subscription::{SubscriptionDescriptor, SubscriptionGuard};
use crate::error::Result;
use crate::navigation::{Destination, Identity, NavParams, RouteKey};
use crate::services::{ServiceDirectory, ServiceKey};
use std::sync::Arc;

/// Follow-up a controller asks the host to perform
///
/// Commands are queued behind any pending requests; they never run inline.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenCommand {
    /// Navigate to another route for the same identity
    Navigate { route: RouteKey, params: NavParams },

    /// Return to the previous history entry
    Back,
}

impl ScreenCommand {
    pub fn navigate(route: impl Into<RouteKey>, params: NavParams) -> Self {
        ScreenCommand::Navigate {
            route: route.into(),
            params,
        }
    }
}

/// Everything a controller may touch while it is attached
pub struct ScreenContext<'a> {
    pub destination: &'a Destination,
    pub identity: &'a Identity,
    pub surface: &'a SurfaceHandle,
    pub guard: &'a mut SubscriptionGuard,
    pub directory: &'a ServiceDirectory,
}

impl ScreenContext<'_> {
    /// Resolve a service from the directory
    pub fn service<S: Send + Sync + 'static>(&self, key: ServiceKey<S>) -> Result<Arc<S>> {
        self.directory.get(key)
    }

    /// Subscribe to a topic on the application event bus through this screen's guard
    pub fn subscribe(&mut self, descriptor: SubscriptionDescriptor) -> Result<SubscriptionToken> {
        let bus = self.directory.get(EVENTS)?;
        self.guard.bind(&bus, descriptor)
    }
}

/// A disposable screen
///
/// Controllers hold no durable data: only service references resolved from
/// the directory and whatever they derive from their destination. A new
/// instance is created on every navigation and dropped on the next one.
pub trait ScreenController: Send {
    fn title(&self) -> &str;

    /// Called once the controller is attached to the live surface; bind subscriptions here
    fn attach(&mut self, ctx: &mut ScreenContext<'_>) -> Result<()>;

    /// An event arrived for one of this controller's subscriptions
    fn on_event(
        &mut self,
        _ctx: &mut ScreenContext<'_>,
        _event: &Delivery,
    ) -> Option<ScreenCommand> {
        None
    }

    /// Called right before the guard is released and the controller dropped
    fn detach(&mut self, _reason: DiscardReason) {}
}

/// A controller type that can build itself for a destination
pub trait Screen: ScreenController + Sized + 'static {
    fn create(destination: &Destination, directory: &ServiceDirectory) -> Result<Self>;
}

/// Factory pattern for per-navigation controller instances
pub trait ControllerFactory: Send + Sync {
    fn create(
        &self,
        destination: &Destination,
        directory: &ServiceDirectory,
    ) -> Result<Box<dyn ScreenController>>;
}

impl<F> ControllerFactory for F
where
    F: Fn(&Destination, &ServiceDirectory) -> Result<Box<dyn ScreenController>> + Send + Sync,
{
    fn create(
        &self,
        destination: &Destination,
        directory: &ServiceDirectory,
    ) -> Result<Box<dyn ScreenController>> {
        self(destination, directory)
    }
}

/// Box a controller for a factory closure
pub fn boxed<C: ScreenController + 'static>(controller: C) -> Result<Box<dyn ScreenController>> {
    Ok(Box::new(controller))
}
