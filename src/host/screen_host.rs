//! The single long-lived screen container

use super::controller::{
    ControllerFactory, Screen, ScreenCommand, ScreenContext, ScreenController, boxed,
};
use super::events::{Delivery, EventSink};
use super::lifecycle::{DiscardReason, SurfaceHandle, SurfaceId, SurfaceSignal, SurfaceState};
use super::subscription::SubscriptionGuard;
use crate::config::FallbackPolicy;
use crate::error::{Error, Result};
use crate::navigation::{
    Destination, HISTORY, Identity, NavParams, NavigationGraph, NavigationHistory, RouteKey,
};
use crate::services::ServiceDirectory;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity used when a surface attaches before anyone navigated
pub const ANONYMOUS: &str = "anonymous";

/// What observers see of the active screen
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSnapshot {
    pub destination: Destination,
    pub identity: Identity,
    pub surface: SurfaceId,
    pub generation: u64,
    pub title: String,
    pub attached_at: DateTime<Utc>,
}

/// Outcome of one navigation, back step or surface re-attach
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub identity: Identity,

    /// Route key as requested, if the transition came from a navigation request
    pub requested: Option<RouteKey>,

    /// Destination that is now current
    pub destination: Destination,

    /// Why the requested destination was replaced by a fallback
    pub fallback: Option<Error>,

    /// False when no surface was attached; the destination will materialize on attach
    pub attached: bool,

    pub generation: u64,
}

impl Transition {
    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

struct ActiveScreen {
    controller: Box<dyn ScreenController>,
    guard: SubscriptionGuard,
    destination: Destination,
    identity: Identity,
    generation: u64,
}

/// Collects configuration and screen factories before the host starts
pub struct ScreenHostBuilder {
    policy: FallbackPolicy,
    directory: Arc<ServiceDirectory>,
    graph: Arc<NavigationGraph>,
    factories: HashMap<RouteKey, Box<dyn ControllerFactory>>,
}

impl ScreenHostBuilder {
    pub fn new(directory: Arc<ServiceDirectory>, graph: Arc<NavigationGraph>) -> Self {
        Self {
            policy: FallbackPolicy::default(),
            directory,
            graph,
            factories: HashMap::new(),
        }
    }

    pub fn fallback(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register the controller type shown for `route`
    pub fn screen<S: Screen>(self, route: impl Into<RouteKey>) -> Result<Self> {
        self.factory(route, |destination, directory| boxed(S::create(destination, directory)?))
    }

    /// Register a factory closure for `route`
    pub fn factory<F>(mut self, route: impl Into<RouteKey>, factory: F) -> Result<Self>
    where
        F: Fn(&Destination, &ServiceDirectory) -> Result<Box<dyn ScreenController>>
            + Send
            + Sync
            + 'static,
    {
        let route = route.into();
        if self.factories.contains_key(&route) {
            return Err(Error::DuplicateRegistration(format!("screen:{}", route)));
        }
        self.factories.insert(route, Box::new(factory));
        Ok(self)
    }

    pub fn directory(&self) -> &Arc<ServiceDirectory> {
        &self.directory
    }

    pub fn graph(&self) -> &Arc<NavigationGraph> {
        &self.graph
    }

    /// Build the host; the default route must resolve and have a screen
    pub fn build(self, sink: Arc<dyn EventSink>) -> Result<ScreenHost> {
        let default = self.graph.default_destination()?;
        if !self.factories.contains_key(default.route()) {
            return Err(Error::instantiation(
                default.route().as_str(),
                "default route has no screen registered",
            ));
        }

        for route in self.graph.routes() {
            if !self.factories.contains_key(&route.key) {
                log::warn!(
                    "Route '{}' has no screen registered; navigating there falls back",
                    route.key
                );
            }
        }

        Ok(ScreenHost {
            policy: self.policy,
            directory: self.directory,
            graph: self.graph,
            factories: self.factories,
            sink,
            surface: None,
            surface_state: SurfaceState::Absent,
            active: None,
            identity: None,
            last_known_good: HashMap::new(),
            generation: 0,
            snapshot: Arc::new(ArcSwapOption::empty()),
        })
    }
}

/// Owns the active screen controller and performs every transition
///
/// All methods run on one thread (the interaction thread); the host is never
/// shared. Observers on other threads read `ScreenSnapshot`s, which are
/// swapped atomically once a new controller is attached.
pub struct ScreenHost {
    policy: FallbackPolicy,
    directory: Arc<ServiceDirectory>,
    graph: Arc<NavigationGraph>,
    factories: HashMap<RouteKey, Box<dyn ControllerFactory>>,
    sink: Arc<dyn EventSink>,
    surface: Option<SurfaceHandle>,
    surface_state: SurfaceState,
    active: Option<ActiveScreen>,
    identity: Option<Identity>,
    last_known_good: HashMap<Identity, Destination>,
    generation: u64,
    snapshot: Arc<ArcSwapOption<ScreenSnapshot>>,
}

impl ScreenHost {
    pub fn graph(&self) -> &Arc<NavigationGraph> {
        &self.graph
    }

    pub fn directory(&self) -> &Arc<ServiceDirectory> {
        &self.directory
    }

    /// Identity of the most recent transition
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.surface_state
    }

    pub fn current(&self) -> Option<Arc<ScreenSnapshot>> {
        self.snapshot.load_full()
    }

    /// Shared view of the active screen for other threads
    pub fn snapshot_handle(&self) -> Arc<ArcSwapOption<ScreenSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Number of live subscriptions held by the active controller
    pub fn active_subscriptions(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.guard.active_count())
    }

    /// Resolve and apply a navigation request
    pub fn navigate(
        &mut self,
        route: &RouteKey,
        params: &NavParams,
        identity: &Identity,
    ) -> Result<Transition> {
        self.ensure_ready()?;
        let resolution = self.graph.resolve(route, params);
        self.apply(identity.clone(), route.clone(), resolution)
    }

    /// Apply an already resolved request
    ///
    /// An unresolved destination falls back; any other resolution error is
    /// returned before the active screen is touched.
    pub fn apply(
        &mut self,
        identity: Identity,
        requested: RouteKey,
        resolution: Result<Destination>,
    ) -> Result<Transition> {
        self.ensure_ready()?;

        let (candidates, reason) = match resolution {
            Ok(destination) => {
                log::info!("Navigate [{}] '{}' -> {}", identity, requested, destination);
                (self.with_fallbacks(&identity, destination), None)
            }
            Err(err) if err.is_recoverable() => {
                log::warn!(
                    "Navigate [{}] '{}' failed ({}), falling back",
                    identity, requested, err
                );
                (self.fallbacks(&identity), Some(err))
            }
            Err(err) => return Err(err),
        };

        self.transition(identity, Some(requested), candidates, reason)
    }

    /// Pop the current history entry and show the one beneath it
    ///
    /// Entries beneath it that can no longer be shown are popped as well. An
    /// empty history shows the default destination.
    pub fn back(&mut self, identity: &Identity) -> Result<Transition> {
        self.ensure_ready()?;
        let history = self.history()?;

        history.pop(identity);
        log::info!(
            "Back [{}] -> {:?}",
            identity,
            history.current(identity).map(|entry| entry.to_string())
        );
        self.show_history(identity.clone())
    }

    /// React to a lifecycle signal from the display framework
    pub fn handle_signal(&mut self, signal: SurfaceSignal) -> Result<Option<Transition>> {
        let tracked = self.surface.as_ref().map(SurfaceHandle::id);

        match signal {
            SurfaceSignal::Attach(id) => {
                if tracked == Some(id) && self.surface_state == SurfaceState::Attached {
                    log::debug!("Surface {} already attached", id);
                    return Ok(None);
                }
                if let Some(previous) = tracked.filter(|previous| *previous != id) {
                    log::info!("Surface {} replaces {}", id, previous);
                    self.discard_active(DiscardReason::SurfaceDetached);
                }

                log::info!("Surface {} attached", id);
                self.surface = Some(SurfaceHandle::new(id));
                self.surface_state = SurfaceState::Attached;

                if !self.directory.is_ready() {
                    log::warn!("Surface attached before bootstrap completed; nothing to show yet");
                    return Ok(None);
                }
                self.restore().map(Some)
            }
            SurfaceSignal::Detach(id) | SurfaceSignal::Destroy(id) if tracked != Some(id) => {
                log::warn!("Ignoring {:?} for untracked surface", signal);
                Ok(None)
            }
            SurfaceSignal::Detach(id) => {
                log::info!("Surface {} detached", id);
                self.discard_active(DiscardReason::SurfaceDetached);
                self.surface_state = SurfaceState::Detached;
                self.snapshot.store(None);
                Ok(None)
            }
            SurfaceSignal::Destroy(id) => {
                log::info!("Surface {} destroyed", id);
                self.discard_active(DiscardReason::SurfaceDestroyed);
                self.surface = None;
                self.surface_state = SurfaceState::Absent;
                self.snapshot.store(None);
                Ok(None)
            }
        }
    }

    /// Route an event to the active controller
    ///
    /// Deliveries for tokens the active guard no longer owns were published
    /// to a discarded controller and are dropped.
    pub fn dispatch(&mut self, delivery: &Delivery) -> Option<ScreenCommand> {
        let surface = self.surface.as_ref()?;
        let Some(active) = self.active.as_mut() else {
            log::debug!("Dropping '{}' delivery: no active screen", delivery.topic);
            return None;
        };
        if !active.guard.owns(delivery.token) {
            log::debug!("Dropping stale '{}' delivery {:?}", delivery.topic, delivery.token);
            return None;
        }

        let ActiveScreen {
            controller,
            guard,
            destination,
            identity,
            ..
        } = active;
        let mut ctx = ScreenContext {
            destination,
            identity,
            surface,
            guard,
            directory: &self.directory,
        };
        controller.on_event(&mut ctx, delivery)
    }

    /// Discard the active controller; called once when the host stops
    pub fn shutdown(&mut self) {
        self.discard_active(DiscardReason::Shutdown);
        self.snapshot.store(None);
        log::info!("Screen host shut down");
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.directory.is_ready() {
            Ok(())
        } else {
            Err(Error::DirectoryNotReady)
        }
    }

    fn history(&self) -> Result<Arc<NavigationHistory>> {
        self.directory.get(HISTORY)
    }

    /// Re-create the screen for the current identity after an attach
    fn restore(&mut self) -> Result<Transition> {
        let identity = self
            .identity
            .clone()
            .unwrap_or_else(|| Identity::new(ANONYMOUS));
        self.show_history(identity)
    }

    /// Show the newest history entry of `identity` that still instantiates
    ///
    /// Entries that fail are popped so they cannot trap later `back` steps.
    /// An exhausted history shows the default destination.
    fn show_history(&mut self, identity: Identity) -> Result<Transition> {
        let history = self.history()?;

        let Some(surface) = self.live_surface() else {
            let candidates = match history.current(&identity) {
                Some(current) => vec![current],
                None => self.default_only(),
            };
            return self.transition(identity, None, candidates, None);
        };

        self.discard_active(DiscardReason::Navigated);
        self.identity = Some(identity.clone());

        let mut reason = None;
        while let Some(entry) = history.current(&identity) {
            match self.instantiate(&entry, &identity, &surface) {
                Ok(active) => return Ok(self.activate(active, None, reason)),
                Err(err) => {
                    log::warn!("Dropping history entry {} for [{}]: {}", entry, identity, err);
                    history.pop(&identity);
                    reason = reason.or(Some(err));
                }
            }
        }

        let candidates = self.default_only();
        self.transition(identity, None, candidates, reason)
    }

    fn live_surface(&self) -> Option<SurfaceHandle> {
        match (&self.surface, self.surface_state) {
            (Some(surface), SurfaceState::Attached) => Some(surface.clone()),
            _ => None,
        }
    }

    fn default_only(&self) -> Vec<Destination> {
        self.graph.default_destination().into_iter().collect()
    }

    /// Destinations tried, in order, when the requested one cannot be shown
    fn fallbacks(&self, identity: &Identity) -> Vec<Destination> {
        let mut fallbacks = Vec::new();
        if self.policy == FallbackPolicy::LastKnownGood {
            fallbacks.extend(self.last_known_good.get(identity).cloned());
        }
        for default in self.default_only() {
            if !fallbacks.contains(&default) {
                fallbacks.push(default);
            }
        }
        fallbacks
    }

    fn with_fallbacks(&self, identity: &Identity, primary: Destination) -> Vec<Destination> {
        let mut candidates = vec![primary];
        for fallback in self.fallbacks(identity) {
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }
        candidates
    }

    fn transition(
        &mut self,
        identity: Identity,
        requested: Option<RouteKey>,
        candidates: Vec<Destination>,
        mut reason: Option<Error>,
    ) -> Result<Transition> {
        let history = self.history()?;

        self.discard_active(DiscardReason::Navigated);
        self.identity = Some(identity.clone());

        let Some(surface) = self.live_surface() else {
            // Recorded unvalidated; the next attach shows it or drops it
            let destination = candidates
                .into_iter()
                .next()
                .ok_or_else(|| self.no_default())?;
            record(&history, &identity, &destination);
            log::info!("No surface attached; deferred {} for [{}]", destination, identity);
            return Ok(Transition {
                identity,
                requested,
                destination,
                fallback: reason,
                attached: false,
                generation: self.generation,
            });
        };

        let mut last_error = None;
        for destination in candidates {
            match self.instantiate(&destination, &identity, &surface) {
                Ok(active) => {
                    record(&history, &identity, &destination);
                    return Ok(self.activate(active, requested, reason));
                }
                Err(err) => {
                    log::warn!("Could not show {}: {}", destination, err);
                    if reason.is_none() {
                        reason = Some(err.clone());
                    }
                    last_error = Some(err);
                }
            }
        }

        self.snapshot.store(None);
        let err = last_error.unwrap_or_else(|| self.no_default());
        log::error!("No screen could be attached for [{}]: {}", identity, err);
        Err(err)
    }

    fn no_default(&self) -> Error {
        Error::UnresolvedDestination(self.graph.default_route().to_string())
    }

    fn instantiate(
        &self,
        destination: &Destination,
        identity: &Identity,
        surface: &SurfaceHandle,
    ) -> Result<ActiveScreen> {
        let route = destination.route();
        let factory = self
            .factories
            .get(route)
            .ok_or_else(|| Error::instantiation(route.as_str(), "no screen registered for route"))?;

        let mut controller = factory
            .create(destination, &self.directory)
            .map_err(|err| instantiation_error(route, err))?;

        let mut guard = SubscriptionGuard::new(route.as_str(), Arc::clone(&self.sink));
        let attached = controller.attach(&mut ScreenContext {
            destination,
            identity,
            surface,
            guard: &mut guard,
            directory: &self.directory,
        });

        if let Err(err) = attached {
            controller.detach(DiscardReason::InstantiationFailed);
            guard.release_all();
            return Err(instantiation_error(route, err));
        }

        Ok(ActiveScreen {
            controller,
            guard,
            destination: destination.clone(),
            identity: identity.clone(),
            generation: self.generation + 1,
        })
    }

    fn activate(
        &mut self,
        active: ActiveScreen,
        requested: Option<RouteKey>,
        reason: Option<Error>,
    ) -> Transition {
        self.generation = active.generation;
        self.last_known_good.insert(active.identity.clone(), active.destination.clone());

        let surface = self.surface.as_ref().map(SurfaceHandle::id).unwrap_or_default();
        self.snapshot.store(Some(Arc::new(ScreenSnapshot {
            destination: active.destination.clone(),
            identity: active.identity.clone(),
            surface,
            generation: active.generation,
            title: active.controller.title().to_string(),
            attached_at: Utc::now(),
        })));

        log::info!(
            "Attached '{}' (#{}) for [{}] with {} subscription(s)",
            active.controller.title(),
            active.generation,
            active.identity,
            active.guard.active_count()
        );

        let transition = Transition {
            identity: active.identity.clone(),
            requested,
            destination: active.destination.clone(),
            fallback: reason,
            attached: true,
            generation: active.generation,
        };
        self.active = Some(active);
        transition
    }

    fn discard_active(&mut self, reason: DiscardReason) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.controller.detach(reason);
        let released = active.guard.release_all();
        log::info!(
            "Discarded '{}' (#{}, {:?}), released {} subscription(s)",
            active.controller.title(),
            active.generation,
            reason,
            released
        );
    }
}

/// Push `destination` unless it is already the identity's current entry
fn record(history: &NavigationHistory, identity: &Identity, destination: &Destination) {
    if history.current(identity).as_ref() != Some(destination) {
        history.push(identity, destination.clone());
    }
}

fn instantiation_error(route: &RouteKey, err: Error) -> Error {
    if matches!(err, Error::InstantiationFailed { .. }) {
        return err;
    }
    if !err.is_recoverable() {
        log::error!("Screen '{}' hit a setup defect while instantiating: {}", route, err);
    }
    Error::instantiation(route.as_str(), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::events::{EVENTS, EventBus};
    use crate::host::subscription::SubscriptionDescriptor;
    use crate::navigation::Route;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Probe {
        title: String,
        topic: &'static str,
        journal: Journal,
        fail_attach: bool,
    }

    impl ScreenController for Probe {
        fn title(&self) -> &str {
            &self.title
        }

        fn attach(&mut self, ctx: &mut ScreenContext<'_>) -> Result<()> {
            self.journal.lock().unwrap().push(format!("attach:{}", ctx.destination.route()));
            if self.fail_attach {
                return Err(Error::instantiation(self.title.as_str(), "attach refused"));
            }
            ctx.subscribe(SubscriptionDescriptor::topic(self.topic))?;
            Ok(())
        }

        fn on_event(
            &mut self,
            _ctx: &mut ScreenContext<'_>,
            event: &Delivery,
        ) -> Option<ScreenCommand> {
            self.journal.lock().unwrap().push(format!("event:{}:{}", self.title, event.topic));
            Some(ScreenCommand::Back)
        }

        fn detach(&mut self, reason: DiscardReason) {
            self.journal.lock().unwrap().push(format!("detach:{}:{:?}", self.title, reason));
        }
    }

    fn probe(
        title: &'static str,
        topic: &'static str,
        journal: &Journal,
        fail_attach: bool,
    ) -> impl Fn(&Destination, &ServiceDirectory) -> Result<Box<dyn ScreenController>>
    + Send
    + Sync
    + 'static {
        let journal = Arc::clone(journal);
        move |_, _| {
            boxed(Probe {
                title: title.to_string(),
                topic,
                journal: Arc::clone(&journal),
                fail_attach,
            })
        }
    }

    struct Fixture {
        host: ScreenHost,
        directory: Arc<ServiceDirectory>,
        journal: Journal,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
    }

    impl Fixture {
        fn history(&self) -> Arc<NavigationHistory> {
            self.directory.get(HISTORY).unwrap()
        }

        fn bus(&self) -> Arc<EventBus> {
            self.directory.get(EVENTS).unwrap()
        }

        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }
    }

    fn fixture_with(policy: FallbackPolicy, sealed: bool) -> Fixture {
        let directory = Arc::new(ServiceDirectory::new());
        directory.register(HISTORY, |_| Ok(NavigationHistory::new())).unwrap();
        directory.register(EVENTS, |_| Ok(EventBus::new())).unwrap();
        if sealed {
            directory.seal().unwrap();
        }

        let graph = NavigationGraph::new("home")
            .with_route(Route::new("home"))
            .unwrap()
            .with_route(Route::new("feed").pattern("feed/:feedId").require("feedId"))
            .unwrap()
            .with_route(Route::new("broken"))
            .unwrap()
            .with_route(Route::new("orphan"))
            .unwrap();

        let journal: Journal = Arc::default();
        let (tx, deliveries) = mpsc::unbounded_channel();
        let host = ScreenHostBuilder::new(Arc::clone(&directory), Arc::new(graph))
            .fallback(policy)
            .factory("home", probe("home", "catalog.updated", &journal, false))
            .unwrap()
            .factory("feed", probe("feed", "feed.updated", &journal, false))
            .unwrap()
            .factory("broken", probe("broken", "never", &journal, true))
            .unwrap()
            .build(Arc::new(tx))
            .unwrap();

        Fixture {
            host,
            directory,
            journal,
            deliveries,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FallbackPolicy::DefaultRoute, true)
    }

    fn attached() -> (Fixture, SurfaceId) {
        let mut fx = fixture();
        let surface = SurfaceId::new();
        fx.host.handle_signal(SurfaceSignal::Attach(surface)).unwrap();
        (fx, surface)
    }

    fn feed(id: &str) -> NavParams {
        NavParams::new().with("feedId", id).unwrap()
    }

    fn account() -> Identity {
        Identity::new("account-x")
    }

    #[test]
    fn test_attach_shows_default_route() {
        let (fx, surface) = attached();
        let snapshot = fx.host.current().unwrap();

        assert_eq!(snapshot.destination.route().as_str(), "home");
        assert_eq!(snapshot.identity.as_str(), ANONYMOUS);
        assert_eq!(snapshot.surface, surface);
        assert_eq!(fx.host.active_subscriptions(), 1);
    }

    #[test]
    fn test_previous_controller_discarded_before_next_attaches() {
        let (mut fx, _) = attached();
        fx.host.navigate(&"feed".into(), &feed("42"), &account()).unwrap();

        assert_eq!(
            fx.journal(),
            vec!["attach:home", "detach:home:Navigated", "attach:feed"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(fx.bus().total_subscribers(), 1);
        assert_eq!(fx.bus().subscriber_count("catalog.updated"), 0);
    }

    #[test]
    fn test_navigation_records_history() {
        let (mut fx, _) = attached();
        let transition = fx
            .host
            .navigate(&"feed/42".into(), &NavParams::new(), &account())
            .unwrap();

        assert!(transition.attached);
        assert!(!transition.fell_back());
        assert_eq!(
            fx.history().current(&account()),
            Some(Destination::new("feed", feed("42")))
        );
    }

    #[test]
    fn test_unknown_route_falls_back_to_default() {
        let (mut fx, _) = attached();
        fx.host.navigate(&"feed".into(), &feed("1"), &account()).unwrap();

        let transition = fx
            .host
            .navigate(&"nowhere".into(), &NavParams::new(), &account())
            .unwrap();

        assert_eq!(transition.destination.route().as_str(), "home");
        assert_eq!(transition.fallback, Some(Error::UnresolvedDestination("nowhere".to_string())));
        assert_eq!(fx.host.current().unwrap().destination.route().as_str(), "home");
    }

    #[test]
    fn test_instantiation_failure_falls_back_to_default() {
        let (mut fx, _) = attached();
        fx.host.navigate(&"feed".into(), &feed("1"), &account()).unwrap();

        let transition = fx.host.navigate(&"broken".into(), &NavParams::new(), &account()).unwrap();

        assert_eq!(transition.destination.route().as_str(), "home");
        assert!(matches!(transition.fallback, Some(Error::InstantiationFailed { .. })));
        assert!(fx.journal().contains(&"detach:broken:InstantiationFailed".to_string()));
        assert_eq!(fx.bus().subscriber_count("never"), 0);
    }

    #[test]
    fn test_route_without_screen_falls_back() {
        let (mut fx, _) = attached();
        let transition = fx.host.navigate(&"orphan".into(), &NavParams::new(), &account()).unwrap();

        assert_eq!(transition.destination.route().as_str(), "home");
        assert!(transition.fell_back());
    }

    #[test]
    fn test_last_known_good_policy() {
        let mut fx = fixture_with(FallbackPolicy::LastKnownGood, true);
        fx.host.handle_signal(SurfaceSignal::Attach(SurfaceId::new())).unwrap();
        fx.host.navigate(&"feed".into(), &feed("5"), &account()).unwrap();

        let transition = fx.host.navigate(&"broken".into(), &NavParams::new(), &account()).unwrap();

        assert_eq!(transition.destination, Destination::new("feed", feed("5")));
        assert!(transition.fell_back());
    }

    #[test]
    fn test_last_known_good_is_per_identity() {
        let mut fx = fixture_with(FallbackPolicy::LastKnownGood, true);
        fx.host.handle_signal(SurfaceSignal::Attach(SurfaceId::new())).unwrap();
        fx.host.navigate(&"feed".into(), &feed("5"), &account()).unwrap();

        let other = Identity::new("account-y");
        let transition = fx.host.navigate(&"broken".into(), &NavParams::new(), &other).unwrap();

        assert_eq!(transition.destination.route().as_str(), "home");
        assert_eq!(transition.identity, other);
        assert!(
            fx.history()
                .entries(&other)
                .iter()
                .all(|entry| entry.destination.route().as_str() != "feed")
        );
        assert_eq!(
            fx.history().current(&account()),
            Some(Destination::new("feed", feed("5")))
        );
    }

    #[test]
    fn test_invalid_parameters_leave_active_screen_alone() {
        let (mut fx, _) = attached();
        let err = fx.host.navigate(&"feed".into(), &NavParams::new(), &account()).unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidNavigationParameter { ref name, .. } if name == "feedId"
        ));
        assert_eq!(fx.host.current().unwrap().destination.route().as_str(), "home");
        assert_eq!(fx.journal(), vec!["attach:home".to_string()]);
    }

    #[test]
    fn test_back_pops_history() {
        let (mut fx, _) = attached();
        fx.host.navigate(&"home".into(), &NavParams::new(), &account()).unwrap();
        fx.host.navigate(&"feed".into(), &feed("7"), &account()).unwrap();

        let transition = fx.host.back(&account()).unwrap();

        assert_eq!(transition.destination.route().as_str(), "home");
        assert_eq!(fx.history().depth(&account()), 1);
    }

    #[test]
    fn test_back_skips_entries_that_no_longer_instantiate() {
        let (mut fx, _) = attached();
        fx.host.navigate(&"home".into(), &NavParams::new(), &account()).unwrap();
        fx.host.navigate(&"feed".into(), &feed("7"), &account()).unwrap();
        // An entry whose screen started failing after it was recorded
        fx.history().push(&account(), Destination::new("broken", NavParams::new()));
        fx.host.navigate(&"feed".into(), &feed("8"), &account()).unwrap();

        let transition = fx.host.back(&account()).unwrap();

        assert_eq!(transition.destination, Destination::new("feed", feed("7")));
        assert!(matches!(transition.fallback, Some(Error::InstantiationFailed { .. })));
        let remaining: Vec<Destination> = fx
            .history()
            .entries(&account())
            .into_iter()
            .map(|entry| entry.destination)
            .collect();
        assert_eq!(
            remaining,
            vec![
                Destination::new("home", NavParams::new()),
                Destination::new("feed", feed("7")),
            ]
        );

        let transition = fx.host.back(&account()).unwrap();
        assert_eq!(transition.destination.route().as_str(), "home");
        assert!(!transition.fell_back());
        assert_eq!(fx.history().depth(&account()), 1);
    }

    #[test]
    fn test_deferred_destination_that_fails_is_dropped_on_attach() {
        let (mut fx, surface) = attached();
        fx.host.navigate(&"feed".into(), &feed("3"), &account()).unwrap();
        fx.host.handle_signal(SurfaceSignal::Detach(surface)).unwrap();

        let deferred = fx
            .host
            .navigate(&"broken".into(), &NavParams::new(), &account())
            .unwrap();
        assert!(!deferred.attached);
        assert_eq!(fx.history().depth(&account()), 2);

        let restored = fx.host.handle_signal(SurfaceSignal::Attach(surface)).unwrap().unwrap();

        assert_eq!(restored.destination, Destination::new("feed", feed("3")));
        assert!(restored.fell_back());
        assert_eq!(fx.history().depth(&account()), 1);
        assert_eq!(fx.host.current().unwrap().destination.route().as_str(), "feed");
    }

    #[test]
    fn test_exhausted_history_falls_back_to_default() {
        let (mut fx, surface) = attached();
        fx.host.handle_signal(SurfaceSignal::Detach(surface)).unwrap();
        fx.host.navigate(&"orphan".into(), &NavParams::new(), &account()).unwrap();

        let restored = fx.host.handle_signal(SurfaceSignal::Attach(surface)).unwrap().unwrap();

        assert_eq!(restored.destination.route().as_str(), "home");
        assert!(restored.fell_back());
        assert_eq!(
            fx.history().current(&account()),
            Some(Destination::new("home", NavParams::new()))
        );
        assert_eq!(fx.history().depth(&account()), 1);
    }

    #[test]
    fn test_back_on_empty_history_shows_default() {
        let (mut fx, _) = attached();
        let transition = fx.host.back(&Identity::new("fresh")).unwrap();

        assert_eq!(transition.destination.route().as_str(), "home");
        assert_eq!(fx.history().depth(&Identity::new("fresh")), 1);
    }

    #[test]
    fn test_navigation_while_detached_materializes_on_attach() {
        let (mut fx, surface) = attached();
        fx.host.handle_signal(SurfaceSignal::Detach(surface)).unwrap();
        assert!(fx.host.current().is_none());
        assert_eq!(fx.bus().total_subscribers(), 0);

        let transition = fx.host.navigate(&"feed".into(), &feed("3"), &account()).unwrap();
        assert!(!transition.attached);

        let restored = fx.host.handle_signal(SurfaceSignal::Attach(surface)).unwrap().unwrap();
        assert_eq!(restored.destination, Destination::new("feed", feed("3")));
        assert_eq!(restored.identity, account());
        assert_eq!(fx.history().depth(&account()), 1);
    }

    #[test]
    fn test_surface_recreation_restores_current_destination() {
        let (mut fx, surface) = attached();
        fx.host.navigate(&"feed".into(), &feed("9"), &account()).unwrap();

        fx.host.handle_signal(SurfaceSignal::Destroy(surface)).unwrap();
        assert_eq!(fx.host.surface_state(), SurfaceState::Absent);

        let replacement = SurfaceId::new();
        let restored = fx.host.handle_signal(SurfaceSignal::Attach(replacement)).unwrap().unwrap();

        assert_eq!(restored.destination, Destination::new("feed", feed("9")));
        assert_eq!(fx.host.current().unwrap().surface, replacement);
        assert!(fx.journal().contains(&"detach:feed:SurfaceDestroyed".to_string()));
    }

    #[test]
    fn test_signals_for_untracked_surface_are_ignored() {
        let (mut fx, _) = attached();
        assert!(fx.host.handle_signal(SurfaceSignal::Detach(SurfaceId::new())).unwrap().is_none());
        assert!(fx.host.current().is_some());
    }

    #[test]
    fn test_dispatch_to_active_controller() {
        let (mut fx, _) = attached();
        fx.bus().publish("catalog.updated", &1).unwrap();
        let delivery = fx.deliveries.try_recv().unwrap();

        assert_eq!(fx.host.dispatch(&delivery), Some(ScreenCommand::Back));
        assert!(fx.journal().contains(&"event:home:catalog.updated".to_string()));
    }

    #[test]
    fn test_stale_delivery_is_dropped() {
        let (mut fx, _) = attached();
        fx.bus().publish("catalog.updated", &1).unwrap();
        let stale = fx.deliveries.try_recv().unwrap();

        fx.host.navigate(&"feed".into(), &feed("1"), &account()).unwrap();

        assert_eq!(fx.host.dispatch(&stale), None);
        assert!(!fx.journal().iter().any(|line| line.starts_with("event:")));
    }

    #[test]
    fn test_navigation_before_bootstrap_fails() {
        let mut fx = fixture_with(FallbackPolicy::DefaultRoute, false);
        let err = fx.host.navigate(&"home".into(), &NavParams::new(), &account()).unwrap_err();
        assert_eq!(err, Error::DirectoryNotReady);

        assert!(fx.host.handle_signal(SurfaceSignal::Attach(SurfaceId::new())).unwrap().is_none());
        assert!(fx.host.current().is_none());
    }

    #[test]
    fn test_shutdown_releases_subscriptions() {
        let (mut fx, _) = attached();
        fx.host.shutdown();

        assert_eq!(fx.bus().total_subscribers(), 0);
        assert!(fx.host.current().is_none());
        assert!(fx.journal().contains(&"detach:home:Shutdown".to_string()));
    }

    #[test]
    fn test_builder_rejects_duplicate_screen() {
        let directory = Arc::new(ServiceDirectory::new());
        let graph = Arc::new(NavigationGraph::new("home").with_route(Route::new("home")).unwrap());
        let journal: Journal = Arc::default();

        let result = ScreenHostBuilder::new(directory, graph)
            .factory("home", probe("home", "a", &journal, false))
            .unwrap()
            .factory("home", probe("home", "b", &journal, false));

        assert!(matches!(result, Err(Error::DuplicateRegistration(_))));
    }

    #[test]
    fn test_builder_requires_default_screen() {
        let directory = Arc::new(ServiceDirectory::new());
        let graph = Arc::new(NavigationGraph::new("home").with_route(Route::new("home")).unwrap());
        let (tx, _rx) = mpsc::unbounded_channel::<Delivery>();

        let result = ScreenHostBuilder::new(directory, graph).build(Arc::new(tx));
        assert!(matches!(result, Err(Error::InstantiationFailed { .. })));
    }
}
