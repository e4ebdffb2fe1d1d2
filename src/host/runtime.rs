//! The interaction thread and the handles used to talk to it
//!
//! `ScreenHost` is not shared. It lives on one dedicated thread and every
//! request reaches it through a FIFO queue, so transitions apply strictly in
//! submission order and never interleave. Handles resolve and validate a
//! request on the calling thread, then wait for the outcome asynchronously.

use super::controller::ScreenCommand;
use super::events::{Delivery, EVENTS, EventBus, EventSink};
use super::lifecycle::SurfaceSignal;
use super::screen_host::{ANONYMOUS, ScreenHost, ScreenHostBuilder, ScreenSnapshot, Transition};
use crate::error::{Error, Result};
use crate::navigation::{Destination, Identity, NavParams, NavigationGraph, RouteKey};
use crate::services::ServiceDirectory;
use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

const THREAD_NAME: &str = "interaction";

type Reply<T> = oneshot::Sender<Result<T>>;

enum HostMessage {
    Navigate {
        identity: Identity,
        requested: RouteKey,
        resolution: Result<Destination>,
        reply: Option<Reply<Transition>>,
    },
    Back {
        identity: Identity,
        reply: Option<Reply<Transition>>,
    },
    Signal {
        signal: SurfaceSignal,
        reply: Reply<Option<Transition>>,
    },
    Deliver(Delivery),
    Shutdown,
}

/// Routes bus deliveries onto the interaction thread's queue
struct HostSink(mpsc::UnboundedSender<HostMessage>);

impl EventSink for HostSink {
    fn deliver(&self, delivery: Delivery) -> bool {
        self.0.send(HostMessage::Deliver(delivery)).is_ok()
    }
}

/// Outcome of a queued request
#[must_use = "the outcome of a request is only observable by waiting on it"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    pub async fn wait(self) -> Result<T> {
        self.rx.await.map_err(|_| Error::HostClosed)?
    }

    /// Block the current thread until the request completes
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_wait(self) -> Result<T> {
        self.rx.blocking_recv().map_err(|_| Error::HostClosed)?
    }
}

pub type PendingTransition = Pending<Transition>;

/// Cloneable entry point for navigation requests and lifecycle signals
#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostMessage>,
    directory: Arc<ServiceDirectory>,
    graph: Arc<NavigationGraph>,
    snapshot: Arc<ArcSwapOption<ScreenSnapshot>>,
}

impl HostHandle {
    /// Request navigation to `route` for `identity`
    ///
    /// The payload is checked and the route resolved before anything is
    /// queued. Bad payloads and a directory that is not ready fail here;
    /// unknown routes are queued and fall back on the interaction thread.
    pub fn navigate<P>(
        &self,
        route: impl Into<RouteKey>,
        params: &P,
        identity: &Identity,
    ) -> Result<PendingTransition>
    where
        P: Serialize + ?Sized,
    {
        self.ensure_ready()?;
        let params = NavParams::from_serialize(params)?;
        let requested = route.into();

        let resolution = self.graph.resolve(&requested, &params);
        if let Err(err) = &resolution
            && !err.is_recoverable()
        {
            log::warn!("Rejected navigation [{}] '{}': {}", identity, requested, err);
            return Err(err.clone());
        }

        let (reply, rx) = oneshot::channel();
        self.send(HostMessage::Navigate {
            identity: identity.clone(),
            requested,
            resolution,
            reply: Some(reply),
        })?;
        Ok(Pending { rx })
    }

    /// Request a step back in `identity`'s history
    pub fn back(&self, identity: &Identity) -> Result<PendingTransition> {
        self.ensure_ready()?;
        let (reply, rx) = oneshot::channel();
        self.send(HostMessage::Back {
            identity: identity.clone(),
            reply: Some(reply),
        })?;
        Ok(Pending { rx })
    }

    /// Forward a lifecycle signal from the display framework
    pub fn signal(&self, signal: SurfaceSignal) -> Result<Pending<Option<Transition>>> {
        let (reply, rx) = oneshot::channel();
        self.send(HostMessage::Signal { signal, reply })?;
        Ok(Pending { rx })
    }

    /// Snapshot of the active screen, if a screen is attached
    pub fn current(&self) -> Option<Arc<ScreenSnapshot>> {
        self.snapshot.load_full()
    }

    pub fn directory(&self) -> &Arc<ServiceDirectory> {
        &self.directory
    }

    pub fn graph(&self) -> &Arc<NavigationGraph> {
        &self.graph
    }

    /// The application event bus
    pub fn events(&self) -> Result<Arc<EventBus>> {
        self.directory.get(EVENTS)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.directory.is_ready() {
            Ok(())
        } else {
            Err(Error::DirectoryNotReady)
        }
    }

    fn send(&self, message: HostMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::HostClosed)
    }
}

/// Owns the interaction thread; dropping it shuts the host down
pub struct HostRuntime {
    handle: HostHandle,
    thread: Option<JoinHandle<()>>,
}

impl HostRuntime {
    /// Build the host and start the interaction thread
    pub fn spawn(builder: ScreenHostBuilder) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let directory = Arc::clone(builder.directory());
        let graph = Arc::clone(builder.graph());

        let host = builder.build(Arc::new(HostSink(tx.clone())))?;
        let snapshot = host.snapshot_handle();

        let outbox = tx.clone();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(host, rx, outbox))
            .map_err(|err| Error::HostSpawn(err.to_string()))?;

        log::info!("Started '{}' thread", THREAD_NAME);
        Ok(Self {
            handle: HostHandle {
                tx,
                directory,
                graph,
                snapshot,
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> HostHandle {
        self.handle.clone()
    }

    /// Stop the interaction thread after it drains queued requests
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // Already-queued requests are handled before the shutdown message
        let _ = self.handle.tx.send(HostMessage::Shutdown);
        if thread.join().is_err() {
            log::error!("'{}' thread panicked", THREAD_NAME);
        }
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut host: ScreenHost,
    mut inbox: mpsc::UnboundedReceiver<HostMessage>,
    outbox: mpsc::UnboundedSender<HostMessage>,
) {
    while let Some(message) = inbox.blocking_recv() {
        match message {
            HostMessage::Navigate {
                identity,
                requested,
                resolution,
                reply,
            } => respond(reply, host.apply(identity, requested, resolution)),
            HostMessage::Back { identity, reply } => respond(reply, host.back(&identity)),
            HostMessage::Signal { signal, reply } => {
                let _ = reply.send(host.handle_signal(signal));
            }
            HostMessage::Deliver(delivery) => {
                if let Some(command) = host.dispatch(&delivery) {
                    enqueue(&host, &outbox, command);
                }
            }
            HostMessage::Shutdown => break,
        }
    }

    host.shutdown();
}

/// Queue a controller's follow-up behind everything already pending
fn enqueue(host: &ScreenHost, outbox: &mpsc::UnboundedSender<HostMessage>, command: ScreenCommand) {
    let identity = host
        .identity()
        .cloned()
        .unwrap_or_else(|| Identity::new(ANONYMOUS));

    let message = match command {
        ScreenCommand::Navigate { route, params } => HostMessage::Navigate {
            identity,
            resolution: host.graph().resolve(&route, &params),
            requested: route,
            reply: None,
        },
        ScreenCommand::Back => HostMessage::Back { identity, reply: None },
    };

    if outbox.send(message).is_err() {
        log::warn!("Dropped screen command: host is shutting down");
    }
}

fn respond(reply: Option<Reply<Transition>>, result: Result<Transition>) {
    match reply {
        Some(reply) => {
            let _ = reply.send(result);
        }
        None => {
            if let Err(err) = result {
                log::warn!("Screen command failed: {}", err);
            }
        }
    }
}
