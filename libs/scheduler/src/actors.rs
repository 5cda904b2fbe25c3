//! Minimal actor runtime for the launch pipeline.
//!
//! Provides the building blocks the pipeline actors share:
//! - `Actor` trait: one message at a time, no internal concurrency
//! - `spawn` / `ActorRef` for lifecycle, `ActorHandle` for sending
//! - cancellable one-shot timers delivered as ordinary messages
//!
//! Mailboxes are unbounded on purpose: subscription traffic and match
//! replies flow in a cycle between launchers and the matcher manager, and
//! progress must never depend on mailbox capacity. Actors end by returning
//! [`Flow::Stop`] (graceful drain) or via the shutdown signal; nothing here
//! restarts a stopped actor.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Marker trait for actor messages.
pub trait Message: Send + 'static {}

impl<T: Send + 'static> Message for T {}

/// Outcome of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing messages.
    Continue,
    /// Stop the actor after this message.
    Stop,
}

/// Behavior of an actor.
///
/// Actors process messages one at a time and own mutable state not shared
/// with other actors; all cross-actor coordination is message passing.
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle a single message.
    async fn handle(&mut self, msg: Self::Message, ctx: &ActorContext<Self::Message>) -> Flow;

    /// Called once before the first message.
    async fn on_start(&mut self, _ctx: &ActorContext<Self::Message>) {}

    /// Called after the last message, whichever way the actor ends.
    async fn on_stop(&mut self, _ctx: &ActorContext<Self::Message>) {}
}

/// Context handed to an actor while it runs.
pub struct ActorContext<M: Message> {
    /// Handle to the actor's own mailbox, for timers and callbacks.
    pub handle: ActorHandle<M>,
}

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<M: Message> std::fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

impl<M: Message> ActorHandle<M> {
    /// Sends a message; the message is dropped if the actor has stopped.
    pub fn send(&self, msg: M) {
        let _ = self.tx.send(msg);
    }

    /// True if the actor's mailbox is still open.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Owner-side reference to a spawned actor.
pub struct ActorRef<M: Message> {
    /// Handle to the actor's mailbox.
    pub handle: ActorHandle<M>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl<M: Message> ActorRef<M> {
    /// Signals the actor to stop without draining its mailbox.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// True while the actor task runs.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Waits for the actor task to finish.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

/// Spawns an actor onto the runtime.
pub fn spawn<A: Actor>(actor: A) -> ActorRef<A::Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = ActorHandle { tx };
    let ctx = ActorContext {
        handle: handle.clone(),
    };

    let join = tokio::spawn(run_actor_loop(actor, rx, shutdown_rx, ctx));

    ActorRef {
        handle,
        shutdown_tx,
        join,
    }
}

async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::UnboundedReceiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    ctx: ActorContext<A::Message>,
) {
    actor.on_start(&ctx).await;
    debug!(actor = actor.name(), "Actor started");

    // A dropped ActorRef closes the shutdown channel; the actor then keeps
    // draining its mailbox detached instead of spinning on the closed arm.
    let mut shutdown_open = true;

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed(), if shutdown_open => {
                match changed {
                    Ok(()) => {
                        if *shutdown.borrow() {
                            debug!(actor = actor.name(), "Actor received shutdown signal");
                            break;
                        }
                    }
                    Err(_) => shutdown_open = false,
                }
            }

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        if actor.handle(msg, &ctx).await == Flow::Stop {
                            debug!(actor = actor.name(), "Actor requested stop");
                            break;
                        }
                    }
                    None => {
                        debug!(actor = actor.name(), "Actor mailbox closed");
                        break;
                    }
                }
            }
        }
    }

    actor.on_stop(&ctx).await;
    debug!(actor = actor.name(), "Actor stopped");
}

// =============================================================================
// Timers
// =============================================================================

/// Cancellable handle to a scheduled one-shot message.
#[derive(Debug)]
pub struct TimerHandle {
    join: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancels the timer; a no-op if it already fired.
    pub fn cancel(&self) {
        self.join.abort();
    }
}

/// Delivers `msg` to `handle` after `delay`, unless cancelled first.
pub fn schedule_send<M: Message>(delay: Duration, handle: ActorHandle<M>, msg: M) -> TimerHandle {
    let join = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        handle.send(msg);
    });
    TimerHandle { join }
}

// =============================================================================
// Tests
// =============================================================================
