// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the behavior model (`Handler`, `Behavior`),
//! the `ActorRef` type used to address actors, and the `ActorContext`
//! exposed to behaviors while they process a message.
//!

use crate::{
    ActorPath, Error,
    mailbox::MailboxSender,
    runner::Control,
    supervision::SupervisionStrategy,
    system::SystemRef,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use std::{
    marker::PhantomData,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

/// Reply window applied by [`ActorRef::ask`] when no explicit timeout is
/// given.
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Marker trait for messages exchanged between actors.
///
/// Every actor of a system consumes the same message type, usually an enum
/// covering the protocols the system speaks. Messages may carry
/// [`ActorRef`]s, so references can be handed between actors as payloads.
pub trait Message: Clone + Send + Sync + 'static {}

/// A unit of actor logic: handles one message and yields the behavior to
/// use for the next one.
///
/// Returning `Err` enters the failure path: the error never reaches the
/// sender, it is resolved by the actor's supervision strategy.
#[async_trait]
pub trait Handler<M: Message>: Send + 'static {
    /// Handles a single message.
    async fn handle(
        &mut self,
        message: M,
        ctx: &mut ActorContext<M>,
    ) -> Result<Behavior<M>, Error>;
}

#[async_trait]
impl<M: Message> Handler<M> for Box<dyn Handler<M>> {
    async fn handle(
        &mut self,
        message: M,
        ctx: &mut ActorContext<M>,
    ) -> Result<Behavior<M>, Error> {
        (**self).handle(message, ctx).await
    }
}

/// Outcome of handling one message: the trampoline.
///
/// Stateful actors return `Continue` with the handler for the next message,
/// so state advances by replacement instead of mutation. The runner installs
/// the result; it never calls back into the previous handler.
pub enum Behavior<M: Message> {
    /// Install this handler for the next message.
    Continue(Box<dyn Handler<M>>),
    /// Keep the current handler.
    Same,
    /// Stop the actor gracefully once this message completes, cascading to
    /// its children.
    Stop,
}

impl<M: Message> Behavior<M> {
    /// Shorthand for `Behavior::Continue(Box::new(handler))`.
    pub fn next(handler: impl Handler<M>) -> Self {
        Behavior::Continue(Box::new(handler))
    }
}

/// Factory that produces an actor's initial behavior. Kept by the runner so
/// a `Restart` verdict can reinitialize the behavior from scratch.
pub(crate) type BehaviorFactory<M> =
    Arc<dyn Fn() -> Box<dyn Handler<M>> + Send + Sync>;

/// Adapter for fixed (stateless) actors: whatever handler the inner function
/// trampolines to is discarded and the same function handles the next
/// message. `Stop` and failures keep their meaning.
#[derive(Clone)]
pub(crate) struct Fixed<H> {
    inner: H,
}

impl<H> Fixed<H> {
    pub(crate) fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M, H> Handler<M> for Fixed<H>
where
    M: Message,
    H: Handler<M>,
{
    async fn handle(
        &mut self,
        message: M,
        ctx: &mut ActorContext<M>,
    ) -> Result<Behavior<M>, Error> {
        match self.inner.handle(message, ctx).await? {
            Behavior::Continue(_) | Behavior::Same => Ok(Behavior::Same),
            Behavior::Stop => Ok(Behavior::Stop),
        }
    }
}

/// Closure-backed handler, built with [`from_fn`].
pub struct FnHandler<M, F> {
    f: F,
    _message: PhantomData<fn(M)>,
}

impl<M, F: Clone> Clone for FnHandler<M, F> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _message: PhantomData,
        }
    }
}

/// Wraps an async closure as a [`Handler`].
///
/// ```ignore
/// use arbor::{from_fn, Behavior};
/// use futures::FutureExt;
///
/// let echo = from_fn(|message: Msg, ctx: &mut ActorContext<Msg>| {
///     async move {
///         if let Some(sender) = ctx.sender().cloned() {
///             ctx.tell(&sender, message).await?;
///         }
///         Ok(Behavior::Same)
///     }
///     .boxed()
/// });
/// ```
pub fn from_fn<M, F>(f: F) -> FnHandler<M, F>
where
    M: Message,
    F: for<'a> FnMut(
            M,
            &'a mut ActorContext<M>,
        ) -> BoxFuture<'a, Result<Behavior<M>, Error>>
        + Send
        + 'static,
{
    FnHandler {
        f,
        _message: PhantomData,
    }
}

#[async_trait]
impl<M, F> Handler<M> for FnHandler<M, F>
where
    M: Message,
    F: for<'a> FnMut(
            M,
            &'a mut ActorContext<M>,
        ) -> BoxFuture<'a, Result<Behavior<M>, Error>>
        + Send
        + 'static,
{
    async fn handle(
        &mut self,
        message: M,
        ctx: &mut ActorContext<M>,
    ) -> Result<Behavior<M>, Error> {
        (self.f)(message, ctx).await
    }
}

/// Lifecycle state of an actor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Running,
    Stopping,
    Stopped,
}

/// Shared lifecycle cell. Transitions are monotonic: a node never moves
/// back towards `Running`.
#[derive(Debug)]
pub(crate) struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub(crate) fn get(&self) -> Lifecycle {
        match self.0.load(Ordering::SeqCst) {
            0 => Lifecycle::Running,
            1 => Lifecycle::Stopping,
            _ => Lifecycle::Stopped,
        }
    }

    pub(crate) fn advance(&self, state: Lifecycle) {
        let value = match state {
            Lifecycle::Running => 0,
            Lifecycle::Stopping => 1,
            Lifecycle::Stopped => 2,
        };
        self.0.fetch_max(value, Ordering::SeqCst);
    }
}

/// How a reference reaches its target.
enum Target<M: Message> {
    /// A live actor node.
    Node {
        mailbox: MailboxSender<M>,
        control: tokio::sync::mpsc::Sender<Control>,
        token: CancellationToken,
        lifecycle: Arc<LifecycleCell>,
        system: SystemRef<M>,
    },
    /// The one-shot reply slot of a pending ask. Consumed by the first
    /// `tell`; later tells are harmless no-ops.
    Reply(Arc<Mutex<Option<oneshot::Sender<M>>>>),
}

/// A lightweight, copyable handle to an actor.
///
/// References are safe to pass between actors as message payloads and
/// remain valid after the underlying node is gone: operations against a
/// stopped actor degrade gracefully (`tell` becomes a no-op, `ask` and
/// `spawn` fail fast) instead of crashing.
///
/// ```ignore
/// let worker = system.spawn(|| Dispatcher::new(), Some("dispatcher")).await?;
/// worker.tell(Msg::Job(17)).await?;
/// let report = worker.ask(Msg::Report).await?;
/// worker.stop().await;
/// assert!(worker.is_stopped());
/// ```
pub struct ActorRef<M: Message> {
    path: ActorPath,
    target: Target<M>,
}

impl<M: Message> ActorRef<M> {
    pub(crate) fn node(
        path: ActorPath,
        mailbox: MailboxSender<M>,
        control: tokio::sync::mpsc::Sender<Control>,
        token: CancellationToken,
        lifecycle: Arc<LifecycleCell>,
        system: SystemRef<M>,
    ) -> Self {
        Self {
            path,
            target: Target::Node {
                mailbox,
                control,
                token,
                lifecycle,
                system,
            },
        }
    }

    /// Creates the ephemeral sender of a pending ask together with the
    /// receiver the asking side awaits. Exactly one of reply or timeout
    /// resolves the ask; a reply after the window has fired is a no-op.
    pub(crate) fn pending_ask(serial: usize) -> (Self, oneshot::Receiver<M>) {
        let (reply_sender, reply_receiver) = oneshot::channel();
        let reference = Self {
            path: ActorPath::from("/temp") / &serial.to_string(),
            target: Target::Reply(Arc::new(Mutex::new(Some(reply_sender)))),
        };
        (reference, reply_receiver)
    }

    /// The actor's name: the last segment of its path.
    pub fn name(&self) -> String {
        self.path.name()
    }

    /// The actor's hierarchical path.
    pub fn path(&self) -> ActorPath {
        self.path.clone()
    }

    /// True once the actor is stopping or stopped. Ephemeral reply
    /// references report stopped after their single reply was consumed.
    pub fn is_stopped(&self) -> bool {
        match &self.target {
            Target::Node { lifecycle, .. } => {
                lifecycle.get() != Lifecycle::Running
            }
            Target::Reply(slot) => {
                slot.lock().map(|s| s.is_none()).unwrap_or(true)
            }
        }
    }

    /// Reference of this actor's parent, `None` for root actors and
    /// references whose parent is already gone.
    pub async fn parent(&self) -> Option<ActorRef<M>> {
        match &self.target {
            Target::Node { system, .. } => {
                system.get_actor(&self.path.parent()).await
            }
            Target::Reply(_) => None,
        }
    }

    /// Snapshot of the names of this actor's current children. The returned
    /// set is a copy, not a live view.
    pub async fn children(&self) -> Vec<String> {
        match &self.target {
            Target::Node { system, .. } => {
                system.child_names(&self.path).await
            }
            Target::Reply(_) => Vec::new(),
        }
    }

    /// Fire-and-forget send.
    ///
    /// The envelope carries no sender. Telling a stopping or stopped actor
    /// is silently a no-op.
    pub async fn tell(&self, message: M) -> Result<(), Error> {
        self.send_envelope(None, message)
    }

    pub(crate) fn send_envelope(
        &self,
        sender: Option<ActorRef<M>>,
        message: M,
    ) -> Result<(), Error> {
        match &self.target {
            Target::Node {
                mailbox, lifecycle, ..
            } => {
                if lifecycle.get() != Lifecycle::Running {
                    debug!(
                        "Dropping message for stopped actor {}.",
                        self.path
                    );
                    return Ok(());
                }
                let _ = mailbox
                    .send(crate::mailbox::Envelope::new(message, sender));
                Ok(())
            }
            Target::Reply(slot) => {
                let reply_sender =
                    slot.lock().ok().and_then(|mut slot| slot.take());
                if let Some(reply_sender) = reply_sender {
                    let _ = reply_sender.send(message);
                }
                Ok(())
            }
        }
    }

    /// Sends a message and awaits exactly one correlated reply within the
    /// default window. See [`ActorRef::ask_timeout`].
    pub async fn ask(&self, message: M) -> Result<M, Error> {
        self.ask_timeout(message, DEFAULT_ASK_TIMEOUT).await
    }

    /// Sends a message with an ephemeral reply reference as sender and
    /// awaits the reply.
    ///
    /// Fails fast with [`Error::AlreadyStopped`] when the target is already
    /// stopped (nothing is enqueued), and with [`Error::AskTimeout`] when no
    /// reply arrives within `window`. The reply is matched by identity of
    /// the ephemeral reference, never by message content.
    pub async fn ask_timeout(
        &self,
        message: M,
        window: Duration,
    ) -> Result<M, Error> {
        match &self.target {
            Target::Node {
                mailbox,
                lifecycle,
                system,
                ..
            } => {
                if lifecycle.get() != Lifecycle::Running {
                    return Err(Error::AlreadyStopped(self.path.clone()));
                }
                let (reply_ref, reply_receiver) =
                    Self::pending_ask(system.next_serial());
                if mailbox
                    .send(crate::mailbox::Envelope::new(
                        message,
                        Some(reply_ref),
                    ))
                    .is_err()
                {
                    return Err(Error::AlreadyStopped(self.path.clone()));
                }
                match tokio::time::timeout(window, reply_receiver).await {
                    Ok(Ok(reply)) => Ok(reply),
                    // A dropped reply slot can never produce a reply, so it
                    // surfaces like a missed window without waiting it out.
                    Ok(Err(_)) | Err(_) => {
                        Err(Error::AskTimeout(self.path.clone()))
                    }
                }
            }
            Target::Reply(_) => Err(Error::Address(format!(
                "{} is an ephemeral reply reference",
                self.path
            ))),
        }
    }

    /// Spawns a stateful child under this actor with the default (stop)
    /// supervision.
    ///
    /// The factory yields the child's initial behavior and is kept for
    /// `Restart` verdicts. With `name: None` a unique name is generated;
    /// a name already taken among live siblings fails with
    /// [`Error::NameCollision`]. Spawning under a stopping or stopped
    /// parent fails with [`Error::AlreadyStopped`].
    pub async fn spawn<F, H>(
        &self,
        factory: F,
        name: Option<&str>,
    ) -> Result<ActorRef<M>, Error>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler<M>,
    {
        self.spawn_with(factory, name, SupervisionStrategy::default())
            .await
    }

    /// Spawns a stateful child with an explicit supervision strategy.
    pub async fn spawn_with<F, H>(
        &self,
        factory: F,
        name: Option<&str>,
        strategy: SupervisionStrategy,
    ) -> Result<ActorRef<M>, Error>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler<M>,
    {
        match &self.target {
            Target::Node {
                lifecycle,
                token,
                system,
                ..
            } => {
                if lifecycle.get() != Lifecycle::Running {
                    return Err(Error::AlreadyStopped(self.path.clone()));
                }
                let factory: BehaviorFactory<M> = Arc::new(
                    move || -> Box<dyn Handler<M>> { Box::new(factory()) },
                );
                system
                    .spawn_under(
                        self.path.clone(),
                        token,
                        factory,
                        name,
                        strategy,
                    )
                    .await
            }
            Target::Reply(_) => Err(Error::Address(format!(
                "{} is an ephemeral reply reference",
                self.path
            ))),
        }
    }

    /// Spawns a fixed (stateless) child: the same handler processes every
    /// message, whatever it trampolines to, until it returns
    /// `Behavior::Stop` or fails.
    pub async fn spawn_fixed<H>(
        &self,
        handler: H,
        name: Option<&str>,
    ) -> Result<ActorRef<M>, Error>
    where
        H: Handler<M> + Clone + Sync,
    {
        self.spawn_fixed_with(handler, name, SupervisionStrategy::default())
            .await
    }

    /// Spawns a fixed child with an explicit supervision strategy.
    pub async fn spawn_fixed_with<H>(
        &self,
        handler: H,
        name: Option<&str>,
        strategy: SupervisionStrategy,
    ) -> Result<ActorRef<M>, Error>
    where
        H: Handler<M> + Clone + Sync,
    {
        self.spawn_with(move || Fixed::new(handler.clone()), name, strategy)
            .await
    }

    /// Gracefully stops this actor: the in-flight message (if any)
    /// completes, children stop recursively, queued and future tells are
    /// dropped, and the node deregisters from its parent. Idempotent and
    /// infallible; once this returns, [`ActorRef::is_stopped`] is true.
    pub async fn stop(&self) {
        if let Target::Node {
            control, lifecycle, ..
        } = &self.target
        {
            if lifecycle.get() == Lifecycle::Stopped {
                return;
            }
            lifecycle.advance(Lifecycle::Stopping);
            let (done_sender, done_receiver) = oneshot::channel();
            if control.send(Control::Stop(Some(done_sender))).await.is_ok()
            {
                let _ = done_receiver.await;
            }
            lifecycle.advance(Lifecycle::Stopped);
        }
    }

    /// Forcefully terminates this actor and its whole subtree without
    /// waiting for in-flight work; suspended message handling is abandoned
    /// at its next yield point. Idempotent and infallible.
    pub async fn terminate(&self) {
        if let Target::Node {
            token,
            lifecycle,
            system,
            ..
        } = &self.target
        {
            system.discard_subtree(&self.path).await;
            lifecycle.advance(Lifecycle::Stopped);
            token.cancel();
        }
    }
}

impl<M: Message> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        let target = match &self.target {
            Target::Node {
                mailbox,
                control,
                token,
                lifecycle,
                system,
            } => Target::Node {
                mailbox: mailbox.clone(),
                control: control.clone(),
                token: token.clone(),
                lifecycle: lifecycle.clone(),
                system: system.clone(),
            },
            Target::Reply(slot) => Target::Reply(slot.clone()),
        };
        Self {
            path: self.path.clone(),
            target,
        }
    }
}

impl<M: Message> std::fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Target::Node { .. } => write!(f, "ActorRef({})", self.path),
            Target::Reply(_) => write!(f, "ReplyRef({})", self.path),
        }
    }
}

/// Execution context handed to a behavior for the duration of one message.
///
/// This is the entire surface available from inside an actor: identity
/// (`name`, `path`, `reference`), the tree (`parent`, `children`, the spawn
/// family), and messaging (`sender`, `tell`, `ask`). Sends made through the
/// context carry this actor's reference as the envelope sender, so
/// recipients can reply.
pub struct ActorContext<M: Message> {
    me: ActorRef<M>,
    system: SystemRef<M>,
    sender: Option<ActorRef<M>>,
}

impl<M: Message> ActorContext<M> {
    pub(crate) fn new(me: ActorRef<M>, system: SystemRef<M>) -> Self {
        Self {
            me,
            system,
            sender: None,
        }
    }

    pub(crate) fn set_sender(&mut self, sender: Option<ActorRef<M>>) {
        self.sender = sender;
    }

    /// This actor's name.
    pub fn name(&self) -> String {
        self.me.name()
    }

    /// This actor's path.
    pub fn path(&self) -> ActorPath {
        self.me.path()
    }

    /// A reference to this actor, safe to embed in outgoing messages.
    pub fn reference(&self) -> ActorRef<M> {
        self.me.clone()
    }

    /// Reference of this actor's parent, `None` for root actors.
    pub async fn parent(&self) -> Option<ActorRef<M>> {
        self.me.parent().await
    }

    /// The sender of the message currently being handled. `None` for
    /// external tells; an ephemeral reply reference while answering an ask.
    pub fn sender(&self) -> Option<&ActorRef<M>> {
        self.sender.as_ref()
    }

    /// The actor system this actor runs in.
    pub fn system(&self) -> &SystemRef<M> {
        &self.system
    }

    /// Sends `message` to `target` with this actor as the envelope sender.
    pub async fn tell(
        &self,
        target: &ActorRef<M>,
        message: M,
    ) -> Result<(), Error> {
        target.send_envelope(Some(self.me.clone()), message)
    }

    /// Asks `target` and awaits its reply within the default window.
    pub async fn ask(
        &self,
        target: &ActorRef<M>,
        message: M,
    ) -> Result<M, Error> {
        target.ask(message).await
    }

    /// Spawns a stateful child of this actor.
    pub async fn spawn<F, H>(
        &self,
        factory: F,
        name: Option<&str>,
    ) -> Result<ActorRef<M>, Error>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler<M>,
    {
        self.me.spawn(factory, name).await
    }

    /// Spawns a stateful child with an explicit supervision strategy.
    pub async fn spawn_with<F, H>(
        &self,
        factory: F,
        name: Option<&str>,
        strategy: SupervisionStrategy,
    ) -> Result<ActorRef<M>, Error>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler<M>,
    {
        self.me.spawn_with(factory, name, strategy).await
    }

    /// Spawns a fixed child of this actor.
    pub async fn spawn_fixed<H>(
        &self,
        handler: H,
        name: Option<&str>,
    ) -> Result<ActorRef<M>, Error>
    where
        H: Handler<M> + Clone + Sync,
    {
        self.me.spawn_fixed(handler, name).await
    }

    /// Spawns a fixed child with an explicit supervision strategy.
    pub async fn spawn_fixed_with<H>(
        &self,
        handler: H,
        name: Option<&str>,
        strategy: SupervisionStrategy,
    ) -> Result<ActorRef<M>, Error>
    where
        H: Handler<M> + Clone + Sync,
    {
        self.me.spawn_fixed_with(handler, name, strategy).await
    }

    /// Snapshot of this actor's current child names.
    pub async fn children(&self) -> Vec<String> {
        self.me.children().await
    }
}
