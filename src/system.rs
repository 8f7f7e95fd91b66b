// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` entry point and the
//! `SystemRef` type: the root of the actor tree, owner of the live-actor
//! registry and of process-wide lifecycle (stop/terminate).
//!

use crate::{
    ActorPath, Error,
    actor::{
        ActorRef, BehaviorFactory, Fixed, Handler, Lifecycle, LifecycleCell,
        Message,
    },
    mailbox::{MailboxSender, mailbox},
    runner::{ActorRunner, CONTROL_CAPACITY, Control, ControlSender},
    supervision::SupervisionStrategy,
};

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Path under which root actors are mounted.
const USER_ROOT: &str = "/user";

/// Actor system factory.
pub struct ActorSystem {}

impl ActorSystem {
    /// Creates a new actor system for messages of type `M`.
    ///
    /// Returns the system reference and the system runner. The runner's
    /// [`SystemRunner::run`] future completes once the system has been
    /// stopped or terminated; cancelling `token` triggers a graceful stop
    /// of the whole tree.
    pub fn create<M: Message>(
        token: CancellationToken,
    ) -> (SystemRef<M>, SystemRunner) {
        let (event_sender, event_receiver) = mpsc::channel(100);
        let system = SystemRef::new(event_sender, token);
        let runner = SystemRunner::new(event_receiver);
        (system, runner)
    }
}

/// System event.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Stop the actor system.
    StopSystem,
}

/// Registry entry of a live actor node: every handle the system needs to
/// address, signal or tear down the node.
pub(crate) struct NodeEntry<M: Message> {
    pub(crate) mailbox: MailboxSender<M>,
    pub(crate) control: ControlSender,
    pub(crate) token: CancellationToken,
    pub(crate) lifecycle: Arc<LifecycleCell>,
    pub(crate) strategy: Arc<SupervisionStrategy>,
}

impl<M: Message> Clone for NodeEntry<M> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            control: self.control.clone(),
            token: self.token.clone(),
            lifecycle: self.lifecycle.clone(),
            strategy: self.strategy.clone(),
        }
    }
}

/// Reference to the actor system: the root actor node.
///
/// Root actors spawned from here live under `/user`. The reference is
/// cheaply cloneable and is carried by every [`ActorRef`] of the system for
/// registry access (path resolution, children snapshots, cascades).
pub struct SystemRef<M: Message> {
    /// The actors running in this actor system, by path.
    actors: Arc<RwLock<HashMap<ActorPath, NodeEntry<M>>>>,
    /// Lifecycle of the system root itself.
    lifecycle: Arc<LifecycleCell>,
    /// Root of the terminate cascade; every node token descends from it.
    subtree: CancellationToken,
    /// Serial source for generated names and ask correlation.
    counter: Arc<AtomicUsize>,
    /// Channel towards the system runner.
    event_sender: mpsc::Sender<SystemEvent>,
}

impl<M: Message> Clone for SystemRef<M> {
    fn clone(&self) -> Self {
        Self {
            actors: self.actors.clone(),
            lifecycle: self.lifecycle.clone(),
            subtree: self.subtree.clone(),
            counter: self.counter.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}

impl<M: Message> SystemRef<M> {
    /// Creates the system reference and its shutdown watcher.
    pub(crate) fn new(
        event_sender: mpsc::Sender<SystemEvent>,
        token: CancellationToken,
    ) -> Self {
        let system = SystemRef {
            actors: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Arc::new(LifecycleCell::new()),
            subtree: CancellationToken::new(),
            counter: Arc::new(AtomicUsize::new(0)),
            event_sender,
        };

        let watcher = system.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            watcher.stop().await;
        });

        system
    }

    /// Spawns a root actor with the default (stop) supervision.
    ///
    /// See [`ActorRef::spawn`] for naming and failure semantics.
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

    /// Spawns a root actor with an explicit supervision strategy.
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
        if self.lifecycle.get() != Lifecycle::Running {
            return Err(Error::AlreadyStopped(ActorPath::from("/")));
        }
        let factory: BehaviorFactory<M> =
            Arc::new(move || -> Box<dyn Handler<M>> { Box::new(factory()) });
        self.spawn_under(
            ActorPath::from(USER_ROOT),
            &self.subtree,
            factory,
            name,
            strategy,
        )
        .await
    }

    /// Spawns a fixed (stateless) root actor.
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

    /// Spawns a fixed root actor with an explicit supervision strategy.
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

    /// Registers and starts a new actor node under `parent`.
    ///
    /// Registration happens before the runner task starts, so the child is
    /// visible to its parent (and name collisions are detected) at the
    /// moment the spawn call returns.
    pub(crate) async fn spawn_under(
        &self,
        parent: ActorPath,
        parent_token: &CancellationToken,
        factory: BehaviorFactory<M>,
        name: Option<&str>,
        strategy: SupervisionStrategy,
    ) -> Result<ActorRef<M>, Error> {
        let (mailbox_sender, mailbox_receiver) = mailbox();
        let (control_sender, control_receiver) =
            mpsc::channel(CONTROL_CAPACITY);
        let token = parent_token.child_token();
        let lifecycle = Arc::new(LifecycleCell::new());
        let strategy = Arc::new(strategy);

        let path = {
            let mut actors = self.actors.write().await;
            let path = match name {
                Some(name) => {
                    let path = parent.clone() / name;
                    if actors.contains_key(&path) {
                        error!("Actor '{}' already exists!", path);
                        return Err(Error::NameCollision(
                            name.to_owned(),
                            parent,
                        ));
                    }
                    path
                }
                None => loop {
                    let serial =
                        self.counter.fetch_add(1, Ordering::Relaxed);
                    let candidate =
                        parent.clone() / &format!("actor-{}", serial);
                    if !actors.contains_key(&candidate) {
                        break candidate;
                    }
                },
            };
            actors.insert(
                path.clone(),
                NodeEntry {
                    mailbox: mailbox_sender.clone(),
                    control: control_sender.clone(),
                    token: token.clone(),
                    lifecycle: lifecycle.clone(),
                    strategy: strategy.clone(),
                },
            );
            path
        };

        debug!("Spawned actor {}.", path);
        let actor_ref = ActorRef::node(
            path.clone(),
            mailbox_sender,
            control_sender,
            token.clone(),
            lifecycle.clone(),
            self.clone(),
        );
        let runner = ActorRunner::new(
            path,
            factory,
            strategy,
            mailbox_receiver,
            control_receiver,
            token,
            lifecycle,
            self.clone(),
            actor_ref.clone(),
        );
        tokio::spawn(runner.run());
        Ok(actor_ref)
    }

    /// Retrieves the live actor at `path`, or `None` if no such actor.
    pub async fn get_actor(&self, path: &ActorPath) -> Option<ActorRef<M>> {
        let actors = self.actors.read().await;
        actors.get(path).map(|entry| self.make_ref(path, entry))
    }

    /// Resolves a path given in string form.
    ///
    /// Only local paths are supported; representations carrying a scheme
    /// fail with [`Error::UnsupportedPath`]. A well-formed path that names
    /// no live actor resolves to `Ok(None)`, never an error.
    pub async fn find_actor(
        &self,
        path: &str,
    ) -> Result<Option<ActorRef<M>>, Error> {
        let path = ActorPath::parse(path)?;
        Ok(self.get_actor(&path).await)
    }

    /// Snapshot of the names of the system's root actors.
    pub async fn children(&self) -> Vec<String> {
        self.child_names(&ActorPath::from(USER_ROOT)).await
    }

    /// True once the system is stopping or stopped.
    pub fn is_stopped(&self) -> bool {
        self.lifecycle.get() != Lifecycle::Running
    }

    /// Gracefully stops the whole tree: every root actor stops (cascading
    /// through its descendants), then the system runner is released.
    /// Idempotent.
    pub async fn stop(&self) {
        if self.lifecycle.get() == Lifecycle::Stopped {
            return;
        }
        self.lifecycle.advance(Lifecycle::Stopping);
        debug!("Stopping actor system...");
        for root in self.children_refs(&ActorPath::from(USER_ROOT)).await {
            root.stop().await;
        }
        self.lifecycle.advance(Lifecycle::Stopped);
        let _ = self.event_sender.send(SystemEvent::StopSystem).await;
    }

    /// Forcefully terminates the whole tree without waiting for in-flight
    /// work. Idempotent.
    pub async fn terminate(&self) {
        if self.lifecycle.get() != Lifecycle::Stopped {
            self.lifecycle.advance(Lifecycle::Stopped);
            debug!("Terminating actor system...");
            let mut actors = self.actors.write().await;
            for (_, entry) in actors.drain() {
                entry.lifecycle.advance(Lifecycle::Stopped);
            }
        }
        self.subtree.cancel();
        let _ = self.event_sender.send(SystemEvent::StopSystem).await;
    }

    /// Serial source for generated names and ask correlation ids.
    pub(crate) fn next_serial(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Removes an actor from the registry. Missing paths are ignored.
    pub(crate) async fn remove_actor(&self, path: &ActorPath) {
        let mut actors = self.actors.write().await;
        actors.remove(path);
    }

    /// Deregisters `root` and every descendant, marking them stopped.
    /// Backs the terminate cascade so the tree is gone from the registry
    /// before the runners unwind.
    pub(crate) async fn discard_subtree(&self, root: &ActorPath) {
        let mut actors = self.actors.write().await;
        let doomed: Vec<ActorPath> = actors
            .keys()
            .filter(|path| *path == root || path.is_descendant_of(root))
            .cloned()
            .collect();
        for path in doomed {
            if let Some(entry) = actors.remove(&path) {
                entry.lifecycle.advance(Lifecycle::Stopped);
            }
        }
    }

    /// Paths of the direct children of `path`.
    pub(crate) async fn child_paths(
        &self,
        path: &ActorPath,
    ) -> Vec<ActorPath> {
        let actors = self.actors.read().await;
        actors
            .keys()
            .filter(|candidate| candidate.is_child_of(path))
            .cloned()
            .collect()
    }

    /// Sorted names of the direct children of `path`; always a copy.
    pub(crate) async fn child_names(&self, path: &ActorPath) -> Vec<String> {
        let mut names: Vec<String> = self
            .child_paths(path)
            .await
            .iter()
            .map(|child| child.name())
            .collect();
        names.sort();
        names
    }

    /// References to the direct children of `path`.
    pub(crate) async fn children_refs(
        &self,
        path: &ActorPath,
    ) -> Vec<ActorRef<M>> {
        let actors = self.actors.read().await;
        actors
            .iter()
            .filter(|(candidate, _)| candidate.is_child_of(path))
            .map(|(candidate, entry)| self.make_ref(candidate, entry))
            .collect()
    }

    /// Supervision strategy attached to the node at `path`.
    pub(crate) async fn strategy_of(
        &self,
        path: &ActorPath,
    ) -> Option<Arc<SupervisionStrategy>> {
        let actors = self.actors.read().await;
        actors.get(path).map(|entry| entry.strategy.clone())
    }

    /// Signals a graceful stop to the node at `path` without awaiting its
    /// cascade. Used on the supervision path.
    pub(crate) async fn signal_stop(&self, path: &ActorPath) {
        let entry = { self.actors.read().await.get(path).cloned() };
        if let Some(entry) = entry {
            entry.lifecycle.advance(Lifecycle::Stopping);
            if entry.control.try_send(Control::Stop(None)).is_err() {
                error!("Could not signal stop to actor {}.", path);
            }
        }
    }

    /// Signals a behavior restart to the node at `path`.
    pub(crate) async fn signal_restart(&self, path: &ActorPath) {
        let entry = { self.actors.read().await.get(path).cloned() };
        if let Some(entry) = entry {
            if entry.control.try_send(Control::Restart).is_err() {
                error!("Could not signal restart to actor {}.", path);
            }
        }
    }

    fn make_ref(&self, path: &ActorPath, entry: &NodeEntry<M>) -> ActorRef<M> {
        ActorRef::node(
            path.clone(),
            entry.mailbox.clone(),
            entry.control.clone(),
            entry.token.clone(),
            entry.lifecycle.clone(),
            self.clone(),
        )
    }
}

/// System runner: completes once the system has stopped.
pub struct SystemRunner {
    /// The event receiver.
    event_receiver: mpsc::Receiver<SystemEvent>,
}

impl SystemRunner {
    /// Create a new system runner.
    pub(crate) fn new(event_receiver: mpsc::Receiver<SystemEvent>) -> Self {
        Self { event_receiver }
    }

    /// Run the actor system until it is stopped or terminated.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        while let Some(event) = self.event_receiver.recv().await {
            match event {
                SystemEvent::StopSystem => {
                    debug!("Actor system stopped.");
                    break;
                }
            }
        }
    }
}
