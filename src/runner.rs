// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor execution engine
//!
//! Each actor node runs inside its own `ActorRunner` task. The runner owns
//! the behavior slot, the mailbox receiver and the control receiver, and it
//! enforces the two ordering guarantees the whole system rests on:
//!
//! - **FIFO per actor**: envelopes are delivered in strict arrival order.
//! - **Single-flight**: at most one envelope is in flight per actor. The
//!   next envelope is not dequeued until the current handler future has
//!   fully resolved, across all of its suspension points. Behaviors never
//!   need to guard against concurrent invocation.
//!
//! Between messages the loop gives priority, in order, to the terminate
//! token, to control signals (stop, restart) and only then to the mailbox.
//! While a message is in flight only the terminate token can interrupt it:
//! `stop` lets the current delivery finish, `terminate` abandons it at the
//! next yield point.
//!
//! Failures returned by a behavior are resolved here: the runner builds the
//! failure context, consults the supervision strategy of the node (walking
//! ancestors on `Escalate`) and applies the verdict. Verdicts aimed at
//! other nodes travel as control signals and are never awaited, so a
//! supervisor cannot deadlock against its own cascade.
//!

use crate::{
    ActorPath, Error,
    actor::{
        ActorContext, ActorRef, Behavior, BehaviorFactory, Handler,
        Lifecycle, LifecycleCell, Message,
    },
    mailbox::{Envelope, MailboxReceiver},
    supervision::{
        Directive, FailureInfo, SupervisionScope, SupervisionStrategy,
    },
    system::SystemRef,
};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

/// Control signals addressed to a runner, delivered with priority over
/// mailbox messages.
pub(crate) enum Control {
    /// Graceful stop. The optional sender is signalled once the node and
    /// its subtree have fully stopped.
    Stop(Option<oneshot::Sender<()>>),
    /// Discard the current behavior and reinitialize it from the factory,
    /// keeping mailbox and children.
    Restart,
}

pub(crate) type ControlSender = mpsc::Sender<Control>;
pub(crate) type ControlReceiver = mpsc::Receiver<Control>;

/// Capacity of the control channel. Control traffic is rare; the bound only
/// protects against signal flooding.
pub(crate) const CONTROL_CAPACITY: usize = 8;

/// What the loop observed in one turn.
enum Turn<M: Message> {
    Terminated,
    Control(Option<Control>),
    Message(Option<Envelope<M>>),
}

/// Whether the loop keeps running after a delivery.
enum Flow {
    Continue,
    Stop,
}

/// Execution engine for a single actor node.
pub(crate) struct ActorRunner<M: Message> {
    path: ActorPath,
    behavior: Box<dyn Handler<M>>,
    factory: BehaviorFactory<M>,
    strategy: Arc<SupervisionStrategy>,
    mailbox: MailboxReceiver<M>,
    control: ControlReceiver,
    token: CancellationToken,
    lifecycle: Arc<LifecycleCell>,
    system: SystemRef<M>,
    me: ActorRef<M>,
    restarts: VecDeque<Instant>,
}

impl<M: Message> ActorRunner<M> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        path: ActorPath,
        factory: BehaviorFactory<M>,
        strategy: Arc<SupervisionStrategy>,
        mailbox: MailboxReceiver<M>,
        control: ControlReceiver,
        token: CancellationToken,
        lifecycle: Arc<LifecycleCell>,
        system: SystemRef<M>,
        me: ActorRef<M>,
    ) -> Self {
        let behavior = (factory)();
        Self {
            path,
            behavior,
            factory,
            strategy,
            mailbox,
            control,
            token,
            lifecycle,
            system,
            me,
            restarts: VecDeque::new(),
        }
    }

    /// Runs the node until it stops, terminates or fails terminally.
    pub(crate) async fn run(mut self) {
        debug!("Running actor {}.", self.path);
        let mut ctx =
            ActorContext::new(self.me.clone(), self.system.clone());
        let token = self.token.clone();

        loop {
            let turn = tokio::select! {
                biased;
                _ = token.cancelled() => Turn::Terminated,
                control = self.control.recv() => Turn::Control(control),
                envelope = self.mailbox.recv() => Turn::Message(envelope),
            };

            match turn {
                Turn::Terminated => {
                    self.abandon().await;
                    return;
                }
                Turn::Control(Some(Control::Stop(done))) => {
                    self.shutdown(done).await;
                    return;
                }
                Turn::Control(Some(Control::Restart)) => {
                    debug!("Restarting behavior of actor {}.", self.path);
                    self.behavior = (self.factory)();
                }
                Turn::Control(None) | Turn::Message(None) => {
                    self.shutdown(None).await;
                    return;
                }
                Turn::Message(Some(envelope)) => {
                    // Single-flight: the delivery future is driven to
                    // completion before the next envelope is dequeued.
                    // Only the terminate token may preempt it.
                    let outcome = tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        flow = self.deliver(envelope, &mut ctx) => Some(flow),
                    };
                    match outcome {
                        None => {
                            self.abandon().await;
                            return;
                        }
                        Some(Flow::Stop) => {
                            self.shutdown(None).await;
                            return;
                        }
                        Some(Flow::Continue) => {}
                    }
                }
            }
        }
    }

    /// Delivers one envelope to the current behavior and applies the
    /// trampoline result.
    async fn deliver(
        &mut self,
        envelope: Envelope<M>,
        ctx: &mut ActorContext<M>,
    ) -> Flow {
        let (message, sender) = envelope.into_parts();
        ctx.set_sender(sender);
        match self.behavior.handle(message, ctx).await {
            Ok(Behavior::Continue(next)) => {
                self.behavior = next;
                Flow::Continue
            }
            Ok(Behavior::Same) => Flow::Continue,
            Ok(Behavior::Stop) => {
                debug!("Actor {} stopped by its behavior.", self.path);
                Flow::Stop
            }
            Err(failure) => self.failed(failure).await,
        }
    }

    /// The failure path. The failing message is already consumed; the
    /// verdict decides what handles the next one.
    async fn failed(&mut self, failure: Error) -> Flow {
        error!("Actor {} failed: {}", self.path, failure);

        let mut decider = self.path.clone();
        let mut strategy = self.strategy.clone();
        loop {
            let info = FailureInfo {
                error: failure.clone(),
                path: self.path.clone(),
                retries: self.restarts_within(strategy.within()),
            };
            let directive = strategy.decide(&info);
            debug!(
                "Supervision verdict of {} for failure of {}: {:?}",
                decider, self.path, directive
            );
            // The verdict applies to the decider's child on the failing
            // path: the failing actor itself while it is its own decider,
            // the subtree containing it once the failure has escalated.
            let target = self.path.at_level(decider.level() + 1);
            match directive {
                Directive::Continue => return Flow::Continue,
                Directive::Stop => {
                    self.apply_stop(&target, &strategy).await;
                    return Flow::Continue;
                }
                Directive::Restart => {
                    self.apply_restart(&target, &strategy).await;
                    return Flow::Continue;
                }
                Directive::Escalate => {
                    let parent = decider.parent();
                    match self.system.strategy_of(&parent).await {
                        Some(parent_strategy) => {
                            decider = parent;
                            strategy = parent_strategy;
                        }
                        None => {
                            // Escalation reached the top unresolved: stop
                            // the offending subtree, never the process.
                            let subtree =
                                self.path.at_level(decider.level());
                            self.system.signal_stop(&subtree).await;
                            return Flow::Continue;
                        }
                    }
                }
            }
        }
    }

    /// Applies a stop verdict to `target`, widened to all of its siblings
    /// for one-for-all strategies. Signals are not awaited; a stop aimed at
    /// this node arrives through its own control channel before the next
    /// message is dequeued.
    async fn apply_stop(
        &mut self,
        target: &ActorPath,
        strategy: &SupervisionStrategy,
    ) {
        for path in self.verdict_targets(target, strategy).await {
            self.system.signal_stop(&path).await;
        }
    }

    /// Applies a restart verdict. Restarts of the failing actor itself are
    /// counted against the strategy's rolling window; an exhausted budget
    /// turns the verdict into a stop.
    async fn apply_restart(
        &mut self,
        target: &ActorPath,
        strategy: &SupervisionStrategy,
    ) {
        let targets = self.verdict_targets(target, strategy).await;
        if targets.contains(&self.path) {
            if self.restarts_within(strategy.within())
                >= strategy.max_retries()
            {
                error!(
                    "Actor {} exhausted its restart budget.",
                    self.path
                );
                self.apply_stop(target, strategy).await;
                return;
            }
            self.restarts.push_back(Instant::now());
        }
        for path in targets {
            self.system.signal_restart(&path).await;
        }
    }

    async fn verdict_targets(
        &mut self,
        target: &ActorPath,
        strategy: &SupervisionStrategy,
    ) -> Vec<ActorPath> {
        match strategy.scope() {
            SupervisionScope::OneForOne => vec![target.clone()],
            SupervisionScope::OneForAll => {
                let siblings =
                    self.system.child_paths(&target.parent()).await;
                if siblings.is_empty() {
                    vec![target.clone()]
                } else {
                    siblings
                }
            }
        }
    }

    /// Restarts recorded within the rolling window ending now.
    fn restarts_within(&mut self, window: Duration) -> usize {
        let now = Instant::now();
        while let Some(first) = self.restarts.front() {
            if now.duration_since(*first) > window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        self.restarts.len()
    }

    /// Graceful shutdown: children stop recursively first, then the node
    /// deregisters. Queued envelopes are dropped with the mailbox.
    async fn shutdown(&mut self, done: Option<oneshot::Sender<()>>) {
        debug!("Stopping actor {}.", self.path);
        self.lifecycle.advance(Lifecycle::Stopping);
        for child in self.system.children_refs(&self.path).await {
            child.stop().await;
        }
        self.system.remove_actor(&self.path).await;
        self.lifecycle.advance(Lifecycle::Stopped);
        if let Some(done) = done {
            let _ = done.send(());
        }
        self.mailbox.close();
        debug!("Actor {} is stopped.", self.path);
    }

    /// Forced teardown after the terminate token fired. Descendants carry
    /// child tokens of this one and tear themselves down concurrently.
    async fn abandon(&mut self) {
        self.lifecycle.advance(Lifecycle::Stopped);
        self.system.remove_actor(&self.path).await;
        self.mailbox.close();
        debug!("Actor {} is terminated.", self.path);
    }
}
