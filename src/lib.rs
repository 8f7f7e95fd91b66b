// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Arbor
//!
//! A lightweight, hierarchical actor runtime. Actors are isolated units of
//! computation that communicate exclusively through asynchronous messages,
//! are organized in a strict parent/child tree, and are supervised for
//! failure.
//!
//! ## Model
//!
//! - **Mailbox-serialized processing.** Every actor owns a FIFO mailbox and
//!   processes one message at a time: the next envelope is not dequeued
//!   until the current handler future has fully resolved, even across
//!   asynchronous suspension points. Behaviors therefore never observe
//!   concurrent invocation and need no locks around their own state.
//! - **Behavior trampolining.** A behavior handles one message and returns
//!   the [`Behavior`] to use for the next one: install a new handler
//!   (stateful actors advance by replacement), keep the current one, or
//!   stop. State lives in the handler values themselves, not in shared
//!   mutable fields.
//! - **Hierarchical addressing.** Actors are named by slash-delimited
//!   [`ActorPath`]s under the system root; spawning registers a child under
//!   its parent, and stopping a node cascades through its subtree.
//! - **Tell and ask.** [`ActorRef::tell`] is fire-and-forget;
//!   [`ActorRef::ask`] sends with an ephemeral reply reference as sender
//!   and resolves with exactly one correlated reply or a timeout.
//! - **Supervision.** Failures raised inside a behavior never leak to the
//!   sender. The node's [`SupervisionStrategy`] turns each failure into a
//!   [`Directive`]: restart from the behavior factory, continue, escalate
//!   to the parent, or stop.
//!
//! ## Example
//!
//! ```ignore
//! use arbor::{
//!     ActorContext, ActorSystem, Behavior, Error, Handler, Message,
//! };
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone)]
//! enum Msg {
//!     Append(String),
//!     Query,
//!     Text(String),
//! }
//!
//! impl Message for Msg {}
//!
//! // A stateful actor: every message trampolines to the handler that
//! // carries the next state.
//! struct Accumulator {
//!     text: String,
//! }
//!
//! #[async_trait]
//! impl Handler<Msg> for Accumulator {
//!     async fn handle(
//!         &mut self,
//!         message: Msg,
//!         ctx: &mut ActorContext<Msg>,
//!     ) -> Result<Behavior<Msg>, Error> {
//!         match message {
//!             Msg::Append(part) => Ok(Behavior::next(Accumulator {
//!                 text: format!("{}{}", self.text, part),
//!             })),
//!             Msg::Query => {
//!                 if let Some(sender) = ctx.sender().cloned() {
//!                     ctx.tell(&sender, Msg::Text(self.text.clone())).await?;
//!                 }
//!                 Ok(Behavior::Same)
//!             }
//!             Msg::Text(_) => Ok(Behavior::Same),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let (system, mut runner) =
//!         ActorSystem::create::<Msg>(CancellationToken::new());
//!     tokio::spawn(async move { runner.run().await });
//!
//!     let accumulator = system
//!         .spawn(|| Accumulator { text: String::new() }, Some("accumulator"))
//!         .await?;
//!     accumulator.tell(Msg::Append("Hello ".to_owned())).await?;
//!     accumulator.tell(Msg::Append("World. ".to_owned())).await?;
//!     if let Msg::Text(text) = accumulator.ask(Msg::Query).await? {
//!         assert_eq!(text, "Hello World. ");
//!     }
//!
//!     system.stop().await;
//!     Ok(())
//! }
//! ```

mod actor;
mod error;
mod mailbox;
mod path;
mod runner;
mod supervision;
mod system;

/// The behavior trait: handles one message and yields the behavior for the
/// next one.
pub use actor::Handler;

/// Trampoline outcome of handling one message.
pub use actor::Behavior;

/// Marker trait for messages exchanged between actors.
pub use actor::Message;

/// Execution context exposed to behaviors while they process a message.
pub use actor::ActorContext;

/// Capability-limited handle to an actor: tell/ask/spawn/stop/terminate.
pub use actor::ActorRef;

/// Closure-backed handler and its constructor.
pub use actor::{FnHandler, from_fn};

/// Reply window used by `ask` when no explicit timeout is given.
pub use actor::DEFAULT_ASK_TIMEOUT;

/// Error type for the actor system.
pub use error::Error;

/// Hierarchical actor address.
pub use path::ActorPath;

/// Supervision verdicts, failure context and strategies.
pub use supervision::{
    Decider, Directive, FailureInfo, SupervisionScope, SupervisionStrategy,
};

/// Entry point for creating actor systems.
pub use system::ActorSystem;

/// System-level events consumed by the system runner.
pub use system::SystemEvent;

/// Reference to the actor system: the root of the actor tree.
pub use system::SystemRef;

/// Runner that completes once the system has stopped.
pub use system::SystemRunner;
