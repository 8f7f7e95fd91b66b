// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Per-actor ordered queue of incoming envelopes. Each actor node owns
//! exactly one mailbox; envelopes are dequeued and delivered in strict
//! arrival order by the node's runner, which never has more than one
//! envelope in flight.
//!

use crate::actor::{ActorRef, Message};

use tokio::sync::mpsc;

/// A message together with the reference of its sender.
///
/// Envelopes are immutable once enqueued. The sender is absent for external
/// `tell`s and may be an ephemeral ask-reply reference for `ask`s.
pub(crate) struct Envelope<M: Message> {
    payload: M,
    sender: Option<ActorRef<M>>,
}

impl<M: Message> Envelope<M> {
    pub(crate) fn new(payload: M, sender: Option<ActorRef<M>>) -> Self {
        Self { payload, sender }
    }

    pub(crate) fn into_parts(self) -> (M, Option<ActorRef<M>>) {
        (self.payload, self.sender)
    }
}

/// Sender side of an actor's mailbox. Cloned into every reference that
/// addresses the actor.
pub(crate) type MailboxSender<M> = mpsc::UnboundedSender<Envelope<M>>;

/// Receiver side of an actor's mailbox, owned exclusively by the runner.
pub(crate) type MailboxReceiver<M> = mpsc::UnboundedReceiver<Envelope<M>>;

/// Creates a new unbounded mailbox. Sends never block; backpressure is left
/// to the application level.
pub(crate) fn mailbox<M: Message>() -> (MailboxSender<M>, MailboxReceiver<M>)
{
    mpsc::unbounded_channel()
}
