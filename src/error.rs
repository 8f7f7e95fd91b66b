// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
///
/// Misuse of the API (spawning under a stopped parent, reusing a sibling
/// name, resolving a non-local path, addressing a reference kind that cannot
/// perform the operation) surfaces immediately at the call site. Failures
/// raised inside a behavior never reach the sender; they are contained by
/// supervision. The only way a target's trouble becomes visible to a caller
/// is through `ask`: a pre-stopped target or a missed reply window.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Operation attempted against an actor that is stopping or stopped.
    #[error("Actor {0} is already stopped.")]
    AlreadyStopped(ActorPath),
    /// A sibling with the requested name already exists.
    #[error("An actor named '{0}' already exists under {1}.")]
    NameCollision(String, ActorPath),
    /// The target reference cannot perform the requested operation.
    #[error("Not an addressable actor reference: {0}.")]
    Address(String),
    /// Path resolution attempted on a non-local path representation.
    #[error("Unsupported path representation: '{0}'. Only local paths can be resolved.")]
    UnsupportedPath(String),
    /// No reply arrived within the ask window.
    #[error("Ask to actor {0} timed out.")]
    AskTimeout(ActorPath),
    /// A failure raised inside a behavior, routed through supervision.
    #[error("Behavior failure: {0}")]
    Failure(String),
}
