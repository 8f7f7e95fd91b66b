// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Supervision strategies
//!

use crate::{ActorPath, Error};

use std::{fmt::Debug, sync::Arc, time::Duration};

/// Verdict returned by a supervision strategy for a failed actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Reinitialize the behavior from its factory, keeping mailbox and
    /// children.
    Restart,
    /// Discard the failing message and resume with the current behavior.
    Continue,
    /// Defer the decision to the parent's strategy.
    Escalate,
    /// Stop the actor, cascading to its children.
    Stop,
}

/// Context handed to a strategy's decider on the failure path.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    /// The failure raised by the behavior.
    pub error: Error,
    /// Path of the failing actor.
    pub path: ActorPath,
    /// Restarts already granted to the failing actor within the strategy's
    /// rolling window.
    pub retries: usize,
}

/// Which actors a verdict is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionScope {
    /// The verdict applies only to the failing actor.
    OneForOne,
    /// The verdict applies to all siblings under the same parent. For
    /// workloads with shared invariants across siblings.
    OneForAll,
}

/// Decision function of a strategy.
pub type Decider = dyn Fn(&FailureInfo) -> Directive + Send + Sync;

/// A supervision strategy: a pure decision function plus the retry budget
/// that bounds how many `Restart` verdicts are granted per rolling window.
/// Exceeding the budget is treated as `Stop`.
///
/// The default strategy stops unconditionally.
#[derive(Clone)]
pub struct SupervisionStrategy {
    decider: Arc<Decider>,
    scope: SupervisionScope,
    max_retries: usize,
    within: Duration,
}

/// Restarts granted per window unless configured otherwise.
const DEFAULT_MAX_RETRIES: usize = 3;

/// Rolling window for the retry budget unless configured otherwise.
const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10);

impl SupervisionStrategy {
    /// Strategy whose verdict is scoped to the single failing actor.
    pub fn one_for_one<F>(decider: F) -> Self
    where
        F: Fn(&FailureInfo) -> Directive + Send + Sync + 'static,
    {
        Self {
            decider: Arc::new(decider),
            scope: SupervisionScope::OneForOne,
            max_retries: DEFAULT_MAX_RETRIES,
            within: DEFAULT_RETRY_WINDOW,
        }
    }

    /// Strategy whose verdict is applied to all siblings of the failing
    /// actor.
    pub fn one_for_all<F>(decider: F) -> Self
    where
        F: Fn(&FailureInfo) -> Directive + Send + Sync + 'static,
    {
        Self {
            scope: SupervisionScope::OneForAll,
            ..Self::one_for_one(decider)
        }
    }

    /// Sets the restart budget: at most `max_retries` restarts within the
    /// rolling `within` window.
    pub fn with_retry_window(
        mut self,
        max_retries: usize,
        within: Duration,
    ) -> Self {
        self.max_retries = max_retries;
        self.within = within;
        self
    }

    /// The always-stop strategy, the inherited default.
    pub fn stop() -> Self {
        Self::one_for_one(|_| Directive::Stop)
    }

    pub(crate) fn decide(&self, failure: &FailureInfo) -> Directive {
        (self.decider)(failure)
    }

    pub(crate) fn scope(&self) -> SupervisionScope {
        self.scope
    }

    pub(crate) fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub(crate) fn within(&self) -> Duration {
        self.within
    }
}

impl Default for SupervisionStrategy {
    fn default() -> Self {
        Self::stop()
    }
}

impl Debug for SupervisionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisionStrategy")
            .field("scope", &self.scope)
            .field("max_retries", &self.max_retries)
            .field("within", &self.within)
            .finish()
    }
}
