// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type, the hierarchical address
//! of an actor within one actor system instance.
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt::Formatter;

/// Hierarchical, slash-delimited address of an actor in the system tree.
///
/// A path is an immutable, ordered sequence of segment names from the root.
/// Two paths are equal iff their segment sequences are equal. Paths follow a
/// filesystem-like structure: `/user/manager/worker` names an actor "worker"
/// supervised by "manager", itself a root actor under `/user`.
///
/// All operations are immutable and return new instances, so paths are safe
/// to share across tasks and to embed in messages.
///
/// ```ignore
/// use arbor::ActorPath;
///
/// let worker = ActorPath::from("/user/manager/worker");
/// assert_eq!(worker.name(), "worker");
/// assert_eq!(worker.parent().to_string(), "/user/manager");
/// assert!(worker.is_descendant_of(&ActorPath::from("/user")));
///
/// let sibling = worker.parent() / "auditor";
/// assert_eq!(sibling.to_string(), "/user/manager/auditor");
/// ```
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath(Vec<String>);

impl ActorPath {
    /// Parses a path, rejecting non-local representations.
    ///
    /// Only local in-process paths are resolvable. Any representation that
    /// carries a scheme (`remote://host/a`, `tcp://...`) is unsupported and
    /// fails with [`Error::UnsupportedPath`]. Plain local forms parse exactly
    /// as `ActorPath::from` does.
    pub fn parse(str: &str) -> Result<Self, Error> {
        if str.contains("://") {
            return Err(Error::UnsupportedPath(str.to_owned()));
        }
        Ok(ActorPath::from(str))
    }

    /// The top-level segment of this path as a path of its own.
    pub fn root(&self) -> Self {
        if self.0.len() == 1 {
            self.clone()
        } else if !self.0.is_empty() {
            ActorPath(self.0.iter().take(1).cloned().collect())
        } else {
            ActorPath(Vec::new())
        }
    }

    /// The path of this actor's parent.
    ///
    /// Top-level and empty paths have no parent and yield the empty path.
    pub fn parent(&self) -> Self {
        if self.0.len() > 1 {
            let mut segments = self.0.clone();
            segments.truncate(segments.len() - 1);
            ActorPath(segments)
        } else {
            ActorPath(Vec::new())
        }
    }

    /// The final segment: the actor's name within its parent's scope.
    ///
    /// Empty paths yield an empty string.
    pub fn name(&self) -> String {
        self.0.last().cloned().unwrap_or_default()
    }

    /// Depth of this path: 0 for the empty path, 1 for top-level actors.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// This path truncated to the given depth (1-based).
    ///
    /// Levels outside `1..self.level()` return the path unchanged.
    pub fn at_level(&self, level: usize) -> Self {
        if level < 1 || level >= self.level() {
            self.clone()
        } else {
            let mut segments = self.0.clone();
            segments.truncate(level);
            ActorPath(segments)
        }
    }

    /// True if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the path has exactly one segment.
    pub fn is_top_level(&self) -> bool {
        self.0.len() == 1
    }

    /// True if this path is a proper ancestor (direct or indirect
    /// supervisor) of `other`. No path is its own ancestor.
    pub fn is_ancestor_of(&self, other: &ActorPath) -> bool {
        let me = format!("{}/", self);
        other.to_string().as_str().starts_with(me.as_str())
    }

    /// True if this path is a proper descendant of `other`.
    pub fn is_descendant_of(&self, other: &ActorPath) -> bool {
        let me = self.to_string();
        me.as_str().starts_with(format!("{}/", other).as_str())
    }

    /// True if this path is the direct parent of `other`.
    pub fn is_parent_of(&self, other: &ActorPath) -> bool {
        *self == other.parent()
    }

    /// True if this path is a direct child of `other`.
    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        self.parent() == *other
    }
}

impl From<&str> for ActorPath {
    fn from(str: &str) -> Self {
        let segments: Vec<String> = str
            .split('/')
            .filter(|x| !x.trim().is_empty())
            .map(|s| s.to_string())
            .collect();
        ActorPath(segments)
    }
}

impl From<String> for ActorPath {
    fn from(string: String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl From<&String> for ActorPath {
    fn from(string: &String) -> Self {
        ActorPath::from(string.as_str())
    }
}

/// Child path construction: `path / "name"`.
///
/// The right-hand side is parsed with the same rules as `From<&str>`, so
/// multi-segment extensions (`path / "a/b"`) append every segment.
impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut segments = self.0;
        let mut extension: Vec<String> = rhs
            .split('/')
            .filter(|x| !x.trim().is_empty())
            .map(|s| s.to_string())
            .collect();

        segments.append(&mut extension);
        ActorPath(segments)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self.level().cmp(&1) {
            Ordering::Less => write!(f, "/"),
            Ordering::Equal => write!(f, "/{}", self.0[0]),
            Ordering::Greater => write!(f, "/{}", self.0.join("/")),
        }
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self)
    }
}
