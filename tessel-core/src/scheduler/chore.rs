//! Chores: the units of scheduled work.
//!
//! A chore is identified by its [`ChoreKey`], the pair of what it does and
//! what it does it to. The scheduler never holds two chores with the same
//! key.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reactive::TaskId;
use crate::vnode::NodeId;

/// Drain tier. Tiers drain in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Work that must settle before rendering: tasks and resources.
    Sync,
    /// Component renders and binding patches.
    Render,
    /// Client-only visible tasks.
    Visible,
    /// Deferred housekeeping.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChoreKind {
    Task,
    Resource,
    Component,
    Binding,
    VisibleTask,
    /// Release a detached subtree from the vnode arena.
    Cleanup,
}

impl ChoreKind {
    pub fn priority(self) -> Priority {
        match self {
            ChoreKind::Task | ChoreKind::Resource => Priority::Sync,
            ChoreKind::Component | ChoreKind::Binding => Priority::Render,
            ChoreKind::VisibleTask => Priority::Visible,
            ChoreKind::Cleanup => Priority::Idle,
        }
    }
}

/// What a chore operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChoreTarget {
    Node(NodeId),
    Task(TaskId),
    /// A text binding (`attr == None`) or an attribute binding.
    Binding {
        node: NodeId,
        attr: Option<Arc<str>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoreKey {
    pub kind: ChoreKind,
    pub target: ChoreTarget,
}

impl fmt::Display for ChoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ChoreTarget::Node(node) => write!(f, "{:?}({node:?})", self.kind),
            ChoreTarget::Task(task) => write!(f, "{:?}(task {})", self.kind, task.raw()),
            ChoreTarget::Binding { node, attr } => match attr {
                Some(attr) => write!(f, "{:?}({node:?}.{attr})", self.kind),
                None => write!(f, "{:?}({node:?})", self.kind),
            },
        }
    }
}

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct Chore {
    pub key: ChoreKey,
    /// Vnode whose removal cancels this chore.
    pub host: Option<NodeId>,
    /// Symbol the chore runs, used to detect conflicting schedules.
    pub runnable: Option<Arc<str>>,
    pub(crate) seq: u64,
}

impl Chore {
    pub fn new(kind: ChoreKind, target: ChoreTarget) -> Self {
        Self {
            key: ChoreKey { kind, target },
            host: None,
            runnable: None,
            seq: 0,
        }
    }

    /// Render the component hosted at `node`.
    pub fn component(node: NodeId, symbol: &str) -> Self {
        Self::new(ChoreKind::Component, ChoreTarget::Node(node))
            .with_host(node)
            .with_runnable(symbol)
    }

    /// Re-evaluate a text or attribute binding on `node`.
    pub fn binding(node: NodeId, attr: Option<Arc<str>>) -> Self {
        Self::new(ChoreKind::Binding, ChoreTarget::Binding { node, attr }).with_host(node)
    }

    /// Free the detached subtree rooted at `node`.
    pub fn cleanup(node: NodeId) -> Self {
        Self::new(ChoreKind::Cleanup, ChoreTarget::Node(node))
    }

    pub fn with_host(mut self, host: NodeId) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_runnable(mut self, runnable: &str) -> Self {
        self.runnable = Some(Arc::from(runnable));
        self
    }

    pub fn kind(&self) -> ChoreKind {
        self.key.kind
    }

    pub fn target(&self) -> &ChoreTarget {
        &self.key.target
    }

    pub fn priority(&self) -> Priority {
        self.key.kind.priority()
    }

    /// Insertion sequence assigned by the scheduler.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Result of starting a chore.
pub enum ChoreOutcome {
    Done(Result<()>),
    /// The chore suspended; its key stays running until the future completes.
    Pending(BoxFuture<'static, Result<()>>),
}

impl From<Result<()>> for ChoreOutcome {
    fn from(result: Result<()>) -> Self {
        ChoreOutcome::Done(result)
    }
}
