//! Side channel for remote agent desired state.
//!
//! Assemblers deep in the tree compute what a per-machine agent should run,
//! but the agent reads its desired state from the current-state document, not
//! from the tree. During Build an assembler declares the agent's new spec on an
//! [`AgentHandle`]; the declaration is queued on the owning tree node and only
//! folded into the document by the rebuild phase, after every node converged.

use std::sync::{Mutex, MutexGuard};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{self, CURRENT, Document, KIND, Mapping, SPEC, VERSION};
use crate::error::NavigateError;
use crate::navigate::{self, Mode, format_path};

/// Kind tag written on agent records unless configured otherwise.
pub const DEFAULT_AGENT_KIND: &str = "nodeagent.caos.ch/NodeAgent";
/// Version tag written on agent records unless configured otherwise.
pub const DEFAULT_AGENT_VERSION: &str = "v0";

/// Errors raised while declaring agent changes.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("agent path must not be empty")]
    #[diagnostic(
        code(orbiter::agent::empty_path),
        help("An agent lives below the assembler that declares it. Pass the agent's id path.")
    )]
    EmptyPath,

    #[error("agent change queue full ({capacity} changes) at {path}")]
    #[diagnostic(
        code(orbiter::agent::queue_full),
        help(
            "A single build declared more agent changes than `agent_queue_capacity` allows. \
             Raise the capacity in the reconcile config; changes are never dropped silently."
        )
    )]
    QueueFull { path: String, capacity: usize },

    #[error("agent change queue closed, cannot declare {path}")]
    #[diagnostic(
        code(orbiter::agent::closed),
        help("Agent changes can only be declared while the owning assembler builds.")
    )]
    Closed { path: String },

    #[error("agent spec for {path} is not representable as a document: {source}")]
    #[diagnostic(code(orbiter::agent::spec))]
    Spec {
        path: String,
        #[source]
        source: crate::error::DocumentError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Navigation(#[from] NavigateError),
}

/// Result type for agent declarations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// "The agent at `path` should converge to `spec`."
#[derive(Debug, Clone, PartialEq)]
pub struct AgentChange {
    /// Absolute path of the agent, rooted at the document root.
    pub path: Vec<String>,
    /// New desired configuration of the agent.
    pub spec: Document,
    /// The agent's `current` section as seen when the handle was created.
    pub observed: Document,
}

#[derive(Debug, Default)]
struct QueueState {
    changes: Vec<AgentChange>,
    closed: bool,
    /// Path of the first change refused for lack of room.
    overflowed: Option<String>,
}

/// Bounded, per-node queue of agent changes.
///
/// Filled during Build, drained exactly once during rebuild. Draining closes
/// the queue, so a late declaration fails loudly instead of vanishing. An
/// overflow stays recorded on the queue even when the declaring assembler
/// ignores the error; see [`overflow`](Self::overflow).
#[derive(Debug)]
pub struct AgentQueue {
    capacity: usize,
    state: Mutex<QueueState>,
}

impl AgentQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a change.
    pub fn push(&self, change: AgentChange) -> AgentResult<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(AgentError::Closed {
                path: format_path(&change.path),
            });
        }
        if state.changes.len() >= self.capacity {
            let path = format_path(&change.path);
            state.overflowed.get_or_insert_with(|| path.clone());
            return Err(AgentError::QueueFull {
                path,
                capacity: self.capacity,
            });
        }
        state.changes.push(change);
        Ok(())
    }

    /// The first refused change, if the queue ever ran full.
    pub fn overflow(&self) -> Option<AgentError> {
        self.lock()
            .overflowed
            .clone()
            .map(|path| AgentError::QueueFull {
                path,
                capacity: self.capacity,
            })
    }

    /// Close the queue and take every queued change, in enqueue order.
    pub fn drain(&self) -> Vec<AgentChange> {
        let mut state = self.lock();
        state.closed = true;
        std::mem::take(&mut state.changes)
    }

    pub fn len(&self) -> usize {
        self.lock().changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    // The guarded data is a plain list; a panicking holder cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Hands out [`AgentHandle`]s during one node's Build.
///
/// Bound to the node's absolute path, its slice of the current document and
/// its change queue. Paths given to [`agent`](Self::agent) are relative to the
/// node.
#[derive(Debug, Clone, Copy)]
pub struct AgentAccessor<'a> {
    node_path: &'a [String],
    current: &'a Document,
    queue: &'a AgentQueue,
}

impl<'a> AgentAccessor<'a> {
    pub fn new(node_path: &'a [String], current: &'a Document, queue: &'a AgentQueue) -> Self {
        Self {
            node_path,
            current,
            queue,
        }
    }

    /// Handle for the agent at `relative` below this node.
    pub fn agent<S: AsRef<str>>(&self, relative: &[S]) -> AgentResult<AgentHandle<'a>> {
        if relative.is_empty() {
            return Err(AgentError::EmptyPath);
        }
        let observed = observed_section(self.current, relative)?;
        let mut path = self.node_path.to_vec();
        path.extend(relative.iter().map(|s| s.as_ref().to_owned()));
        Ok(AgentHandle {
            path,
            observed,
            queue: self.queue,
        })
    }
}

/// One remote agent, as seen by an assembler during Build.
#[derive(Debug)]
pub struct AgentHandle<'a> {
    path: Vec<String>,
    observed: Document,
    queue: &'a AgentQueue,
}

impl AgentHandle<'_> {
    /// Absolute path of the agent.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The agent's last observed `current` section. Empty mapping if the
    /// agent never reported.
    pub fn observed(&self) -> &Document {
        &self.observed
    }

    /// Declare the agent's new desired spec.
    ///
    /// Declaring several times is allowed; the last declaration wins.
    pub fn declare<T: Serialize + ?Sized>(&self, spec: &T) -> AgentResult<()> {
        let spec = document::to_document(spec).map_err(|source| AgentError::Spec {
            path: format_path(&self.path),
            source,
        })?;
        tracing::debug!(agent = %format_path(&self.path), "agent change declared");
        self.queue.push(AgentChange {
            path: self.path.clone(),
            spec,
            observed: self.observed.clone(),
        })
    }
}

/// Tags identifying a document entry as an agent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecordTags {
    pub kind: String,
    pub version: String,
}

impl Default for AgentRecordTags {
    fn default() -> Self {
        Self {
            kind: DEFAULT_AGENT_KIND.to_string(),
            version: DEFAULT_AGENT_VERSION.to_string(),
        }
    }
}

impl AgentRecordTags {
    /// Canonical agent record: `{kind, version, spec, current}`.
    pub fn record(&self, spec: Document, current: Document) -> Mapping {
        let mut record = Mapping::new();
        record.insert(KIND.into(), Document::String(self.kind.clone()));
        record.insert(VERSION.into(), Document::String(self.version.clone()));
        record.insert(SPEC.into(), spec);
        record.insert(CURRENT.into(), current);
        record
    }
}

/// The `current` section of the agent at `relative` below `node`, or an
/// empty mapping when the agent has no recorded state yet.
pub(crate) fn observed_section<S: AsRef<str>>(
    node: &Document,
    relative: &[S],
) -> Result<Document, NavigateError> {
    let observed = navigate::lookup(node, relative, Mode::Current)?
        .and_then(|agent| agent.get(CURRENT))
        .filter(|section| !section.is_null())
        .cloned()
        .unwrap_or_else(|| Document::Object(Mapping::new()));
    Ok(observed)
}
