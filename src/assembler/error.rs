//! Phase-specific error types with rich diagnostics.
//!
//! Every variant names the node path and the assembler identity, so a failed
//! cycle can be logged with full context by whoever schedules the next one.

use miette::Diagnostic;
use thiserror::Error;

use super::AdapterError;
use crate::agent::AgentError;
use crate::error::{DocumentError, NavigateError};

/// Building the assembler tree failed. Aborts the whole cycle.
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error("navigating to {assembler}'s {document} document at {path} failed: {source}")]
    #[diagnostic(
        code(orbiter::build::navigation),
        help(
            "The document has no resource where the assembler expects one, or a section \
             has the wrong shape. This will not heal by retrying; correct the document."
        )
    )]
    Navigation {
        assembler: String,
        path: String,
        document: &'static str,
        #[source]
        source: NavigateError,
    },

    #[error("building assembler {assembler} at {path} failed: {source}")]
    #[diagnostic(
        code(orbiter::build::adapter),
        help(
            "The adapter rejected its desired configuration or could not resolve a \
             dependency. Check the inner cause; transient lookups may succeed next cycle."
        )
    )]
    Adapter {
        assembler: String,
        path: String,
        #[source]
        source: AdapterError,
    },

    #[error("assembler {assembler} at {path} declared more agent changes than its queue holds: {source}")]
    #[diagnostic(
        code(orbiter::build::agent),
        help(
            "The build overflowed its agent change queue, whether or not the adapter handled \
             the error. Raise `agent_queue_capacity` or declare fewer agents per assembler."
        )
    )]
    Agent {
        assembler: String,
        path: String,
        #[source]
        source: AgentError,
    },
}

/// Converging the tree failed. Aborts the failing node's ancestors only.
#[derive(Debug, Error, Diagnostic)]
pub enum EnsureError {
    #[error("ensuring assembler {assembler} at {path} failed: {source}")]
    #[diagnostic(
        code(orbiter::ensure::adapter),
        help(
            "The adapter could not converge its resource, typically because of an \
             infrastructure or network failure. The next cycle retries it."
        )
    )]
    Adapter {
        assembler: String,
        path: String,
        #[source]
        source: AdapterError,
    },

    #[error("ensuring assembler {assembler} at {path} was cancelled")]
    #[diagnostic(
        code(orbiter::ensure::cancelled),
        help("The cycle's context was cancelled or ran past its deadline before this node converged.")
    )]
    Cancelled { assembler: String, path: String },
}

impl EnsureError {
    /// Path of the node that failed.
    pub fn path(&self) -> &str {
        match self {
            EnsureError::Adapter { path, .. } | EnsureError::Cancelled { path, .. } => path,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EnsureError::Cancelled { .. })
    }
}

/// Folding results back into the current document failed for one subtree.
///
/// Indicates a document invariant violation rather than a transient fault.
#[derive(Debug, Error, Diagnostic)]
pub enum RebuildError {
    #[error("navigating to {assembler}'s current state at {path} failed: {source}")]
    #[diagnostic(
        code(orbiter::rebuild::navigation),
        help(
            "The current document has a non-mapping value where a resource or agent \
             section must be written. The persisted document is inconsistent."
        )
    )]
    Navigation {
        assembler: String,
        path: String,
        #[source]
        source: NavigateError,
    },

    #[error("serializing {assembler}'s current state at {path} failed: {source}")]
    #[diagnostic(
        code(orbiter::rebuild::serialize),
        help("The adapter's state type cannot be represented as a document.")
    )]
    Serialize {
        assembler: String,
        path: String,
        #[source]
        source: DocumentError,
    },

    #[error("{assembler}'s current state at {path} serialized to a {found}, expected a mapping")]
    #[diagnostic(
        code(orbiter::rebuild::state_shape),
        help(
            "A node's state must be a mapping so its children and agents can be nested \
             inside it. Wrap scalar state in a struct."
        )
    )]
    StateShape {
        assembler: String,
        path: String,
        found: &'static str,
    },

    #[error("agent change {agent} does not lie below {assembler} at {path}")]
    #[diagnostic(
        code(orbiter::rebuild::agent_path),
        help("Agent changes must address a strict descendant of the node that queued them.")
    )]
    AgentPath {
        assembler: String,
        path: String,
        agent: String,
    },
}
