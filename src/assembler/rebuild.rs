//! Current-State Rebuilder: fold a converged tree into a new current document.
//!
//! Walks the tree bottom-up. Each node with a state gets a freshly assembled
//! `current` section made of its own serialized state, the entries its
//! children just wrote and the agent records it queued during Build. Nodes
//! without a state keep whatever the previous document held for them, but
//! their agent records are still written.

use super::build::AssemblerTree;
use super::error::RebuildError;
use crate::agent::{AgentChange, AgentRecordTags};
use crate::config::ReconcileConfig;
use crate::document::{self, CURRENT, Document, KIND, Mapping, STATE, VERSION};
use crate::error::NavigateError;
use crate::navigate::{self, Mode, format_path};

/// Result type for rebuilding a single node.
pub type RebuildResult<T> = std::result::Result<T, RebuildError>;

/// Output of [`rebuild`].
#[derive(Debug)]
pub struct Rebuilt {
    /// The new current document.
    pub document: Document,
    /// One entry per node whose state could not be written.
    pub failures: Vec<RebuildError>,
}

impl Rebuilt {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Produce the next current document from `current` and the tree's results.
///
/// `current` is left untouched. A node that cannot be written is reported in
/// [`Rebuilt::failures`] and leaves its previous entry in place; its siblings
/// and ancestors are still written. Every node's agent queue is drained.
pub fn rebuild(current: &Document, tree: &mut AssemblerTree, config: &ReconcileConfig) -> Rebuilt {
    let mut document = current.clone();
    let mut failures = Vec::new();
    fold(&mut document, tree, &config.agent_record, &mut failures);
    tracing::debug!(
        assembler = %tree.identity,
        failures = failures.len(),
        "current state rebuilt"
    );
    Rebuilt { document, failures }
}

fn fold(
    out: &mut Document,
    node: &mut AssemblerTree,
    tags: &AgentRecordTags,
    failures: &mut Vec<RebuildError>,
) {
    for child in node.children.values_mut() {
        fold(out, child, tags, failures);
    }

    let changes = node.agent_changes.drain();
    if node.current_state.is_none() {
        if !changes.is_empty() {
            tracing::debug!(
                assembler = %node.identity,
                path = %format_path(&node.path),
                changes = changes.len(),
                "node did not converge, writing its agent records only"
            );
        }
        for change in changes {
            if let Err(e) = write_agent_record(out, node, change, tags) {
                tracing::warn!(
                    assembler = %node.identity,
                    path = %format_path(&node.path),
                    error = %e,
                    "failed to write agent record"
                );
                failures.push(e);
            }
        }
        return;
    }

    if let Err(e) = write_node(out, node, changes, tags) {
        tracing::warn!(
            assembler = %node.identity,
            path = %format_path(&node.path),
            error = %e,
            "failed to write node state"
        );
        failures.push(e);
    }
}

fn write_node(
    out: &mut Document,
    node: &AssemblerTree,
    changes: Vec<AgentChange>,
    tags: &AgentRecordTags,
) -> RebuildResult<()> {
    let navigation = |source: NavigateError| RebuildError::Navigation {
        assembler: node.identity.clone(),
        path: format_path(&node.path),
        source,
    };

    let Some(state) = node.current_state.as_ref() else {
        return Ok(());
    };
    let serialized = state.to_document().map_err(|source| RebuildError::Serialize {
        assembler: node.identity.clone(),
        path: format_path(&node.path),
        source,
    })?;
    let mut entries = match serialized {
        Document::Object(map) => map,
        Document::Null => Mapping::new(),
        other => {
            return Err(RebuildError::StateShape {
                assembler: node.identity.clone(),
                path: format_path(&node.path),
                found: document::shape_name(&other),
            });
        }
    };

    // Children share a segment when their paths fork further down; the
    // first take moves the whole shared entry.
    for child in node.children.values() {
        let Some(segment) = child.relative.first() else {
            continue;
        };
        if let Some(entry) = take_entry(out, &node.path, segment).map_err(navigation)? {
            entries.insert(segment.clone(), entry);
        }
    }

    if !changes.is_empty() {
        entries = apply_agent_changes(node, entries, changes, tags)?;
    }

    let target = navigate::materialize(out, &node.path, Mode::Current).map_err(navigation)?;
    target.insert(KIND.into(), Document::String(node.kind.clone()));
    target.insert(VERSION.into(), Document::String(node.version.clone()));
    target.insert(CURRENT.into(), section(node, entries));
    tracing::debug!(
        assembler = %node.identity,
        path = %format_path(&node.path),
        "node state written"
    );
    Ok(())
}

/// Remove and return `current.state.<segment>` of the node at `path`.
fn take_entry(
    out: &mut Document,
    path: &[String],
    segment: &str,
) -> Result<Option<Document>, NavigateError> {
    let node = match navigate::navigate_mut(out, path, Mode::Current) {
        Ok(node) => node,
        Err(NavigateError::PathNotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(node
        .get_mut(CURRENT)
        .and_then(|current| current.get_mut(STATE))
        .and_then(Document::as_object_mut)
        .and_then(|state| state.remove(segment)))
}

/// Write one agent record straight into `out`, leaving the node's own entry
/// as the previous document had it.
fn write_agent_record(
    out: &mut Document,
    node: &AssemblerTree,
    change: AgentChange,
    tags: &AgentRecordTags,
) -> RebuildResult<()> {
    agent_relative(node, &change)?;
    let slot = navigate::materialize(out, &change.path, Mode::Current).map_err(|source| {
        RebuildError::Navigation {
            assembler: node.identity.clone(),
            path: format_path(&change.path),
            source,
        }
    })?;
    *slot = tags.record(change.spec, change.observed);
    Ok(())
}

/// The change's path below the node; it must name something strictly inside.
fn agent_relative<'a>(
    node: &AssemblerTree,
    change: &'a AgentChange,
) -> RebuildResult<&'a [String]> {
    match change.path.strip_prefix(node.path.as_slice()) {
        Some(relative) if !relative.is_empty() => Ok(relative),
        _ => Err(RebuildError::AgentPath {
            assembler: node.identity.clone(),
            path: format_path(&node.path),
            agent: format_path(&change.path),
        }),
    }
}

/// Write agent records below the node, in enqueue order.
fn apply_agent_changes(
    node: &AssemblerTree,
    entries: Mapping,
    changes: Vec<AgentChange>,
    tags: &AgentRecordTags,
) -> RebuildResult<Mapping> {
    let mut scratch = Mapping::new();
    scratch.insert(CURRENT.into(), section(node, entries));
    let mut scratch = Document::Object(scratch);

    for change in changes {
        let relative = agent_relative(node, &change)?;
        let slot = navigate::materialize(&mut scratch, relative, Mode::Current).map_err(|source| {
            RebuildError::Navigation {
                assembler: node.identity.clone(),
                path: format_path(&change.path),
                source,
            }
        })?;
        *slot = tags.record(change.spec, change.observed);
    }

    Ok(scratch
        .get_mut(CURRENT)
        .and_then(|current| current.get_mut(STATE))
        .and_then(Document::as_object_mut)
        .map(std::mem::take)
        .unwrap_or_default())
}

fn section(node: &AssemblerTree, entries: Mapping) -> Document {
    let mut section = Mapping::new();
    section.insert(KIND.into(), Document::String(node.kind.clone()));
    section.insert(VERSION.into(), Document::String(node.version.clone()));
    section.insert(STATE.into(), Document::Object(entries));
    Document::Object(section)
}
