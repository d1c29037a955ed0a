//! Tree Builder: instantiate the assembler tree top-down.
//!
//! Each assembler declares its path relative to its parent. The builder
//! resolves the absolute path, narrows the desired and current documents to
//! that node, runs the optional spec rewrite, calls the adapter's Build and
//! recurses into the children it returned, in id order.

use std::collections::BTreeMap;
use std::fmt;

use super::error::BuildError;
use super::{Assembler, BuildContext, Built, BuiltConfig, CurrentState};
use crate::agent::{AgentAccessor, AgentQueue};
use crate::config::ReconcileConfig;
use crate::document::{self, Document, Mapping, SPEC};
use crate::error::NavigateError;
use crate::navigate::{self, Mode, format_path};
use crate::secrets::Secrets;

/// Result type for the Build phase.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

// Stand-in for a node the current document does not know yet.
static ABSENT: Document = Document::Null;

/// One instantiated assembler with its children and cycle bookkeeping.
pub struct AssemblerTree {
    pub(super) path: Vec<String>,
    pub(super) relative: Vec<String>,
    pub(super) identity: String,
    pub(super) node: Box<dyn Assembler>,
    pub(super) kind: String,
    pub(super) version: String,
    pub(super) current_state: Option<CurrentState>,
    pub(super) children: BTreeMap<String, AssemblerTree>,
    pub(super) agent_changes: AgentQueue,
}

impl AssemblerTree {
    /// Absolute path from the document root.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Path relative to the parent node. Empty for the root.
    pub fn relative_path(&self) -> &[String] {
        &self.relative
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// State reported by the last Ensure, if it produced one.
    pub fn current_state(&self) -> Option<&CurrentState> {
        self.current_state.as_ref()
    }

    pub fn children(&self) -> &BTreeMap<String, AssemblerTree> {
        &self.children
    }

    pub fn child(&self, id: &str) -> Option<&AssemblerTree> {
        self.children.get(id)
    }

    /// Follow a chain of child ids.
    pub fn descendant<S: AsRef<str>>(&self, ids: &[S]) -> Option<&AssemblerTree> {
        ids.iter()
            .try_fold(self, |node, id| node.children.get(id.as_ref()))
    }

    /// Agent changes queued during Build and not yet folded in.
    pub fn pending_agent_changes(&self) -> usize {
        self.agent_changes.len()
    }

    /// Every node, parent before children.
    pub fn nodes(&self) -> Vec<&AssemblerTree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.values().rev());
        }
        out
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .values()
            .map(AssemblerTree::node_count)
            .sum::<usize>()
    }

    /// Number of nodes holding a current state.
    pub fn converged(&self) -> usize {
        self.nodes()
            .iter()
            .filter(|node| node.current_state.is_some())
            .count()
    }
}

impl fmt::Debug for AssemblerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblerTree")
            .field("path", &format_path(&self.path))
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("current_state", &self.current_state)
            .field("agent_changes", &self.agent_changes.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Build the assembler tree rooted at `root`.
///
/// The root is built from the whole documents. `desired` is not modified;
/// spec rewrites apply to a private working copy that descendants read from.
/// Any failure aborts the whole build.
pub fn build(
    root: Box<dyn Assembler>,
    desired: &Document,
    current: &Document,
    secrets: &dyn Secrets,
    config: &ReconcileConfig,
) -> BuildResult<AssemblerTree> {
    let builder = Builder {
        current,
        secrets,
        config,
    };
    let mut working = desired.clone();
    let tree = builder.node(root, &mut working, None, None)?;
    tracing::debug!(
        assembler = %tree.identity,
        nodes = tree.node_count(),
        "assembler tree built"
    );
    Ok(tree)
}

struct Builder<'a> {
    current: &'a Document,
    secrets: &'a dyn Secrets,
    config: &'a ReconcileConfig,
}

impl Builder<'_> {
    fn node(
        &self,
        mut assembler: Box<dyn Assembler>,
        working: &mut Document,
        parent: Option<&[String]>,
        parent_config: Option<&BuiltConfig>,
    ) -> BuildResult<AssemblerTree> {
        let identity = assembler.identity();

        let (relative, path, rewrite) = match parent {
            None => (Vec::new(), Vec::new(), None),
            Some(parent) => {
                let BuildContext { path: relative, rewrite } = assembler.build_context();
                let mut path = parent.to_vec();
                path.extend(relative.iter().cloned());
                if relative.is_empty() {
                    return Err(BuildError::Adapter {
                        assembler: identity,
                        path: format_path(&path),
                        source: "child assemblers must declare a non-empty path below their parent"
                            .into(),
                    });
                }
                (relative, path, rewrite)
            }
        };

        let navigation = |document: &'static str| {
            let assembler = identity.clone();
            let at = format_path(&path);
            move |source: NavigateError| BuildError::Navigation {
                assembler,
                path: at,
                document,
                source,
            }
        };

        if let Some(rewrite) = rewrite {
            let node = navigate::navigate_mut(working, &path, Mode::Desired)
                .map_err(navigation("desired"))?;
            let spec = spec_mut(node, &path).map_err(navigation("desired"))?;
            rewrite(spec);
        }

        let desired = navigate::navigate(working, &path, Mode::Desired)
            .map_err(navigation("desired"))?;
        let current = navigate::lookup(self.current, &path, Mode::Current)
            .map_err(navigation("current"))?
            .unwrap_or(&ABSENT);

        let agent_changes = AgentQueue::new(self.config.agent_queue_capacity);
        let agents = AgentAccessor::new(&path, current, &agent_changes);
        let built = assembler.build(desired, &agents, self.secrets, parent_config);
        if let Some(source) = agent_changes.overflow() {
            return Err(BuildError::Agent {
                assembler: identity,
                path: format_path(&path),
                source,
            });
        }
        let Built {
            kind,
            version,
            config,
            children: pending,
        } = built.map_err(|source| BuildError::Adapter {
            assembler: identity.clone(),
            path: format_path(&path),
            source,
        })?;

        tracing::debug!(
            assembler = %identity,
            path = %format_path(&path),
            kind = %kind,
            children = pending.len(),
            agent_changes = agent_changes.len(),
            "assembler built"
        );

        let mut children = BTreeMap::new();
        for (id, child) in pending {
            let subtree = self.node(child, working, Some(&path), config.as_ref())?;
            children.insert(id, subtree);
        }

        Ok(AssemblerTree {
            path,
            relative,
            identity,
            node: assembler,
            kind,
            version,
            current_state: None,
            children,
            agent_changes,
        })
    }
}

/// The `spec` mapping of a desired node, created when absent.
fn spec_mut<'a>(node: &'a mut Document, path: &[String]) -> Result<&'a mut Mapping, NavigateError> {
    let map = match node {
        Document::Object(map) => map,
        other => {
            return Err(NavigateError::ShapeMismatch {
                at: format_path(path),
                found: document::shape_name(other),
            });
        }
    };
    let spec = map.entry(SPEC).or_insert(Document::Null);
    if spec.is_null() {
        *spec = Document::Object(Mapping::new());
    }
    match spec {
        Document::Object(spec) => Ok(spec),
        other => Err(NavigateError::ShapeMismatch {
            at: format!("{}/{SPEC}", format_path(path)),
            found: document::shape_name(other),
        }),
    }
}
