//! Assembler trees: the pluggable units the engine reconciles.
//!
//! An [`Assembler`] adapts one resource kind. The engine knows nothing about
//! kinds; it only drives the contract in three phases per cycle:
//!
//! 1. [`build`]: instantiate the tree top-down from the desired and current
//!    documents, collecting agent changes declared on the way.
//! 2. [`ensure`]: converge bottom-up; every node sees its children's results.
//! 3. [`rebuild`]: fold the results and the queued agent changes into a new
//!    current document.

pub mod build;
pub mod ensure;
pub mod error;
pub mod rebuild;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::agent::AgentAccessor;
use crate::context::Context;
use crate::document::{self, Document, Mapping};
use crate::error::DocumentResult;
use crate::navigate;
use crate::secrets::Secrets;

pub use build::{AssemblerTree, build};
pub use ensure::ensure;
pub use error::{BuildError, EnsureError, RebuildError};
pub use rebuild::{Rebuilt, rebuild};

/// Error type adapters report from Build and Ensure.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Opaque configuration a parent hands down to its children's Build.
pub type BuiltConfig = Arc<dyn Any + Send + Sync>;

/// Converged children of a node, by id.
pub type EnsuredChildren<'a> = BTreeMap<String, &'a CurrentState>;

/// Normalizes a node's desired `spec` mapping before Build reads it.
pub type Rewrite = Box<dyn FnOnce(&mut Mapping)>;

/// One resource kind's adapter.
pub trait Assembler: Send {
    /// Name used in logs and diagnostics.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Where this assembler lives relative to its parent, and an optional
    /// rewrite of its desired spec.
    fn build_context(&self) -> BuildContext;

    /// Turn the desired node document (`kind`, `version`, `spec`) into tags,
    /// configuration for the children and the children themselves.
    fn build(
        &mut self,
        desired: &Document,
        agents: &AgentAccessor<'_>,
        secrets: &dyn Secrets,
        parent: Option<&BuiltConfig>,
    ) -> Result<Built, AdapterError>;

    /// Converge the real resource, given the converged children.
    fn ensure(
        &mut self,
        ctx: &Context,
        secrets: &dyn Secrets,
        children: &EnsuredChildren<'_>,
    ) -> Result<CurrentState, EnsureFailure>;
}

/// Position of an assembler and its optional spec rewrite.
#[derive(Default)]
pub struct BuildContext {
    /// Path relative to the parent node.
    pub path: Vec<String>,
    pub rewrite: Option<Rewrite>,
}

impl BuildContext {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn at<S: AsRef<str>>(path: &[S]) -> Self {
        Self {
            path: navigate::to_path(path),
            rewrite: None,
        }
    }

    pub fn with_rewrite(mut self, rewrite: impl FnOnce(&mut Mapping) + 'static) -> Self {
        self.rewrite = Some(Box::new(rewrite));
        self
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("path", &self.path)
            .field("rewrite", &self.rewrite.is_some())
            .finish()
    }
}

/// Output of [`Assembler::build`].
pub struct Built {
    pub kind: String,
    pub version: String,
    pub config: Option<BuiltConfig>,
    pub children: BTreeMap<String, Box<dyn Assembler>>,
}

impl Built {
    pub fn new(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
            config: None,
            children: BTreeMap::new(),
        }
    }

    pub fn with_config<T: Any + Send + Sync>(mut self, config: T) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    pub fn with_child(mut self, id: impl Into<String>, child: impl Assembler + 'static) -> Self {
        self.children.insert(id.into(), Box::new(child));
        self
    }

    pub fn with_boxed_child(mut self, id: impl Into<String>, child: Box<dyn Assembler>) -> Self {
        self.children.insert(id.into(), child);
        self
    }
}

impl fmt::Debug for Built {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Built")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("config", &self.config.is_some())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Typed view of a parent's built configuration.
pub fn downcast_config<T: Any>(parent: Option<&BuiltConfig>) -> Option<&T> {
    parent.and_then(|config| config.downcast_ref::<T>())
}

/// Object-safe face of a serializable state value.
pub trait StateValue: Any + Send + Sync + fmt::Debug {
    fn to_document(&self) -> DocumentResult<Document>;
    fn as_any(&self) -> &dyn Any;
}

impl<T> StateValue for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn to_document(&self) -> DocumentResult<Document> {
        document::to_document(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The state an assembler reports after converging.
///
/// Stays typed while the tree is alive, so parents can read their children's
/// results directly; it is only turned into a generic document on rebuild.
#[derive(Debug)]
pub struct CurrentState(Box<dyn StateValue>);

impl CurrentState {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Any + Send + Sync + fmt::Debug,
    {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    pub fn to_document(&self) -> DocumentResult<Document> {
        (*self.0).to_document()
    }
}

/// A failed Ensure, with whatever state the adapter still knows.
#[derive(Debug)]
pub struct EnsureFailure {
    pub partial: Option<CurrentState>,
    pub source: AdapterError,
}

impl EnsureFailure {
    pub fn new(source: impl Into<AdapterError>) -> Self {
        Self {
            partial: None,
            source: source.into(),
        }
    }

    pub fn with_partial(mut self, state: CurrentState) -> Self {
        self.partial = Some(state);
        self
    }
}

impl<E> From<E> for EnsureFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(source: E) -> Self {
        Self::new(source)
    }
}

#[cfg(test)]
pub(crate) mod testing;
