// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # orbiter
//!
//! A declarative reconciliation engine. A tree of pluggable assemblers turns
//! a generic desired-state document into real resources and records what it
//! observed in a generic current-state document.
//!
//! ## Architecture
//!
//! - **Documents** (`document`): self-similar `kind`/`version`/`spec` trees, YAML codec
//! - **Navigation** (`navigate`): resource paths through `spec.<id>` and `current.state.<id>`
//! - **Assemblers** (`assembler`): the adapter contract and the three phases
//!   (Build top-down, Ensure bottom-up, Rebuild)
//! - **Agent channel** (`agent`): desired state for per-machine agents, queued during Build
//! - **Cycle** (`cycle`): one Build → Ensure → Rebuild pass
//!
//! ## Library usage
//!
//! ```no_run
//! use orbiter::agent::AgentAccessor;
//! use orbiter::assembler::{
//!     AdapterError, Assembler, BuildContext, Built, BuiltConfig, CurrentState, EnsureFailure,
//!     EnsuredChildren,
//! };
//! use orbiter::context::Context;
//! use orbiter::cycle::Reconciler;
//! use orbiter::document::{self, Document, DocumentHeader};
//! use orbiter::secrets::{MemorySecrets, Secrets};
//!
//! struct Service;
//!
//! impl Assembler for Service {
//!     fn build_context(&self) -> BuildContext {
//!         BuildContext::root()
//!     }
//!
//!     fn build(
//!         &mut self,
//!         desired: &Document,
//!         _agents: &AgentAccessor<'_>,
//!         _secrets: &dyn Secrets,
//!         _parent: Option<&BuiltConfig>,
//!     ) -> Result<Built, AdapterError> {
//!         let header = DocumentHeader::of(desired);
//!         Ok(Built::new(header.kind, header.version))
//!     }
//!
//!     fn ensure(
//!         &mut self,
//!         _ctx: &Context,
//!         _secrets: &dyn Secrets,
//!         _children: &EnsuredChildren<'_>,
//!     ) -> Result<CurrentState, EnsureFailure> {
//!         Ok(CurrentState::new(serde_json::json!({"ready": true})))
//!     }
//! }
//!
//! let desired = document::from_yaml_str("kind: example/Service\nversion: v1\nspec: {}\n").unwrap();
//! let cycle = Reconciler::default()
//!     .run(&Context::new(), Box::new(Service), &desired, &Document::Null, &MemorySecrets::new())
//!     .unwrap();
//! let next = cycle.into_result().unwrap();
//! println!("{}", document::to_yaml_string(&next).unwrap());
//! ```

pub mod agent;
pub mod assembler;
pub mod config;
pub mod context;
pub mod cycle;
pub mod document;
pub mod error;
pub mod navigate;
pub mod secrets;

pub use assembler::{Assembler, AssemblerTree, Built, BuildContext, CurrentState, EnsureFailure};
pub use config::ReconcileConfig;
pub use context::Context;
pub use cycle::{Cycle, Reconciler};
pub use document::{Document, Mapping};
pub use error::{OrbiterError, OrbiterResult};
