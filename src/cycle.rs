//! One reconciliation pass: Build, Ensure, Rebuild.
//!
//! The reconciler never retries and never persists; scheduling the next
//! cycle and storing the returned document is up to the caller.

use std::path::Path;
use std::time::Instant;

use crate::assembler::{self, Assembler, AssemblerTree, EnsureError, RebuildError, Rebuilt};
use crate::config::ReconcileConfig;
use crate::context::Context;
use crate::document::Document;
use crate::error::{ConfigResult, OrbiterError, OrbiterResult};
use crate::secrets::Secrets;

/// Runs reconciliation cycles with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Reconciler configured from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        Ok(Self {
            config: ReconcileConfig::load(path)?,
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Run one cycle of `root` against the given documents.
    ///
    /// A build failure aborts the cycle before anything converged. Otherwise
    /// the rebuild always runs, so partial progress of a failed or cancelled
    /// Ensure still reaches the returned document.
    pub fn run(
        &self,
        ctx: &Context,
        root: Box<dyn Assembler>,
        desired: &Document,
        current: &Document,
        secrets: &dyn Secrets,
    ) -> OrbiterResult<Cycle> {
        let started = Instant::now();

        let mut tree = assembler::build(root, desired, current, secrets, &self.config)
            .inspect_err(|e| tracing::warn!(error = %e, "build failed, cycle aborted"))?;

        let ensure_error = assembler::ensure(ctx, &mut tree, secrets, &self.config).err();
        if let Some(e) = &ensure_error {
            tracing::warn!(error = %e, "ensure failed, writing partial progress");
        }

        let Rebuilt { document, failures } = assembler::rebuild(current, &mut tree, &self.config);

        tracing::info!(
            assembler = %tree.identity(),
            nodes = tree.node_count(),
            converged = tree.converged(),
            rebuild_failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation cycle finished"
        );

        Ok(Cycle {
            document,
            ensure_error,
            rebuild_failures: failures,
            tree,
        })
    }
}

/// Outcome of one cycle that got past Build.
#[derive(Debug)]
pub struct Cycle {
    /// The next current document. Persist it even when the cycle failed.
    pub document: Document,
    pub ensure_error: Option<EnsureError>,
    pub rebuild_failures: Vec<RebuildError>,
    /// The tree as it ended the cycle, with every node's state.
    pub tree: AssemblerTree,
}

impl Cycle {
    /// Every node converged and was written.
    pub fn is_converged(&self) -> bool {
        self.ensure_error.is_none() && self.rebuild_failures.is_empty()
    }

    /// The new document, or the cycle's first error.
    pub fn into_result(self) -> OrbiterResult<Document> {
        if let Some(e) = self.ensure_error {
            return Err(OrbiterError::Ensure(e));
        }
        match self.rebuild_failures.into_iter().next() {
            Some(e) => Err(OrbiterError::Rebuild(e)),
            None => Ok(self.document),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::testing::{Journal, Scripted};
    use crate::error::ConfigError;
    use crate::secrets::MemorySecrets;
    use serde_json::json;

    fn desired() -> Document {
        json!({"spec": {"a": {"spec": {}}, "b": {"spec": {}}}})
    }

    #[test]
    fn converged_cycle_returns_the_document() {
        let journal = Journal::default();
        let root = Scripted::new("root", &[], &journal)
            .child(Scripted::new("a", &["a"], &journal))
            .child(Scripted::new("b", &["b"], &journal));

        let cycle = Reconciler::default()
            .run(
                &Context::new(),
                Box::new(root),
                &desired(),
                &Document::Null,
                &MemorySecrets::new(),
            )
            .unwrap();

        assert!(cycle.is_converged());
        assert_eq!(cycle.tree.converged(), 3);
        let doc = cycle.into_result().unwrap();
        assert_eq!(doc["current"]["state"]["b"]["current"]["state"]["name"], json!("b"));
    }

    #[test]
    fn failed_ensure_still_rebuilds() {
        let journal = Journal::default();
        let root = Scripted::new("root", &[], &journal)
            .child(Scripted::new("a", &["a"], &journal).failing(None))
            .child(Scripted::new("b", &["b"], &journal));

        let cycle = Reconciler::default()
            .run(
                &Context::new(),
                Box::new(root),
                &desired(),
                &Document::Null,
                &MemorySecrets::new(),
            )
            .unwrap();

        assert!(!cycle.is_converged());
        assert_eq!(cycle.document["current"]["state"]["b"]["kind"], json!("test/b"));
        assert!(matches!(cycle.into_result(), Err(OrbiterError::Ensure(_))));
    }

    #[test]
    fn build_failure_aborts() {
        let journal = Journal::default();
        let root = Scripted::new("root", &[], &journal)
            .child(Scripted::new("a", &["a"], &journal).failing_build());

        let err = Reconciler::default()
            .run(
                &Context::new(),
                Box::new(root),
                &desired(),
                &Document::Null,
                &MemorySecrets::new(),
            )
            .unwrap_err();
        assert!(matches!(err, OrbiterError::Build(_)));
        assert!(journal.entries().iter().all(|e| !e.starts_with("ensure:")));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ReconcileConfig {
            agent_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(Reconciler::new(config), Err(ConfigError::Invalid { .. })));
    }
}
