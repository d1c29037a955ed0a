//! Convergence Driver: run Ensure bottom-up over a built tree.
//!
//! Children converge before their parent, and a parent receives its
//! children's states. A failing child stops its ancestors but never its
//! siblings, so unrelated subtrees still record progress for the rebuild.

use rayon::prelude::*;

use super::build::AssemblerTree;
use super::error::EnsureError;
use super::{EnsureFailure, EnsuredChildren};
use crate::config::ReconcileConfig;
use crate::context::Context;
use crate::navigate::format_path;
use crate::secrets::Secrets;

/// Result type for the Ensure phase.
pub type EnsureResult<T> = std::result::Result<T, EnsureError>;

/// Converge every node of `tree`, leaves first.
///
/// On success every node holds a current state. On failure the first error
/// in id order is returned; failed nodes hold their partial state, if the
/// adapter reported one, and their ancestors hold none.
pub fn ensure(
    ctx: &Context,
    tree: &mut AssemblerTree,
    secrets: &dyn Secrets,
    config: &ReconcileConfig,
) -> EnsureResult<()> {
    let result = converge(ctx, tree, secrets, config.parallel_siblings);
    match &result {
        Ok(()) => tracing::debug!(
            assembler = %tree.identity,
            nodes = tree.node_count(),
            "tree converged"
        ),
        Err(e) => tracing::debug!(
            assembler = %tree.identity,
            converged = tree.converged(),
            nodes = tree.node_count(),
            error = %e,
            "tree did not converge"
        ),
    }
    result
}

fn converge(
    ctx: &Context,
    node: &mut AssemblerTree,
    secrets: &dyn Secrets,
    parallel: bool,
) -> EnsureResult<()> {
    node.current_state = None;

    let failures: Vec<EnsureError> = if parallel && node.children.len() > 1 {
        node.children
            .par_iter_mut()
            .filter_map(|(_, child)| converge(ctx, child, secrets, parallel).err())
            .collect()
    } else {
        node.children
            .values_mut()
            .filter_map(|child| converge(ctx, child, secrets, parallel).err())
            .collect()
    };

    let mut failures = failures.into_iter();
    if let Some(first) = failures.next() {
        for other in failures {
            tracing::warn!(
                assembler = %node.identity,
                path = %format_path(&node.path),
                error = %other,
                "sibling subtree failed to converge"
            );
        }
        return Err(first);
    }

    if ctx.is_cancelled() {
        return Err(EnsureError::Cancelled {
            assembler: node.identity.clone(),
            path: format_path(&node.path),
        });
    }

    let outcome = {
        let children: EnsuredChildren<'_> = node
            .children
            .iter()
            .filter_map(|(id, child)| child.current_state.as_ref().map(|state| (id.clone(), state)))
            .collect();
        node.node.ensure(ctx, secrets, &children)
    };

    match outcome {
        Ok(state) => {
            tracing::debug!(
                assembler = %node.identity,
                path = %format_path(&node.path),
                "assembler converged"
            );
            node.current_state = Some(state);
            Ok(())
        }
        Err(EnsureFailure { partial, source }) => {
            tracing::debug!(
                assembler = %node.identity,
                path = %format_path(&node.path),
                partial = partial.is_some(),
                error = %source,
                "assembler failed to converge"
            );
            node.current_state = partial;
            Err(EnsureError::Adapter {
                assembler: node.identity.clone(),
                path: format_path(&node.path),
                source,
            })
        }
    }
}
