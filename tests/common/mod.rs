//! Shared assembler doubles for the end-to-end tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use orbiter::agent::AgentAccessor;
use orbiter::assembler::{
    AdapterError, Assembler, BuildContext, Built, BuiltConfig, CurrentState, EnsureFailure,
    EnsuredChildren,
};
use orbiter::context::Context;
use orbiter::document::{Document, Mapping};
use orbiter::secrets::Secrets;

/// Install a test-writer subscriber once. `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Logical clock shared by every node of a tree.
#[derive(Debug, Clone, Default)]
pub struct Clock(Arc<AtomicU64>);

impl Clock {
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// State every [`Node`] reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub tick: u64,
    /// Highest tick among the children this node saw converged.
    pub latest_child: Option<u64>,
}

#[derive(Debug)]
enum Outcome {
    Converge,
    Fail(Option<Document>),
    Cancel(Context),
}

/// Generic assembler: converges to a [`NodeState`] stamped with the clock.
#[derive(Debug)]
pub struct Node {
    name: String,
    path: Vec<String>,
    clock: Clock,
    children: Vec<Node>,
    outcome: Outcome,
    agents: Vec<(Vec<String>, Document)>,
    ignore_agent_errors: bool,
}

impl Node {
    pub fn new(name: &str, path: &[&str], clock: &Clock) -> Self {
        Self {
            name: name.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            clock: clock.clone(),
            children: Vec::new(),
            outcome: Outcome::Converge,
            agents: Vec::new(),
            ignore_agent_errors: false,
        }
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn fail(mut self) -> Self {
        self.outcome = Outcome::Fail(None);
        self
    }

    pub fn fail_with_partial(mut self, partial: Document) -> Self {
        self.outcome = Outcome::Fail(Some(partial));
        self
    }

    /// Converge, then cancel `ctx` for everyone after.
    pub fn cancel(mut self, ctx: &Context) -> Self {
        self.outcome = Outcome::Cancel(ctx.clone());
        self
    }

    pub fn agent(mut self, path: &[&str], spec: Document) -> Self {
        self.agents
            .push((path.iter().map(|s| s.to_string()).collect(), spec));
        self
    }

    /// Declare agents and discard the results.
    pub fn ignore_agent_errors(mut self) -> Self {
        self.ignore_agent_errors = true;
        self
    }
}

impl Assembler for Node {
    fn identity(&self) -> String {
        self.name.clone()
    }

    fn build_context(&self) -> BuildContext {
        BuildContext::at(&self.path)
    }

    fn build(
        &mut self,
        _desired: &Document,
        agents: &AgentAccessor<'_>,
        _secrets: &dyn Secrets,
        _parent: Option<&BuiltConfig>,
    ) -> Result<Built, AdapterError> {
        for (path, spec) in &self.agents {
            if self.ignore_agent_errors {
                let _ = agents.agent(path).and_then(|handle| handle.declare(spec));
            } else {
                agents.agent(path)?.declare(spec)?;
            }
        }
        let mut built = Built::new("test.orbiter/Node", "v0");
        for child in std::mem::take(&mut self.children) {
            let id = child.name.clone();
            built = built.with_child(id, child);
        }
        Ok(built)
    }

    fn ensure(
        &mut self,
        _ctx: &Context,
        _secrets: &dyn Secrets,
        children: &EnsuredChildren<'_>,
    ) -> Result<CurrentState, EnsureFailure> {
        let latest_child = children
            .values()
            .filter_map(|state| state.downcast_ref::<NodeState>())
            .map(|state| state.tick)
            .max();
        let state = NodeState {
            name: self.name.clone(),
            tick: self.clock.tick(),
            latest_child,
        };
        match &self.outcome {
            Outcome::Converge => Ok(CurrentState::new(state)),
            Outcome::Cancel(ctx) => {
                ctx.cancel();
                Ok(CurrentState::new(state))
            }
            Outcome::Fail(partial) => {
                let failure = EnsureFailure::new(format!("{} is unreachable", self.name));
                Err(match partial {
                    Some(partial) => failure.with_partial(CurrentState::new(partial.clone())),
                    None => failure,
                })
            }
        }
    }
}

/// Desired document with one empty child node per id.
pub fn flat_desired(ids: &[&str]) -> Document {
    let spec: Mapping = ids
        .iter()
        .map(|id| (id.to_string(), json!({"kind": "test.orbiter/Node", "spec": {}})))
        .collect();
    json!({"kind": "test.orbiter/Node", "version": "v0", "spec": spec})
}

/// A random tree of [`Node`]s and the desired document that matches it.
///
/// Every node is addressed by a single-segment path equal to its id.
pub fn random_tree(rng: &mut StdRng, clock: &Clock, max_depth: u32) -> (Node, Document) {
    random_node(rng, clock, "root", &[], max_depth)
}

fn random_node(
    rng: &mut StdRng,
    clock: &Clock,
    name: &str,
    path: &[&str],
    depth: u32,
) -> (Node, Document) {
    let mut node = Node::new(name, path, clock);
    let mut spec = Mapping::new();
    let fanout = if depth == 0 { 0 } else { rng.gen_range(0..=3) };
    for i in 0..fanout {
        let id = format!("{name}.{i}");
        let (child, doc) = random_node(rng, clock, &id, &[id.as_str()], depth - 1);
        node = node.child(child);
        spec.insert(id, doc);
    }
    (node, json!({"kind": "test.orbiter/Node", "spec": spec}))
}
