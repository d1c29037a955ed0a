//! Scripted assembler double for the phase tests.

use std::sync::{Arc, Mutex};

use serde_json::json;

use super::{
    AdapterError, Assembler, BuildContext, Built, BuiltConfig, CurrentState, EnsureFailure,
    EnsuredChildren, downcast_config,
};
use crate::agent::AgentAccessor;
use crate::context::Context;
use crate::document::{Document, Mapping};
use crate::secrets::Secrets;

/// Shared, ordered record of what the doubles were asked to do.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

pub(crate) struct Scripted {
    name: String,
    path: Vec<String>,
    journal: Journal,
    children: Vec<Scripted>,
    state: Option<Document>,
    partial: Option<Document>,
    fail_build: bool,
    agents: Vec<(Vec<String>, Document)>,
    ignore_agent_errors: bool,
    rewrite: Option<fn(&mut Mapping)>,
    hand_down: Option<u32>,
    cancel: Option<Context>,
}

impl Scripted {
    /// Converges to `{"name": <name>}` unless told otherwise.
    pub(crate) fn new(name: &str, path: &[&str], journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            journal: journal.clone(),
            children: Vec::new(),
            state: Some(json!({ "name": name })),
            partial: None,
            fail_build: false,
            agents: Vec::new(),
            ignore_agent_errors: false,
            rewrite: None,
            hand_down: None,
            cancel: None,
        }
    }

    pub(crate) fn child(mut self, child: Scripted) -> Self {
        self.children.push(child);
        self
    }

    pub(crate) fn state(mut self, state: Document) -> Self {
        self.state = Some(state);
        self
    }

    /// Ensure fails, optionally leaving a partial state behind.
    pub(crate) fn failing(mut self, partial: Option<Document>) -> Self {
        self.state = None;
        self.partial = partial;
        self
    }

    pub(crate) fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    pub(crate) fn agent(mut self, path: &[&str], spec: Document) -> Self {
        self.agents
            .push((path.iter().map(|s| s.to_string()).collect(), spec));
        self
    }

    /// Declare agents without looking at the outcome.
    pub(crate) fn ignoring_agent_errors(mut self) -> Self {
        self.ignore_agent_errors = true;
        self
    }

    pub(crate) fn rewrite(mut self, rewrite: fn(&mut Mapping)) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    pub(crate) fn hand_down(mut self, value: u32) -> Self {
        self.hand_down = Some(value);
        self
    }

    /// Cancel `ctx` while converging, after reporting state.
    pub(crate) fn cancels(mut self, ctx: &Context) -> Self {
        self.cancel = Some(ctx.clone());
        self
    }
}

impl Assembler for Scripted {
    fn identity(&self) -> String {
        self.name.clone()
    }

    fn build_context(&self) -> BuildContext {
        let context = BuildContext::at(&self.path);
        match self.rewrite {
            Some(rewrite) => context.with_rewrite(rewrite),
            None => context,
        }
    }

    fn build(
        &mut self,
        desired: &Document,
        agents: &AgentAccessor<'_>,
        _secrets: &dyn Secrets,
        parent: Option<&BuiltConfig>,
    ) -> Result<Built, AdapterError> {
        self.journal.push(format!("build:{}", self.name));
        self.journal
            .push(format!("desired:{}:{}", self.name, desired["spec"]));
        if let Some(value) = downcast_config::<u32>(parent) {
            self.journal.push(format!("config:{}:{value}", self.name));
        }
        if self.fail_build {
            return Err(format!("{} refused to build", self.name).into());
        }
        for (path, spec) in &self.agents {
            if self.ignore_agent_errors {
                let _ = agents.agent(path).and_then(|handle| handle.declare(spec));
            } else {
                agents.agent(path)?.declare(spec)?;
            }
        }

        let mut built = Built::new(format!("test/{}", self.name), "v1");
        if let Some(value) = self.hand_down {
            built = built.with_config(value);
        }
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
        let seen: Vec<&str> = children.keys().map(String::as_str).collect();
        self.journal
            .push(format!("ensure:{}:[{}]", self.name, seen.join(",")));
        if let Some(ctx) = &self.cancel {
            ctx.cancel();
        }
        match (&self.state, &self.partial) {
            (Some(state), _) => Ok(CurrentState::new(state.clone())),
            (None, Some(partial)) => Err(EnsureFailure::new(format!("{} failed", self.name))
                .with_partial(CurrentState::new(partial.clone()))),
            (None, None) => Err(EnsureFailure::new(format!("{} failed", self.name))),
        }
    }
}
