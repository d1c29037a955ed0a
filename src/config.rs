//! Reconciliation settings, persisted as TOML.
//!
//! ```toml
//! parallel_siblings = true
//! agent_queue_capacity = 1000
//!
//! [agent_record]
//! kind = "nodeagent.caos.ch/NodeAgent"
//! version = "v0"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRecordTags;
use crate::error::{ConfigError, ConfigResult};

/// Engine settings for one reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Converge sibling subtrees concurrently on the rayon pool.
    #[serde(default)]
    pub parallel_siblings: bool,
    /// Maximum agent changes one assembler may declare per build.
    #[serde(default = "default_agent_queue_capacity")]
    pub agent_queue_capacity: usize,
    /// Tags written on agent records.
    #[serde(default)]
    pub agent_record: AgentRecordTags,
}

fn default_agent_queue_capacity() -> usize {
    1000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            parallel_siblings: false,
            agent_queue_capacity: default_agent_queue_capacity(),
            agent_record: AgentRecordTags::default(),
        }
    }
}

impl ReconcileConfig {
    /// Parse and validate a TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.agent_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "agent_queue_capacity must be greater than zero".into(),
            });
        }
        if self.agent_record.kind.trim().is_empty() || self.agent_record.version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "agent record kind and version must not be empty".into(),
            });
        }
        Ok(())
    }
}
