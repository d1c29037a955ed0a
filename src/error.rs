//! Rich diagnostic error types for the orbiter reconciliation engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators can tell
//! a malformed document from a failing adapter from an engine bug.

use miette::Diagnostic;
use thiserror::Error;

use crate::agent::AgentError;
use crate::assembler::error::{BuildError, EnsureError, RebuildError};
use crate::secrets::SecretsError;

/// Top-level error type for the orbiter engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, node path and assembler identity) through to
/// the caller that decides whether to retry the cycle.
#[derive(Debug, Error, Diagnostic)]
pub enum OrbiterError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Navigate(#[from] NavigateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Secrets(#[from] SecretsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ensure(#[from] EnsureError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rebuild(#[from] RebuildError),
}

// ---------------------------------------------------------------------------
// Navigation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NavigateError {
    #[error("path not found: no \"{key}\" at {at}")]
    #[diagnostic(
        code(orbiter::navigate::path_not_found),
        help(
            "The document does not contain the nested section an assembler asked for. \
             Desired documents nest children under `spec.<id>`, current documents under \
             `current.state.<id>`. Check the assembler's path against the document."
        )
    )]
    PathNotFound { at: String, key: String },

    #[error("shape mismatch at {at}: expected a mapping, found {found}")]
    #[diagnostic(
        code(orbiter::navigate::shape_mismatch),
        help(
            "Every hop of a resource path must be a string-keyed mapping. \
             A scalar or sequence sits where a nested resource document was expected."
        )
    )]
    ShapeMismatch { at: String, found: &'static str },
}

/// Result type for navigation.
pub type NavigateResult<T> = std::result::Result<T, NavigateError>;

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("failed to convert value to a document: {source}")]
    #[diagnostic(
        code(orbiter::document::encode),
        help(
            "The value could not be represented as a generic document. \
             Maps must have string keys and floats must be finite."
        )
    )]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode document into {target}: {source}")]
    #[diagnostic(
        code(orbiter::document::decode),
        help(
            "The document does not match the shape of the requested type. \
             Compare the desired spec with the adapter's configuration struct."
        )
    )]
    Decode {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("YAML error: {source}")]
    #[diagnostic(
        code(orbiter::document::yaml),
        help("The YAML text is malformed or uses non-string mapping keys.")
    )]
    Yaml {
        #[source]
        source: serde_yaml::Error,
    },
}

/// Result type for document conversions.
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read reconcile config: {path}")]
    #[diagnostic(
        code(orbiter::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse reconcile config: {message}")]
    #[diagnostic(
        code(orbiter::config::parse),
        help("Check the TOML syntax and the key names of the reconcile config.")
    )]
    Parse { message: String },

    #[error("failed to write reconcile config: {path}")]
    #[diagnostic(
        code(orbiter::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize reconcile config: {message}")]
    #[diagnostic(code(orbiter::config::serialize))]
    Serialize { message: String },

    #[error("invalid reconcile config: {message}")]
    #[diagnostic(
        code(orbiter::config::invalid),
        help(
            "`agent_queue_capacity` must be greater than zero and the agent record \
             `kind` and `version` must not be empty."
        )
    )]
    Invalid { message: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience result type using [`OrbiterError`].
pub type OrbiterResult<T> = std::result::Result<T, OrbiterError>;
