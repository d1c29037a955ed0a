//! Secret accessor shared by every assembler of a cycle.
//!
//! The engine only threads the accessor through Build and Ensure; it never
//! reads secret contents itself. Implementations are shared across sibling
//! subtrees that may converge in parallel, so they must be `Send + Sync`.

use dashmap::DashMap;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by a secret store.
#[derive(Debug, Error, Diagnostic)]
pub enum SecretsError {
    #[error("secret not found: {name}")]
    #[diagnostic(
        code(orbiter::secrets::not_found),
        help("Write the secret before an assembler that needs it converges.")
    )]
    NotFound { name: String },

    #[error("secret store failed for {name}: {message}")]
    #[diagnostic(
        code(orbiter::secrets::backend),
        help("The backing store rejected the operation. Check its availability and permissions.")
    )]
    Backend { name: String, message: String },
}

/// Result type for secret operations.
pub type SecretsResult<T> = std::result::Result<T, SecretsError>;

/// Read/write/delete access to named secrets.
pub trait Secrets: Send + Sync {
    fn read(&self, name: &str) -> SecretsResult<Vec<u8>>;
    fn write(&self, name: &str, value: &[u8]) -> SecretsResult<()>;
    fn delete(&self, name: &str) -> SecretsResult<()>;
}

/// Concurrent in-memory secret store. All data is lost on drop.
#[derive(Debug, Default)]
pub struct MemorySecrets {
    data: DashMap<String, Vec<u8>>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from a decrypted snapshot.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Secrets for MemorySecrets {
    fn read(&self, name: &str) -> SecretsResult<Vec<u8>> {
        self.data
            .get(name)
            .map(|v| v.value().clone())
            .ok_or_else(|| SecretsError::NotFound { name: name.into() })
    }

    fn write(&self, name: &str, value: &[u8]) -> SecretsResult<()> {
        self.data.insert(name.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> SecretsResult<()> {
        self.data
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SecretsError::NotFound { name: name.into() })
    }
}
