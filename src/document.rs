//! Generic, self-similar state documents.
//!
//! Desired and current documents share one recursive schema:
//!
//! ```yaml
//! kind: orbiter.caos.ch/Orb        # desired node
//! version: v0
//! spec:
//!   workers:                       # child resource, same shape again
//!     kind: ...
//!     spec: { replicas: 3 }
//! ```
//!
//! ```yaml
//! kind: orbiter.caos.ch/Orb        # current node
//! version: v0
//! current:
//!   kind: orbiter.caos.ch/Orb
//!   version: v0
//!   state:
//!     workers: { kind: ..., current: { ... } }
//! ```
//!
//! The engine never knows the concrete shape of any resource. Adapters decode
//! their own typed configuration through [`from_document`] and hand typed
//! state back through [`to_document`], which is the only place values cross
//! between the static and the generic representation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, DocumentResult};

/// A generic document node: mapping, sequence or scalar.
pub type Document = serde_json::Value;

/// A string-keyed document mapping. Keys are kept sorted.
pub type Mapping = serde_json::Map<String, Document>;

/// Key of a node's kind tag.
pub const KIND: &str = "kind";
/// Key of a node's version tag.
pub const VERSION: &str = "version";
/// Key of a desired node's configuration, which also nests its children.
pub const SPEC: &str = "spec";
/// Key of a current node's observed section.
pub const CURRENT: &str = "current";
/// Key of the state map inside a current section.
pub const STATE: &str = "state";

/// The `{kind, version}` header shared by every node document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHeader {
    #[serde(default)]
    pub kind: String,
    #[serde(default, alias = "apiVersion")]
    pub version: String,
}

impl DocumentHeader {
    pub fn new(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
        }
    }

    /// Read the header of a node document, ignoring every other key.
    ///
    /// A non-mapping document yields an empty header.
    pub fn of(doc: &Document) -> Self {
        let field = |key: &str| {
            doc.get(key)
                .and_then(Document::as_str)
                .map(str::to_owned)
                .unwrap_or_default()
        };
        let version = doc
            .get(VERSION)
            .or_else(|| doc.get("apiVersion"))
            .and_then(Document::as_str)
            .map(str::to_owned)
            .unwrap_or_default();
        Self {
            kind: field(KIND),
            version,
        }
    }
}

/// Convert a typed value into the generic document representation.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> DocumentResult<Document> {
    serde_json::to_value(value).map_err(|source| DocumentError::Encode { source })
}

/// Decode a generic document into a typed value.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> DocumentResult<T> {
    T::deserialize(doc).map_err(|source| DocumentError::Decode {
        target: std::any::type_name::<T>(),
        source,
    })
}

/// Parse a YAML text into a document. Empty input yields `null`.
pub fn from_yaml_str(text: &str) -> DocumentResult<Document> {
    if text.trim().is_empty() {
        return Ok(Document::Null);
    }
    serde_yaml::from_str(text).map_err(|source| DocumentError::Yaml { source })
}

/// Render a document as YAML.
pub fn to_yaml_string(doc: &Document) -> DocumentResult<String> {
    serde_yaml::to_string(doc).map_err(|source| DocumentError::Yaml { source })
}

/// The `spec` mapping of a desired node document, if it has one.
pub fn spec_of(doc: &Document) -> Option<&Mapping> {
    doc.get(SPEC).and_then(Document::as_object)
}

/// Short name of a document's variant, for diagnostics.
pub fn shape_name(doc: &Document) -> &'static str {
    match doc {
        Document::Null => "null",
        Document::Bool(_) => "boolean",
        Document::Number(_) => "number",
        Document::String(_) => "string",
        Document::Array(_) => "sequence",
        Document::Object(_) => "mapping",
    }
}
