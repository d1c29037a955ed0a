//! Path navigation through the nested document schema.
//!
//! A resource path is a list of child ids. Each hop descends through the
//! schema section of the document's [`Mode`]: `spec.<id>` in desired
//! documents, `current.state.<id>` in current documents. The empty path is
//! the document itself.

use crate::document::{self, CURRENT, Document, Mapping, SPEC, STATE};
use crate::error::{NavigateError, NavigateResult};

/// Which half of the document schema a path descends through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `spec.<segment>`
    Desired,
    /// `current.state.<segment>`
    Current,
}

impl Mode {
    /// Schema keys traversed before each path segment.
    pub fn hops(self) -> &'static [&'static str] {
        match self {
            Mode::Desired => &[SPEC],
            Mode::Current => &[CURRENT, STATE],
        }
    }
}

/// Render a path for logs and diagnostics.
pub fn format_path<S: AsRef<str>>(path: &[S]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("/")
}

/// Owned copy of a path.
pub fn to_path<S: AsRef<str>>(path: &[S]) -> Vec<String> {
    path.iter().map(|s| s.as_ref().to_owned()).collect()
}

/// Resolve `path` strictly: every hop must exist.
///
/// `null` counts as absent, so an empty section and a missing one fail the
/// same way.
pub fn navigate<'a, S: AsRef<str>>(
    doc: &'a Document,
    path: &[S],
    mode: Mode,
) -> NavigateResult<&'a Document> {
    let mut cursor = doc;
    for (depth, segment) in path.iter().enumerate() {
        for key in keys(mode, segment.as_ref()) {
            cursor = match cursor {
                Document::Object(map) => match map.get(key) {
                    Some(next) if !next.is_null() => next,
                    _ => return Err(not_found(path, depth, key)),
                },
                Document::Null => return Err(not_found(path, depth, key)),
                other => return Err(mismatch(path, depth, key, other)),
            };
        }
    }
    Ok(cursor)
}

/// Resolve `path` strictly, returning a mutable reference.
pub fn navigate_mut<'a, S: AsRef<str>>(
    doc: &'a mut Document,
    path: &[S],
    mode: Mode,
) -> NavigateResult<&'a mut Document> {
    let mut cursor = doc;
    for (depth, segment) in path.iter().enumerate() {
        for key in keys(mode, segment.as_ref()) {
            cursor = match cursor {
                Document::Object(map) => match map.get_mut(key) {
                    Some(next) if !next.is_null() => next,
                    _ => return Err(not_found(path, depth, key)),
                },
                Document::Null => return Err(not_found(path, depth, key)),
                other => return Err(mismatch(path, depth, key, other)),
            };
        }
    }
    Ok(cursor)
}

/// Resolve `path` leniently: a missing hop yields `None`.
///
/// Shape mismatches are still errors, since they mean the document is
/// malformed rather than merely incomplete.
pub fn lookup<'a, S: AsRef<str>>(
    doc: &'a Document,
    path: &[S],
    mode: Mode,
) -> NavigateResult<Option<&'a Document>> {
    match navigate(doc, path, mode) {
        Ok(found) => Ok(Some(found)),
        Err(NavigateError::PathNotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Resolve `path` in write mode, creating every missing hop as an empty
/// mapping, and return the mapping at the location.
///
/// `null` anywhere along the way is replaced by a mapping.
pub fn materialize<'a, S: AsRef<str>>(
    doc: &'a mut Document,
    path: &[S],
    mode: Mode,
) -> NavigateResult<&'a mut Mapping> {
    let mut cursor = doc;
    for (depth, segment) in path.iter().enumerate() {
        for key in keys(mode, segment.as_ref()) {
            let map = as_mapping_mut(cursor, || location(path, depth, key))?;
            cursor = map.entry(key.to_owned()).or_insert(Document::Null);
        }
    }
    as_mapping_mut(cursor, || format_path(path))
}

fn as_mapping_mut(
    doc: &mut Document,
    at: impl FnOnce() -> String,
) -> NavigateResult<&mut Mapping> {
    if doc.is_null() {
        *doc = Document::Object(Mapping::new());
    }
    match doc {
        Document::Object(map) => Ok(map),
        other => Err(NavigateError::ShapeMismatch {
            at: at(),
            found: document::shape_name(other),
        }),
    }
}

fn keys<'k>(mode: Mode, segment: &'k str) -> impl Iterator<Item = &'k str> {
    mode.hops().iter().copied().chain(std::iter::once(segment))
}

fn not_found<S: AsRef<str>>(path: &[S], depth: usize, key: &str) -> NavigateError {
    NavigateError::PathNotFound {
        at: location(path, depth, key),
        key: key.to_owned(),
    }
}

fn mismatch<S: AsRef<str>>(path: &[S], depth: usize, key: &str, found: &Document) -> NavigateError {
    NavigateError::ShapeMismatch {
        at: location(path, depth, key),
        found: document::shape_name(found),
    }
}

fn location<S: AsRef<str>>(path: &[S], depth: usize, key: &str) -> String {
    let prefix = &path[..depth];
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{}/{key}", format_path(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desired() -> Document {
        json!({
            "kind": "Orb",
            "spec": {
                "workers": {
                    "kind": "Pool",
                    "spec": {
                        "replicas": 3,
                        "edge": {"kind": "Agent", "spec": {"port": 80}}
                    }
                },
                "flat": 7
            }
        })
    }

    fn current() -> Document {
        json!({
            "kind": "Orb",
            "current": {
                "state": {
                    "workers": {
                        "kind": "Pool",
                        "current": {"state": {"ready": 3}}
                    }
                }
            }
        })
    }

    #[test]
    fn root_path_returns_document_unchanged() {
        let doc = desired();
        let empty: [&str; 0] = [];
        assert_eq!(navigate(&doc, &empty, Mode::Desired).unwrap(), &doc);
        assert_eq!(navigate(&doc, &empty, Mode::Current).unwrap(), &doc);
    }

    #[test]
    fn desired_mode_descends_through_spec() {
        let doc = desired();
        let edge = navigate(&doc, &["workers", "edge"], Mode::Desired).unwrap();
        assert_eq!(edge["spec"]["port"], json!(80));
    }

    #[test]
    fn current_mode_descends_through_current_state() {
        let doc = current();
        let workers = navigate(&doc, &["workers"], Mode::Current).unwrap();
        assert_eq!(workers["current"]["state"]["ready"], json!(3));
    }

    #[test]
    fn missing_segment_is_path_not_found() {
        let doc = desired();
        let err = navigate(&doc, &["balancers"], Mode::Desired).unwrap_err();
        match err {
            NavigateError::PathNotFound { key, .. } => assert_eq!(key, "balancers"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_schema_hop_is_path_not_found() {
        let doc = current();
        let err = navigate(&doc, &["workers", "edge", "x"], Mode::Current).unwrap_err();
        assert!(matches!(err, NavigateError::PathNotFound { .. }));
    }

    #[test]
    fn scalar_on_the_way_is_shape_mismatch() {
        let doc = desired();
        let err = navigate(&doc, &["flat", "deeper"], Mode::Desired).unwrap_err();
        match err {
            NavigateError::ShapeMismatch { at, found } => {
                assert_eq!(at, "flat/spec");
                assert_eq!(found, "number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lookup_tolerates_absence_but_not_shape_errors() {
        let doc = desired();
        assert!(lookup(&doc, &["nope"], Mode::Desired).unwrap().is_none());
        assert!(lookup(&doc, &["flat", "x"], Mode::Desired).is_err());
        assert!(lookup(&Document::Null, &["x"], Mode::Current).unwrap().is_none());
    }

    #[test]
    fn navigate_mut_allows_in_place_edits() {
        let mut doc = desired();
        let workers = navigate_mut(&mut doc, &["workers"], Mode::Desired).unwrap();
        workers["spec"]["replicas"] = json!(5);
        assert_eq!(doc["spec"]["workers"]["spec"]["replicas"], json!(5));
    }

    #[test]
    fn materialize_creates_intermediate_sections() {
        let mut doc = json!({"kind": "Orb"});
        let agent = materialize(&mut doc, &["workers", "agent-1"], Mode::Current).unwrap();
        agent.insert("spec".into(), json!({"version": "1.2"}));
        assert_eq!(
            doc["current"]["state"]["workers"]["current"]["state"]["agent-1"]["spec"]["version"],
            json!("1.2")
        );
    }

    #[test]
    fn materialize_replaces_null_and_rejects_scalars() {
        let mut doc = Document::Null;
        materialize(&mut doc, &["a"], Mode::Desired).unwrap();
        assert!(doc["spec"]["a"].is_object());

        let mut doc = json!({"spec": {"a": "scalar"}});
        let err = materialize(&mut doc, &["a"], Mode::Desired).unwrap_err();
        assert!(matches!(err, NavigateError::ShapeMismatch { found: "string", .. }));
    }

    #[test]
    fn formats_paths() {
        let empty: [String; 0] = [];
        assert_eq!(format_path(&empty), "<root>");
        assert_eq!(format_path(&["workers", "agent-1"]), "workers/agent-1");
    }
}
