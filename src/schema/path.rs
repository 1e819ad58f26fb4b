//! Paths into stored entry documents.
//!
//! A path is a sequence of object keys and "every element" markers, written
//! as `items.$[].label`. Paths that contain an element marker cross an
//! array boundary and can't be expressed as a single JSON path.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Each,
}

/// A location inside an entry document. The empty path is the entry root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Self { segments }
    }

    pub fn each(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Each);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn crosses_array(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Each))
    }

    /// SQLite JSON path (`$."a"."b"`), or `None` if the path crosses an array.
    pub fn to_json_path(&self) -> Option<String> {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => {
                    out.push_str(".\"");
                    out.push_str(key);
                    out.push('"');
                }
                Segment::Each => return None,
            }
        }
        Some(out)
    }

    /// Applies `f` to every object this path resolves to inside `doc`.
    ///
    /// Missing keys and type mismatches are skipped. Returns whether any
    /// invocation of `f` reported a change.
    pub fn visit_objects<F>(&self, doc: &mut Value, f: &mut F) -> bool
    where
        F: FnMut(&mut Map<String, Value>) -> bool,
    {
        visit(doc, &self.segments, f)
    }

    /// Removes `key` from every object at this path.
    pub fn unset_in(&self, doc: &mut Value, key: &str) -> bool {
        self.visit_objects(doc, &mut |object: &mut Map<String, Value>| {
            object.remove(key).is_some()
        })
    }

    /// Moves the value under `from` to `to` in every object at this path.
    ///
    /// All sibling keys are left untouched. An existing `to` is overwritten.
    pub fn rename_in(&self, doc: &mut Value, from: &str, to: &str) -> bool {
        self.visit_objects(doc, &mut |object: &mut Map<String, Value>| match object.remove(from) {
            Some(value) => {
                object.insert(to.to_string(), value);
                true
            }
            None => false,
        })
    }
}

fn visit<F>(value: &mut Value, segments: &[Segment], f: &mut F) -> bool
where
    F: FnMut(&mut Map<String, Value>) -> bool,
{
    match segments.split_first() {
        None => match value {
            Value::Object(object) => f(object),
            _ => false,
        },
        Some((Segment::Key(key), rest)) => match value.get_mut(key.as_str()) {
            Some(child) => visit(child, rest, f),
            None => false,
        },
        Some((Segment::Each, rest)) => match value {
            Value::Array(items) => {
                let mut changed = false;
                for item in items.iter_mut() {
                    changed |= visit(item, rest, f);
                }
                changed
            }
            _ => false,
        },
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Key(key) => f.write_str(key)?,
                Segment::Each => f.write_str("$[]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(FieldPath::root().to_string(), "");
        assert_eq!(FieldPath::root().child("meta").to_string(), "meta");
        assert_eq!(
            FieldPath::root().child("items").each().child("label").to_string(),
            "items.$[].label"
        );
    }

    #[test]
    fn test_json_path() {
        assert_eq!(FieldPath::root().to_json_path().as_deref(), Some("$"));
        assert_eq!(
            FieldPath::root().child("meta").child("author").to_json_path(),
            Some("$.\"meta\".\"author\"".to_string())
        );
        assert!(FieldPath::root().child("items").each().to_json_path().is_none());
    }

    #[test]
    fn test_crosses_array() {
        assert!(!FieldPath::root().child("a").crosses_array());
        assert!(FieldPath::root().child("a").each().crosses_array());
    }

    #[test]
    fn test_unset_nested() {
        let mut doc = json!({ "meta": { "author": "ann", "year": 2020 }, "title": "x" });
        let changed = FieldPath::root().child("meta").unset_in(&mut doc, "author");
        assert!(changed);
        assert_eq!(doc, json!({ "meta": { "year": 2020 }, "title": "x" }));
    }

    #[test]
    fn test_unset_missing_is_noop() {
        let mut doc = json!({ "title": "x" });
        assert!(!FieldPath::root().child("meta").unset_in(&mut doc, "author"));
        assert_eq!(doc, json!({ "title": "x" }));
    }

    #[test]
    fn test_rename_in_every_array_element() {
        let mut doc = json!({
            "tags": [
                { "label": "x", "color": "red" },
                { "label": "y", "color": "blue" },
                { "color": "green" }
            ]
        });

        let changed = FieldPath::root()
            .child("tags")
            .each()
            .rename_in(&mut doc, "label", "name");

        assert!(changed);
        assert_eq!(
            doc,
            json!({
                "tags": [
                    { "name": "x", "color": "red" },
                    { "name": "y", "color": "blue" },
                    { "color": "green" }
                ]
            })
        );
    }

    #[test]
    fn test_rename_skips_non_array_values() {
        let mut doc = json!({ "tags": "not an array" });
        let changed = FieldPath::root()
            .child("tags")
            .each()
            .rename_in(&mut doc, "label", "name");
        assert!(!changed);
        assert_eq!(doc, json!({ "tags": "not an array" }));
    }
}
