//! Collection schemas: the field tree, its structural diff, and document paths.

mod diff;
mod field;
mod path;

pub use diff::{plan_migration, DiffError, MigrationPlan, MigrationStep};
pub use field::{
    walk_fields, DataTableSettings, Field, FieldClass, FieldKind, FieldSettings, UploadSettings,
};
pub use path::{FieldPath, Segment};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CmsError, CmsResult};

/// Shortest and longest allowed collection name.
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;

/// Collection-level table settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDataTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries_per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_table: Option<SchemaDataTable>,
}

/// A collection's schema document, stored verbatim as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SchemaSettings>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, title: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: None,
            creator: None,
            settings: None,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Structural checks the boundary performs before a schema reaches the
    /// registry: a usable name, a title, and well-formed field names that
    /// are unique among their siblings.
    pub fn validate(&self) -> CmsResult<()> {
        normalize_name(&self.name)?;

        if self.title.trim().is_empty() {
            return Err(CmsError::bad_request("title", "Title is required."));
        }

        check_siblings(&self.fields, "fields")?;

        let mut failure = None;
        walk_fields(&self.fields, &mut |ancestors, field| {
            if failure.is_some() {
                return;
            }
            let path = ancestors
                .iter()
                .map(|f| f.name.as_str())
                .chain(std::iter::once(field.name.as_str()))
                .collect::<Vec<_>>()
                .join(".");
            if let Err(e) = check_field_name(&field.name, &path) {
                failure = Some(e);
                return;
            }
            if let Some(children) = field.composite_fields() {
                if let Err(e) = check_siblings(children, &path) {
                    failure = Some(e);
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn check_siblings(fields: &[Field], path: &str) -> CmsResult<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(CmsError::bad_request(
                path,
                format!("Field name '{}' is used more than once.", field.name),
            ));
        }
    }
    Ok(())
}

fn check_field_name(name: &str, path: &str) -> CmsResult<()> {
    if name.trim().is_empty() {
        return Err(CmsError::bad_request(path, "Field name is required."));
    }
    if name.contains('.') || name.contains('"') || name.starts_with('$') || name == "_id" {
        return Err(CmsError::bad_request(
            path,
            format!("Field name '{}' is not allowed.", name),
        ));
    }
    Ok(())
}

/// Normalizes a collection name (trimmed, lowercase) and checks that it can
/// name an entry store.
pub fn normalize_name(raw: &str) -> CmsResult<String> {
    let name = raw.trim().to_lowercase();

    if name.len() < NAME_MIN_LEN || name.len() > NAME_MAX_LEN {
        return Err(CmsError::bad_request(
            "collectionName",
            format!(
                "Collection name must be between {} and {} characters.",
                NAME_MIN_LEN, NAME_MAX_LEN
            ),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(CmsError::bad_request(
            "collectionName",
            format!(
                "Collection name '{}' may only contain letters, digits, '_' and '-'.",
                raw
            ),
        ));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Posts ").unwrap(), "posts");
        assert_eq!(normalize_name("blog_posts-2").unwrap(), "blog_posts-2");
        assert!(normalize_name("x").is_err());
        assert!(normalize_name("drop table").is_err());
        assert!(normalize_name("posts\"; --").is_err());
        assert!(normalize_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_schema_roundtrip_is_structural() {
        let input = json!({
            "name": "posts",
            "title": "Posts",
            "settings": { "dataTable": { "entriesPerPage": 25 } },
            "fields": [
                { "name": "title", "label": "Title", "fieldType": "TextField", "required": true },
                {
                    "name": "cover",
                    "label": "Cover",
                    "fieldType": "ImageField",
                    "settings": { "upload": { "maxFiles": 1 } }
                },
                {
                    "name": "status",
                    "label": "Status",
                    "fieldType": "OptionField",
                    "options": ["draft", "published"]
                }
            ]
        });

        let schema: CollectionSchema = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&schema).unwrap(), input);
    }

    #[test]
    fn test_validate_accepts_well_formed_schema() {
        let schema = CollectionSchema::new(
            "posts",
            "Posts",
            vec![
                Field::text("title"),
                Field::composite("meta", vec![Field::text("author")]),
            ],
        );
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_siblings() {
        let schema = CollectionSchema::new(
            "posts",
            "Posts",
            vec![Field::text("title"), Field::text("title")],
        );
        let err = schema.validate().unwrap_err();
        assert_eq!(err.field_error().unwrap().path, "fields");
    }

    #[test]
    fn test_validate_rejects_nested_duplicates() {
        let schema = CollectionSchema::new(
            "posts",
            "Posts",
            vec![Field::composite(
                "meta",
                vec![Field::text("a"), Field::text("a")],
            )],
        );
        let err = schema.validate().unwrap_err();
        assert_eq!(err.field_error().unwrap().path, "meta");
    }

    #[test]
    fn test_validate_rejects_path_characters() {
        let schema = CollectionSchema::new("posts", "Posts", vec![Field::text("a.b")]);
        assert!(schema.validate().is_err());

        let schema = CollectionSchema::new("posts", "Posts", vec![Field::text("$set")]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_requires_title() {
        let schema = CollectionSchema::new("posts", " ", vec![]);
        let err = schema.validate().unwrap_err();
        assert_eq!(err.field_error().unwrap().path, "title");
    }
}
