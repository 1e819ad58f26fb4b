//! Field definitions of a collection schema.
//!
//! A schema is an ordered tree: leaf fields, composite fields (a nested
//! object with its own ordered field list) and field arrays (a list whose
//! element type is described by at most one child field).
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "name": "tags",
//!   "label": "Tags",
//!   "fieldType": "FieldArray",
//!   "field": {
//!     "name": "tag",
//!     "fieldType": "CompositeField",
//!     "fields": [
//!       { "name": "label", "fieldType": "TextField" },
//!       { "name": "color", "fieldType": "TextField" }
//!     ]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column settings for the tabular entry view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_width: Option<f64>,
}

/// Upload constraints, only meaningful for image fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<u32>,
}

/// Display settings attached to a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_table: Option<DataTableSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadSettings>,
}

impl FieldSettings {
    /// Overlays `update` onto these settings.
    ///
    /// Data table values missing from `update` keep their current value.
    pub fn merge(&mut self, update: &FieldSettings) {
        if let Some(new_table) = &update.data_table {
            let table = self.data_table.get_or_insert_with(Default::default);
            if new_table.visible.is_some() {
                table.visible = new_table.visible;
            }
            if new_table.column_width.is_some() {
                table.column_width = new_table.column_width;
            }
        }
        if update.upload.is_some() {
            self.upload = update.upload.clone();
        }
    }
}

/// One named slot in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<FieldSettings>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// Type-specific part of a field, discriminated by `fieldType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fieldType")]
pub enum FieldKind {
    #[serde(rename_all = "camelCase")]
    TextField {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    NumberField {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    BooleanField {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    OptionField {
        #[serde(default)]
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_selected: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    ImageField {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    RichTextField {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<Value>,
    },
    CompositeField {
        #[serde(default)]
        fields: Vec<Field>,
    },
    #[serde(rename_all = "camelCase")]
    FieldArray {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u64>,
        /// Element type. `None` means the array takes untyped elements.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<Box<Field>>,
    },
}

/// Structural class of a field node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Leaf,
    Composite,
    Array,
}

impl Field {
    /// Creates a field with no label, flags or settings.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            required: None,
            read_only: None,
            settings: None,
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::TextField {
                default_value: None,
                pattern: None,
                max_length: None,
                min_length: None,
            },
        )
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::NumberField {
                default_value: None,
                min: None,
                max: None,
            },
        )
    }

    pub fn image(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ImageField {
                min_length: None,
                max_length: None,
            },
        )
    }

    pub fn composite(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::new(name, FieldKind::CompositeField { fields })
    }

    pub fn array(name: impl Into<String>, element: Option<Field>) -> Self {
        Self::new(
            name,
            FieldKind::FieldArray {
                min_length: None,
                max_length: None,
                field: element.map(Box::new),
            },
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_settings(mut self, settings: FieldSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Returns the `fieldType` discriminator.
    pub fn field_type(&self) -> &'static str {
        match &self.kind {
            FieldKind::TextField { .. } => "TextField",
            FieldKind::NumberField { .. } => "NumberField",
            FieldKind::BooleanField { .. } => "BooleanField",
            FieldKind::OptionField { .. } => "OptionField",
            FieldKind::ImageField { .. } => "ImageField",
            FieldKind::RichTextField { .. } => "RichTextField",
            FieldKind::CompositeField { .. } => "CompositeField",
            FieldKind::FieldArray { .. } => "FieldArray",
        }
    }

    pub fn class(&self) -> FieldClass {
        match &self.kind {
            FieldKind::CompositeField { .. } => FieldClass::Composite,
            FieldKind::FieldArray { .. } => FieldClass::Array,
            _ => FieldClass::Leaf,
        }
    }

    /// Children of a composite field, `None` for every other kind.
    pub fn composite_fields(&self) -> Option<&[Field]> {
        match &self.kind {
            FieldKind::CompositeField { fields } => Some(fields),
            _ => None,
        }
    }

    /// Element definition of a field array, if it has one.
    pub fn element(&self) -> Option<&Field> {
        match &self.kind {
            FieldKind::FieldArray { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Composite children, or the array element as a one-item list.
    pub fn child_fields(&self) -> &[Field] {
        match &self.kind {
            FieldKind::CompositeField { fields } => fields,
            FieldKind::FieldArray {
                field: Some(element),
                ..
            } => std::slice::from_ref(element.as_ref()),
            _ => &[],
        }
    }
}

/// Visits every field of a tree depth-first, in declaration order.
///
/// The visitor receives the field's ancestors (outermost first) and the
/// field itself.
pub fn walk_fields<'a, F>(fields: &'a [Field], visit: &mut F)
where
    F: FnMut(&[&'a Field], &'a Field),
{
    fn walk<'a, F>(fields: &'a [Field], ancestors: &mut Vec<&'a Field>, visit: &mut F)
    where
        F: FnMut(&[&'a Field], &'a Field),
    {
        for field in fields {
            visit(ancestors, field);
            ancestors.push(field);
            walk(field.child_fields(), ancestors, visit);
            ancestors.pop();
        }
    }

    walk(fields, &mut Vec::new(), visit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf_field() {
        let field: Field = serde_json::from_value(json!({
            "name": "title",
            "label": "Title",
            "fieldType": "TextField",
            "required": true,
            "maxLength": 120
        }))
        .unwrap();

        assert_eq!(field.name, "title");
        assert_eq!(field.label, "Title");
        assert_eq!(field.required, Some(true));
        assert_eq!(field.class(), FieldClass::Leaf);
        assert!(matches!(
            field.kind,
            FieldKind::TextField {
                max_length: Some(120),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_array_of_composites() {
        let field: Field = serde_json::from_value(json!({
            "name": "tags",
            "fieldType": "FieldArray",
            "field": {
                "name": "tag",
                "fieldType": "CompositeField",
                "fields": [
                    { "name": "label", "fieldType": "TextField" },
                    { "name": "color", "fieldType": "TextField" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(field.class(), FieldClass::Array);
        let element = field.element().unwrap();
        assert_eq!(element.class(), FieldClass::Composite);
        let names: Vec<&str> = element
            .composite_fields()
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["label", "color"]);
        assert_eq!(field.child_fields().len(), 1);
    }

    #[test]
    fn test_untyped_array_has_no_children() {
        let field: Field =
            serde_json::from_value(json!({ "name": "any", "fieldType": "FieldArray" })).unwrap();
        assert!(field.element().is_none());
        assert!(field.child_fields().is_empty());
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let result: Result<Field, _> =
            serde_json::from_value(json!({ "name": "x", "fieldType": "DateField" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_keeps_camel_case_and_omits_empty() {
        let field = Field::text("title").with_settings(FieldSettings {
            data_table: Some(DataTableSettings {
                visible: Some(true),
                column_width: None,
            }),
            upload: None,
        });

        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "title",
                "fieldType": "TextField",
                "settings": { "dataTable": { "visible": true } }
            })
        );
    }

    #[test]
    fn test_settings_merge_keeps_missing_values() {
        let mut settings = FieldSettings {
            data_table: Some(DataTableSettings {
                visible: Some(true),
                column_width: Some(150.0),
            }),
            upload: None,
        };

        settings.merge(&FieldSettings {
            data_table: Some(DataTableSettings {
                visible: Some(false),
                column_width: None,
            }),
            upload: None,
        });

        let table = settings.data_table.unwrap();
        assert_eq!(table.visible, Some(false));
        assert_eq!(table.column_width, Some(150.0));
    }

    #[test]
    fn test_walk_fields_reports_ancestors() {
        let fields = vec![
            Field::text("title"),
            Field::composite("meta", vec![Field::text("author")]),
            Field::array(
                "tags",
                Some(Field::composite("tag", vec![Field::text("label")])),
            ),
        ];

        let mut seen = Vec::new();
        walk_fields(&fields, &mut |ancestors, field| {
            let mut path: Vec<&str> = ancestors.iter().map(|f| f.name.as_str()).collect();
            path.push(&field.name);
            seen.push(path.join("/"));
        });

        assert_eq!(
            seen,
            vec![
                "title",
                "meta",
                "meta/author",
                "tags",
                "tags/tag",
                "tags/tag/label"
            ]
        );
    }
}
