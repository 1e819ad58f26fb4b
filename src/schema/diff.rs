//! Structural diff between two versions of a field tree.
//!
//! The diff produces a [`MigrationPlan`]: the unset and rename operations
//! that keep stored entries consistent with the new schema. Planning is pure;
//! applying a plan to an entry store is done by [`crate::migration`].
//!
//! Each nesting level is compared by field names:
//!
//! - only additions: nothing to migrate, new fields stay absent until written
//! - only removals: every removed field is unset
//! - same length, same names in a different order: nothing to migrate
//! - same length, exactly one position renamed: one rename
//! - anything else is rejected as ambiguous
//!
//! Retained fields are then compared recursively: composites at
//! `parent.name`, arrays of composites at `parent.name.$[]`. An array that
//! loses its element definition is unset as a whole.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use super::field::{Field, FieldKind};
use super::path::FieldPath;

/// A single change to apply to every stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// Remove `field` from every object at `parent`.
    Unset { parent: FieldPath, field: String },
    /// Move the value of `from` to `to` in every object at `parent`.
    Rename {
        parent: FieldPath,
        from: String,
        to: String,
    },
}

impl MigrationStep {
    pub fn parent(&self) -> &FieldPath {
        match self {
            MigrationStep::Unset { parent, .. } | MigrationStep::Rename { parent, .. } => parent,
        }
    }

    /// Path of the field the step acts on (the old name for renames).
    pub fn path(&self) -> FieldPath {
        match self {
            MigrationStep::Unset { parent, field } => parent.child(field),
            MigrationStep::Rename { parent, from, .. } => parent.child(from),
        }
    }

    /// Steps below an array boundary need a per-document rewrite.
    pub fn crosses_array(&self) -> bool {
        self.parent().crosses_array()
    }

    /// Applies the step to one document. Returns whether it changed.
    pub fn apply(&self, doc: &mut serde_json::Value) -> bool {
        match self {
            MigrationStep::Unset { parent, field } => parent.unset_in(doc, field),
            MigrationStep::Rename { parent, from, to } => parent.rename_in(doc, from, to),
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::Unset { .. } => write!(f, "unset {}", self.path()),
            MigrationStep::Rename { parent, to, .. } => {
                write!(f, "rename {} -> {}", self.path(), parent.child(to))
            }
        }
    }
}

/// Ordered list of steps. Later steps see the effect of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// The schema update can't be mapped to a single unambiguous migration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("ambiguous schema change at '{path}': {reason}")]
    Ambiguous { path: String, reason: String },
}

impl DiffError {
    pub fn path(&self) -> &str {
        match self {
            DiffError::Ambiguous { path, .. } => path,
        }
    }

    fn ambiguous(parent: &FieldPath, reason: String) -> Self {
        let path = if parent.is_root() {
            "fields".to_string()
        } else {
            parent.to_string()
        };
        DiffError::Ambiguous { path, reason }
    }
}

/// Compares two top-level field lists and plans the entry migration.
pub fn plan_migration(old: &[Field], new: &[Field]) -> Result<MigrationPlan, DiffError> {
    let mut steps = Vec::new();
    diff_level(old, new, &FieldPath::root(), &mut steps)?;
    Ok(MigrationPlan { steps })
}

fn diff_level(
    old: &[Field],
    new: &[Field],
    parent: &FieldPath,
    steps: &mut Vec<MigrationStep>,
) -> Result<(), DiffError> {
    let old_names: HashSet<&str> = old.iter().map(|f| f.name.as_str()).collect();
    let new_names: HashSet<&str> = new.iter().map(|f| f.name.as_str()).collect();

    let removed: Vec<&str> = old
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| !new_names.contains(name))
        .collect();
    let added: Vec<&str> = new
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| !old_names.contains(name))
        .collect();

    // (old name, new name) of a positional rename at this level.
    let mut renamed: Option<(&str, &str)> = None;

    if new.len() > old.len() {
        if !removed.is_empty() {
            return Err(DiffError::ambiguous(
                parent,
                format!(
                    "fields [{}] were removed while fields [{}] were added",
                    removed.join(", "),
                    added.join(", ")
                ),
            ));
        }
    } else if new.len() < old.len() {
        if !added.is_empty() {
            return Err(DiffError::ambiguous(
                parent,
                format!(
                    "fields [{}] were added while fields [{}] were removed",
                    added.join(", "),
                    removed.join(", ")
                ),
            ));
        }
        for name in &removed {
            steps.push(MigrationStep::Unset {
                parent: parent.clone(),
                field: name.to_string(),
            });
        }
    } else if !removed.is_empty() {
        let moved: Vec<usize> = (0..old.len())
            .filter(|&i| old[i].name != new[i].name)
            .collect();

        if removed.len() != 1 || moved.len() != 1 {
            return Err(DiffError::ambiguous(
                parent,
                format!(
                    "only one field can be renamed per level, got [{}] -> [{}]",
                    removed.join(", "),
                    added.join(", ")
                ),
            ));
        }

        let index = moved[0];
        let (from, to) = (old[index].name.as_str(), new[index].name.as_str());
        steps.push(MigrationStep::Rename {
            parent: parent.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
        renamed = Some((from, to));
    }

    for new_field in new {
        let old_name = match renamed {
            Some((from, to)) if to == new_field.name => from,
            _ => new_field.name.as_str(),
        };
        if let Some(old_field) = old.iter().find(|f| f.name == old_name) {
            diff_field(old_field, new_field, parent, steps)?;
        }
    }

    Ok(())
}

/// Recurses into a retained field. `new.name` is its name after this level's
/// steps have been applied.
fn diff_field(
    old: &Field,
    new: &Field,
    parent: &FieldPath,
    steps: &mut Vec<MigrationStep>,
) -> Result<(), DiffError> {
    let path = parent.child(&new.name);

    match (&old.kind, &new.kind) {
        (
            FieldKind::CompositeField { fields: old_fields },
            FieldKind::CompositeField { fields: new_fields },
        ) => diff_level(old_fields, new_fields, &path, steps),
        (
            FieldKind::FieldArray {
                field: old_element, ..
            },
            FieldKind::FieldArray {
                field: new_element, ..
            },
        ) => match (old_element, new_element) {
            (Some(_), None) => {
                steps.push(MigrationStep::Unset {
                    parent: parent.clone(),
                    field: new.name.clone(),
                });
                Ok(())
            }
            (Some(old_element), Some(new_element)) => {
                match (old_element.composite_fields(), new_element.composite_fields()) {
                    (Some(old_fields), Some(new_fields)) => {
                        diff_level(old_fields, new_fields, &path.each(), steps)
                    }
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}
