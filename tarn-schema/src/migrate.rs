use tarn_common::{PropertyMap, PropertyValue};

use crate::coerce::coerce;
use crate::types::{
    CoercionNote, MigrationIssue, MigrationResult, ObjectSchema, PropertySchema, Severity,
};

/// `Migrate`: walks a property map validated under `from` to the
/// shape required by `to`, labelling each change per the risk taxonomy.
/// Properties dropped by `to` are reported but not silently discarded from
/// the issue list; fields the new schema requires but the object lacks
/// become `requires_default` issues rather than hard failures, since the
/// caller (graph store) decides whether to apply a default or reject.
pub fn migrate(props: &PropertyMap, from: &ObjectSchema, to: &ObjectSchema) -> MigrationResult {
    let mut new_properties = PropertyMap::new();
    let mut dropped = Vec::new();
    let mut added = Vec::new();
    let mut coerced = Vec::new();
    let mut issues = Vec::new();
    let mut success = true;

    for (name, to_schema) in &to.properties {
        match props.get(name) {
            Some(value) => {
                if value_matches(value, to_schema) {
                    new_properties.insert(name.clone(), value.clone());
                } else if let Some(coerced_value) = coerce(value, to_schema.prop_type) {
                    coerced.push(CoercionNote {
                        field: name.clone(),
                        from: value.type_name().to_string(),
                        to: format!("{:?}", to_schema.prop_type),
                    });
                    new_properties.insert(name.clone(), coerced_value);
                } else {
                    success = false;
                    issues.push(MigrationIssue {
                        severity: Severity::Error,
                        description: format!(
                            "property `{name}` changed type from `{}` to `{:?}` with no lossless coercion",
                            value.type_name(),
                            to_schema.prop_type
                        ),
                        suggestion: Some(format!(
                            "manually resolve `{name}` before completing migration (breaking change)"
                        )),
                    });
                }
            }
            None if to.required.contains(name) => {
                if !from.properties.contains_key(name) {
                    added.push(name.clone());
                }
                issues.push(MigrationIssue {
                    severity: Severity::Warning,
                    description: format!(
                        "new required property `{name}` has no value from the previous version"
                    ),
                    suggestion: Some(format!("supply a default value for `{name}`")),
                });
            }
            None => {
                if !from.properties.contains_key(name) {
                    added.push(name.clone());
                }
            }
        }
    }

    for name in props.keys() {
        if !to.properties.contains_key(name) {
            dropped.push(name.clone());
            issues.push(MigrationIssue {
                severity: Severity::Info,
                description: format!("property `{name}` is not present in the target schema"),
                suggestion: None,
            });
        }
    }

    MigrationResult {
        success,
        new_properties,
        dropped,
        added,
        coerced,
        issues,
    }
}

fn value_matches(value: &PropertyValue, schema: &PropertySchema) -> bool {
    crate::validate::matches(value, schema.prop_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyType;
    use std::collections::BTreeMap;

    fn schema(props: &[(&str, PropertyType)], required: &[&str]) -> ObjectSchema {
        let mut properties = BTreeMap::new();
        for (name, ty) in props {
            properties.insert(
                (*name).to_string(),
                PropertySchema { prop_type: *ty, description: None },
            );
        }
        ObjectSchema {
            name: "article".into(),
            version: 1,
            parent_version_id: None,
            properties,
            required: required.iter().map(|s| s.to_string()).collect(),
            extraction_guidelines: None,
            closed: false,
        }
    }

    #[test]
    fn additive_optional_field_is_safe() {
        let from = schema(&[("title", PropertyType::String)], &["title"]);
        let to = schema(
            &[("title", PropertyType::String), ("summary", PropertyType::String)],
            &["title"],
        );
        let mut props = PropertyMap::new();
        props.insert("title".into(), PropertyValue::String("hi".into()));

        let result = migrate(&props, &from, &to);
        assert!(result.success);
        assert_eq!(result.added, vec!["summary".to_string()]);
        assert!(result.issues.iter().all(|i| i.severity != Severity::Error));
    }

    #[test]
    fn new_required_field_without_value_is_flagged() {
        let from = schema(&[("title", PropertyType::String)], &["title"]);
        let to = schema(
            &[("title", PropertyType::String), ("author", PropertyType::String)],
            &["title", "author"],
        );
        let mut props = PropertyMap::new();
        props.insert("title".into(), PropertyValue::String("hi".into()));

        let result = migrate(&props, &from, &to);
        assert!(result.success);
        assert!(result
            .issues
            .iter()
            .any(|i| i.description.contains("author")));
    }

    #[test]
    fn incompatible_type_change_is_breaking() {
        let from = schema(&[("tags", PropertyType::Array)], &[]);
        let to = schema(&[("tags", PropertyType::Boolean)], &[]);
        let mut props = PropertyMap::new();
        props.insert(
            "tags".into(),
            PropertyValue::Array(vec![PropertyValue::String("a".into())]),
        );

        let result = migrate(&props, &from, &to);
        assert!(!result.success);
        assert!(result.issues.iter().any(|i| i.severity == Severity::Error));
    }

    #[test]
    fn dropped_field_is_reported() {
        let from = schema(&[("title", PropertyType::String), ("legacy", PropertyType::String)], &[]);
        let to = schema(&[("title", PropertyType::String)], &[]);
        let mut props = PropertyMap::new();
        props.insert("title".into(), PropertyValue::String("hi".into()));
        props.insert("legacy".into(), PropertyValue::String("old".into()));

        let result = migrate(&props, &from, &to);
        assert_eq!(result.dropped, vec!["legacy".to_string()]);
    }
}
