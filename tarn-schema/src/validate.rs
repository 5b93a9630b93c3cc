use tarn_common::{AppError, PropertyMap, PropertyValue};

use crate::coerce::coerce;
use crate::types::{ObjectSchema, PropertyType};

pub(crate) fn matches(value: &PropertyValue, expected: PropertyType) -> bool {
    matches!(
        (value, expected),
        (PropertyValue::String(_), PropertyType::String)
            | (PropertyValue::Number(_), PropertyType::Number)
            | (PropertyValue::Boolean(_), PropertyType::Boolean)
            | (PropertyValue::Date(_), PropertyType::Date)
            | (PropertyValue::Array(_), PropertyType::Array)
            | (PropertyValue::Object(_), PropertyType::Object)
    )
}

/// `Validate`: required fields enforced strictly; known fields of the
/// wrong primitive type are coerced deterministically or rejected; unknown
/// fields pass through unless the schema is `closed`. Idempotent:
/// re-validating an already-valid map returns it unchanged.
pub fn validate(props: &PropertyMap, schema: &ObjectSchema) -> Result<PropertyMap, AppError> {
    let mut out = PropertyMap::new();

    for field in &schema.required {
        if !props.contains_key(field) {
            return Err(AppError::Validation(format!(
                "missing required property `{field}` for schema `{}`",
                schema.name
            )));
        }
    }

    for (name, value) in props {
        match schema.properties.get(name) {
            Some(prop_schema) => {
                if matches(value, prop_schema.prop_type) {
                    out.insert(name.clone(), value.clone());
                } else if let Some(coerced) = coerce(value, prop_schema.prop_type) {
                    out.insert(name.clone(), coerced);
                } else if matches!(value, PropertyValue::Null) {
                    out.insert(name.clone(), PropertyValue::Null);
                } else {
                    return Err(AppError::Validation(format!(
                        "property `{name}` is `{}`, expected `{:?}` and no lossless coercion exists",
                        value.type_name(),
                        prop_schema.prop_type
                    )));
                }
            }
            None if schema.closed => {
                return Err(AppError::Validation(format!(
                    "schema `{}` is closed; unknown property `{name}`",
                    schema.name
                )));
            }
            None => {
                out.insert(name.clone(), value.clone());
            }
        }
    }

    Ok(out)
}
