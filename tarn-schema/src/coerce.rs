use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use tarn_common::PropertyValue;

use crate::types::PropertyType;

/// Deterministic coercions. Returns `None` when the conversion would
/// be lossy or ambiguous, which the caller reports as a validation error
/// rather than silently guessing.
pub fn coerce(value: &PropertyValue, target: PropertyType) -> Option<PropertyValue> {
    match (value, target) {
        (PropertyValue::String(s), PropertyType::Number) => {
            s.trim().parse::<f64>().ok().map(PropertyValue::Number)
        }
        (PropertyValue::Number(n), PropertyType::String) => {
            Some(PropertyValue::String(format_number(*n)))
        }
        (PropertyValue::String(s), PropertyType::Boolean) => coerce_bool(s),
        (PropertyValue::String(s), PropertyType::Date) => coerce_date(s),
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

fn coerce_bool(s: &str) -> Option<PropertyValue> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(PropertyValue::Boolean(true)),
        "false" | "f" | "no" | "n" | "0" | "" => Some(PropertyValue::Boolean(false)),
        _ => None,
    }
}

/// Normalizes any of the accepted date input formats to ISO-8601 UTC.
fn coerce_date(s: &str) -> Option<PropertyValue> {
    let trimmed = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(iso(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(iso(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)));
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(iso(DateTime::<Utc>::from_naive_utc_and_offset(
            d.and_hms_opt(0, 0, 0)?,
            Utc,
        )));
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(iso(DateTime::<Utc>::from_naive_utc_and_offset(
            d.and_hms_opt(0, 0, 0)?,
            Utc,
        )));
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d-%m-%Y") {
        return Some(iso(DateTime::<Utc>::from_naive_utc_and_offset(
            d.and_hms_opt(0, 0, 0)?,
            Utc,
        )));
    }
    None
}

fn iso(dt: DateTime<Utc>) -> PropertyValue {
    PropertyValue::Date(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_string_roundtrip_is_lossless() {
        let coerced = coerce(&PropertyValue::String("42".into()), PropertyType::Number).unwrap();
        assert_eq!(coerced, PropertyValue::Number(42.0));
    }

    #[test]
    fn non_numeric_string_does_not_coerce_to_number() {
        assert!(coerce(&PropertyValue::String("forty-two".into()), PropertyType::Number).is_none());
    }

    #[test]
    fn boolean_coercion_accepts_documented_aliases() {
        for s in ["true", "T", "Yes", "y", "1"] {
            assert_eq!(
                coerce(&PropertyValue::String(s.into()), PropertyType::Boolean),
                Some(PropertyValue::Boolean(true))
            );
        }
        for s in ["false", "F", "No", "n", "0", ""] {
            assert_eq!(
                coerce(&PropertyValue::String(s.into()), PropertyType::Boolean),
                Some(PropertyValue::Boolean(false))
            );
        }
        assert!(coerce(&PropertyValue::String("maybe".into()), PropertyType::Boolean).is_none());
    }

    #[test]
    fn date_coercion_accepts_all_documented_formats() {
        let cases = ["2024-01-05", "2024-01-05 13:30:00", "01/05/2024", "05-01-2024"];
        for input in cases {
            let coerced = coerce(&PropertyValue::String(input.into()), PropertyType::Date);
            assert!(coerced.is_some(), "expected {input} to coerce");
            assert!(matches!(coerced, Some(PropertyValue::Date(_))));
        }
    }

    #[test]
    fn garbage_date_fails_to_coerce() {
        assert!(coerce(&PropertyValue::String("not a date".into()), PropertyType::Date).is_none());
    }
}
