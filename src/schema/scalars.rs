/// Custom GraphQL scalar types
///
/// `Long`, `Short`, `BigDecimal`, `UUID`, `Date` and `DateTime`. Dates and
/// datetimes use ISO 8601 strings; decimals are accepted as numbers or strings
/// so precision survives the wire.

use crate::query::is_decimal_literal;
use crate::schema::graph::ScalarDef;
use async_graphql::dynamic::Scalar;
use async_graphql::Value;
use chrono::{DateTime as ChronoDateTime, NaiveDate, NaiveDateTime};

const CUSTOM_SCALARS: [(&str, &str); 6] = [
    ("Long", "64-bit signed integer"),
    ("Short", "16-bit signed integer"),
    ("BigDecimal", "Arbitrary precision decimal, as a number or a string"),
    ("UUID", "RFC 4122 UUID string"),
    ("Date", "ISO 8601 date format (YYYY-MM-DD)"),
    ("DateTime", "ISO 8601 datetime format with timezone"),
];

/// Graph nodes of every custom scalar
pub fn custom_scalars() -> Vec<ScalarDef> {
    CUSTOM_SCALARS
        .iter()
        .map(|(name, description)| ScalarDef {
            name: name.to_string(),
            description: Some(description.to_string()),
        })
        .collect()
}

/// Engine scalar for a graph node, with input validation for the known names
pub fn to_dynamic(def: &ScalarDef) -> Scalar {
    let mut scalar = Scalar::new(def.name.as_str());
    if let Some(description) = &def.description {
        scalar = scalar.description(description.as_str());
    }

    match def.name.as_str() {
        "Long" => scalar.validator(is_long),
        "Short" => scalar.validator(is_short),
        "BigDecimal" => scalar.validator(is_decimal),
        "UUID" => scalar.validator(is_uuid),
        "Date" => scalar.validator(is_date),
        "DateTime" => scalar.validator(is_datetime),
        _ => scalar,
    }
}

fn is_long(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_i64().is_some(),
        Value::String(s) => s.parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_short(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_i64().is_some_and(|v| i16::try_from(v).is_ok()),
        _ => false,
    }
}

fn is_decimal(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => is_decimal_literal(s),
        _ => false,
    }
}

fn is_uuid(value: &Value) -> bool {
    if let Value::String(s) = value {
        uuid::Uuid::parse_str(s).is_ok()
    } else {
        false
    }
}

fn is_date(value: &Value) -> bool {
    if let Value::String(s) = value {
        NaiveDate::parse_from_str(s.as_str(), "%Y-%m-%d").is_ok()
    } else {
        false
    }
}

fn is_datetime(value: &Value) -> bool {
    if let Value::String(s) = value {
        ChronoDateTime::parse_from_rfc3339(s.as_str()).is_ok()
            || NaiveDateTime::parse_from_str(s.as_str(), "%Y-%m-%dT%H:%M:%S%.f").is_ok()
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_scalar_registration() {
        let names: Vec<_> = custom_scalars().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Long", "Short", "BigDecimal", "UUID", "Date", "DateTime"]);
    }

    #[test]
    fn test_long_and_short_validation() {
        assert!(is_long(&Value::from(9_007_199_254_740_993i64)));
        assert!(is_long(&Value::from("42")));
        assert!(!is_long(&Value::from(1.5)));
        assert!(is_short(&Value::from(-32768)));
        assert!(!is_short(&Value::from(40_000)));
    }

    #[test]
    fn test_decimal_validation() {
        assert!(is_decimal(&Value::from("19.99")));
        assert!(is_decimal(&Value::from(3)));
        assert!(!is_decimal(&Value::from("nineteen")));
        assert!(is_decimal(&Value::from("1e5")));
        assert!(!is_decimal(&Value::from("NaN")));
    }

    #[test]
    fn test_uuid_validation() {
        assert!(is_uuid(&Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")));
        assert!(!is_uuid(&Value::from("not-a-uuid")));
        assert!(!is_uuid(&Value::from(7)));
    }

    #[test]
    fn test_date_validation() {
        assert!(is_date(&Value::from("2024-01-15")));
        assert!(!is_date(&Value::from("invalid-date")));
    }

    #[test]
    fn test_datetime_validation() {
        assert!(is_datetime(&Value::from("2024-01-15T10:00:00Z")));
        assert!(is_datetime(&Value::from("2024-01-15T10:00:00")));
        assert!(!is_datetime(&Value::from("not-a-datetime")));
    }
}
