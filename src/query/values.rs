use super::plan::SqlValue;
use crate::config::EnumStorage;
use crate::error::{RelqlError, Result};
use crate::model::{Metamodel, ValueType};
use async_graphql::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Decode a bound argument value (or a loaded key) against the attribute's declared type
pub fn to_sql(model: &Metamodel, value_type: &ValueType, value: &Value) -> Result<SqlValue> {
    let mismatch = || {
        RelqlError::Query(format!(
            "Value {} does not match type {:?}",
            value, value_type
        ))
    };

    if matches!(value, Value::Null) {
        return Ok(SqlValue::Null);
    }

    let sql = match value_type {
        ValueType::String | ValueType::Uuid => match value {
            Value::String(text) => SqlValue::Text(text.clone()),
            _ => return Err(mismatch()),
        },
        ValueType::Int | ValueType::Short | ValueType::Long => match value {
            Value::Number(number) => SqlValue::Int(number.as_i64().ok_or_else(mismatch)?),
            Value::String(text) => SqlValue::Int(text.parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ValueType::Float | ValueType::Double => match value {
            Value::Number(number) => SqlValue::Float(number.as_f64().ok_or_else(mismatch)?),
            _ => return Err(mismatch()),
        },
        ValueType::Boolean => match value {
            Value::Boolean(flag) => SqlValue::Bool(*flag),
            _ => return Err(mismatch()),
        },
        ValueType::Decimal => match value {
            Value::Number(number) => SqlValue::Decimal(number.to_string()),
            Value::String(text) if is_decimal_literal(text) => {
                SqlValue::Decimal(text.clone())
            }
            _ => return Err(mismatch()),
        },
        ValueType::Date => match value {
            Value::String(text) => {
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| mismatch())?;
                SqlValue::Date(date.format("%Y-%m-%d").to_string())
            }
            _ => return Err(mismatch()),
        },
        ValueType::DateTime => match value {
            Value::String(text) => {
                let timestamp = DateTime::parse_from_rfc3339(text)
                    .map(|dt| dt.naive_utc())
                    .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
                    .map_err(|_| mismatch())?;
                SqlValue::Timestamp(timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            _ => return Err(mismatch()),
        },
        ValueType::Enum(name) => {
            let enum_type = model.enum_type(name)?;
            let constant = match value {
                Value::Enum(constant) => constant.as_str(),
                Value::String(constant) => constant.as_str(),
                _ => return Err(mismatch()),
            };
            let ordinal = enum_type.ordinal(constant).ok_or_else(|| {
                RelqlError::Query(format!("'{}' is not a value of enum {}", constant, name))
            })?;
            match enum_type.storage {
                EnumStorage::Name => SqlValue::Text(constant.to_string()),
                EnumStorage::Ordinal => SqlValue::Int(ordinal as i64),
            }
        }
        ValueType::Other(name) => {
            return Err(RelqlError::Query(format!(
                "No filter mapping for values of type '{}'",
                name
            )))
        }
    };
    Ok(sql)
}

/// Elements of a list-typed filter argument; a single value counts as a one-element list
pub fn list_elements(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Plain or exponent decimal notation, `-12.50` or `1.5e-3`
pub(crate) fn is_decimal_literal(text: &str) -> bool {
    fn digits(text: &str) -> usize {
        text.bytes().take_while(u8::is_ascii_digit).count()
    }

    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let integer = digits(unsigned);
    let mut rest = &unsigned[integer..];
    let mut fraction = 0;
    if let Some(after_point) = rest.strip_prefix('.') {
        fraction = digits(after_point);
        if fraction == 0 {
            return false;
        }
        rest = &after_point[fraction..];
    }
    if integer + fraction == 0 {
        return false;
    }
    match rest.strip_prefix(['e', 'E']) {
        None => rest.is_empty(),
        Some(exponent) => {
            let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !exponent.is_empty() && digits(exponent) == exponent.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeConfig, Config, EntityConfig, EnumConfig};
    use async_graphql::Name;

    fn model(storage: EnumStorage) -> Metamodel {
        let config = Config {
            entities: vec![EntityConfig {
                name: "Book".to_string(),
                table: "book".to_string(),
                primary_key: "id".to_string(),
                description: None,
                ignore: false,
                attributes: vec![
                    AttributeConfig::scalar("id", "long"),
                    AttributeConfig::scalar("genre", "Genre"),
                ],
            }],
            enums: vec![EnumConfig {
                name: "Genre".to_string(),
                values: vec!["NOVEL".to_string(), "FANTASY".to_string()],
                storage,
                description: None,
            }],
            ..Config::default()
        };
        Metamodel::from_config(&config).unwrap()
    }

    #[test]
    fn test_enum_literal_and_variable_decode_alike() {
        let model = model(EnumStorage::Name);
        let genre = ValueType::Enum("Genre".to_string());

        let literal = to_sql(&model, &genre, &Value::Enum(Name::new("FANTASY"))).unwrap();
        let variable = to_sql(&model, &genre, &Value::String("FANTASY".to_string())).unwrap();
        assert_eq!(literal, SqlValue::Text("FANTASY".to_string()));
        assert_eq!(literal, variable);
    }

    #[test]
    fn test_enum_ordinal_storage() {
        let model = model(EnumStorage::Ordinal);
        let genre = ValueType::Enum("Genre".to_string());
        assert_eq!(
            to_sql(&model, &genre, &Value::Enum(Name::new("FANTASY"))).unwrap(),
            SqlValue::Int(1)
        );
        assert!(to_sql(&model, &genre, &Value::Enum(Name::new("POETRY"))).is_err());
    }

    #[test]
    fn test_decimal_literals() {
        for valid in ["19.99", "-3", "+0.5", ".5", "1e5", "2.5E-3"] {
            assert!(is_decimal_literal(valid), "{}", valid);
        }
        for invalid in ["", ".", "7.", "-", "1e", "e5", "NaN", "inf", "1.2.3", "0x10", "1; DROP"] {
            assert!(!is_decimal_literal(invalid), "{}", invalid);
        }
    }

    #[test]
    fn test_scalar_decoding() {
        let model = model(EnumStorage::Name);
        assert_eq!(
            to_sql(&model, &ValueType::Long, &Value::String("42".to_string())).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            to_sql(&model, &ValueType::DateTime, &Value::String("2024-03-01T10:00:00+02:00".to_string())).unwrap(),
            SqlValue::Timestamp("2024-03-01T08:00:00".to_string())
        );
        assert!(to_sql(&model, &ValueType::Date, &Value::String("03/01/2024".to_string())).is_err());
        assert!(to_sql(&model, &ValueType::Decimal, &Value::String("1; DROP".to_string())).is_err());
        assert_eq!(
            to_sql(&model, &ValueType::Decimal, &Value::String("1e5".to_string())).unwrap(),
            SqlValue::Decimal("1e5".to_string())
        );
        assert_eq!(to_sql(&model, &ValueType::Int, &Value::Null).unwrap(), SqlValue::Null);
    }
}
