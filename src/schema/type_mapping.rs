/// Model value type to GraphQL type mapping
///
/// Built-in value types map onto GraphQL's own scalars or the custom scalars
/// from `scalars`; enum-typed attributes refer to the enum type of the same
/// name. Anything else cannot be mapped and fails the schema build.

use crate::error::{RelqlError, Result};
use crate::model::ValueType;
use crate::schema::graph::TypeExpr;
use async_graphql::dynamic::TypeRef;
use async_graphql::{Name, Value};

/// How resolved values of an enum type become GraphQL enum values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumCoercion {
    /// Values are already enum constants, decoded once during hydration
    Identity,
    /// Values arrive as names and are converted here
    ByName,
}

impl EnumCoercion {
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (EnumCoercion::ByName, Value::String(name)) => Value::Enum(Name::new(name)),
            (_, value) => value,
        }
    }
}

/// Name of the GraphQL type for a value type
pub fn scalar_name(value_type: &ValueType) -> Option<&str> {
    let name = match value_type {
        ValueType::String => TypeRef::STRING,
        ValueType::Uuid => "UUID",
        ValueType::Int => TypeRef::INT,
        ValueType::Short => "Short",
        ValueType::Long => "Long",
        ValueType::Float | ValueType::Double => TypeRef::FLOAT,
        ValueType::Boolean => TypeRef::BOOLEAN,
        ValueType::Date => "Date",
        ValueType::DateTime => "DateTime",
        ValueType::Decimal => "BigDecimal",
        ValueType::Enum(name) => name,
        ValueType::Other(_) => return None,
    };
    Some(name)
}

/// Map an attribute's value type, failing with the declaring type and member
pub fn map_value_type(value_type: &ValueType, declaring: &str, member: &str) -> Result<TypeExpr> {
    scalar_name(value_type)
        .map(TypeExpr::named)
        .ok_or_else(|| RelqlError::UnmappableAttribute {
            declaring: declaring.to_string(),
            member: member.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_mappings() {
        assert_eq!(scalar_name(&ValueType::Long), Some("Long"));
        assert_eq!(scalar_name(&ValueType::Double), Some("Float"));
        assert_eq!(scalar_name(&ValueType::Decimal), Some("BigDecimal"));
        assert_eq!(scalar_name(&ValueType::Uuid), Some("UUID"));
        assert_eq!(scalar_name(&ValueType::Enum("Genre".into())), Some("Genre"));
    }

    #[test]
    fn test_unmappable_type_names_member() {
        let err = map_value_type(&ValueType::Other("Blob".into()), "Book", "cover").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Book"));
        assert!(message.contains("cover"));
    }

    #[test]
    fn test_identity_coercion_passes_values_through() {
        let decoded = Value::Enum(Name::new("NOVEL"));
        assert_eq!(EnumCoercion::Identity.coerce(decoded.clone()), decoded);
        // Identity never re-decodes a raw storage value
        assert_eq!(EnumCoercion::Identity.coerce(Value::from("NOVEL")), Value::from("NOVEL"));
        assert_eq!(EnumCoercion::Identity.coerce(Value::Null), Value::Null);
    }

    #[test]
    fn test_by_name_coercion_converts_strings() {
        assert_eq!(
            EnumCoercion::ByName.coerce(Value::from("ASC")),
            Value::Enum(Name::new("ASC"))
        );
        assert_eq!(EnumCoercion::ByName.coerce(Value::Null), Value::Null);
    }
}
