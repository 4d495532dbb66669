use crate::config::EnumStorage;
use async_graphql::Value;
use indexmap::IndexMap;

/// Declared type of a scalar attribute or scalar collection element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Uuid,
    Int,
    Short,
    Long,
    Float,
    Double,
    Boolean,
    Date,
    DateTime,
    Decimal,
    Enum(String),
    /// A type name with no mapping rule, rejected when the schema is derived
    Other(String),
}

impl ValueType {
    pub fn builtin(name: &str) -> Option<ValueType> {
        let value_type = match name {
            "string" | "text" => ValueType::String,
            "uuid" => ValueType::Uuid,
            "int" | "integer" => ValueType::Int,
            "short" => ValueType::Short,
            "long" | "bigint" => ValueType::Long,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "boolean" | "bool" => ValueType::Boolean,
            "date" => ValueType::Date,
            "datetime" | "timestamp" => ValueType::DateTime,
            "decimal" | "bigdecimal" => ValueType::Decimal,
            _ => return None,
        };
        Some(value_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Scalar,
    Embedded,
    ToOne,
    ToMany,
    ElementCollection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    pub join_column: String,
    pub inverse_join_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTable {
    pub table: String,
    pub join_column: String,
    /// Element column, `None` for embeddable elements
    pub column: Option<String>,
}

/// Physical mapping of an attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    Column(String),
    Embedded,
    /// Owning to-one: foreign key column on the declaring table
    JoinColumn(String),
    /// Inverse side: the named attribute on the target owns the mapping
    MappedBy(String),
    /// Owning many-to-many
    JoinTable(JoinTable),
    CollectionTable(CollectionTable),
}

/// Element type of an element collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType<'a> {
    Scalar(&'a ValueType),
    Embeddable(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// Entity or embeddable that declares the attribute
    pub declaring: String,
    pub kind: AttributeKind,
    pub value_type: Option<ValueType>,
    pub target: Option<String>,
    pub mapping: Mapping,
    pub description: Option<String>,
    pub ignored: bool,
}

impl Attribute {
    pub fn column(&self) -> Option<&str> {
        match &self.mapping {
            Mapping::Column(column) => Some(column),
            _ => None,
        }
    }

    /// Whether this side declares the physical mapping of the relationship
    pub fn is_owning(&self) -> bool {
        !matches!(self.mapping, Mapping::MappedBy(_))
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, AttributeKind::ToOne | AttributeKind::ToMany)
    }

    pub fn element(&self) -> Option<ElementType<'_>> {
        if self.kind != AttributeKind::ElementCollection {
            return None;
        }
        match (&self.value_type, &self.target) {
            (Some(value_type), _) => Some(ElementType::Scalar(value_type)),
            (None, Some(target)) => Some(ElementType::Embeddable(target)),
            _ => None,
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or_default()
    }
}

/// A scalar reachable from a type, with embedded attributes flattened away
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnField {
    /// Graph field name (the innermost attribute name)
    pub name: String,
    /// Type declaring the innermost attribute
    pub declaring: String,
    pub column: String,
    pub value_type: ValueType,
    /// Attribute names from the owner down to the scalar
    pub path: Vec<String>,
}

/// What a graph field name of an entity resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedField {
    Column(ColumnField),
    /// Relationship or element collection attribute, by name
    Attribute(String),
}

#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    /// Name of the primary key attribute
    pub primary_key: String,
    pub description: Option<String>,
    pub ignored: bool,
    pub attributes: IndexMap<String, Attribute>,
    pub(crate) fields: IndexMap<String, ResolvedField>,
}

impl EntityType {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Resolve a graph field name, looking through embedded attributes
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.get(name)
    }

    /// Visible graph fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &ResolvedField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn primary_key_column(&self) -> &str {
        self.attributes
            .get(&self.primary_key)
            .and_then(Attribute::column)
            .unwrap_or(&self.primary_key)
    }

    pub fn primary_key_type(&self) -> &ValueType {
        self.attributes
            .get(&self.primary_key)
            .and_then(|a| a.value_type.as_ref())
            .unwrap_or(&ValueType::Long)
    }

    /// Owning to-one attributes with their foreign key columns
    pub fn join_columns(&self) -> impl Iterator<Item = (&Attribute, &str)> {
        self.attributes.values().filter_map(|attribute| match &attribute.mapping {
            Mapping::JoinColumn(column) => Some((attribute, column.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddableType {
    pub name: String,
    pub description: Option<String>,
    pub attributes: IndexMap<String, Attribute>,
    pub(crate) columns: Vec<ColumnField>,
}

impl EmbeddableType {
    /// Scalars of the embeddable, nested embeddables flattened
    pub fn columns(&self) -> &[ColumnField] {
        &self.columns
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
    pub storage: EnumStorage,
    pub description: Option<String>,
}

impl EnumType {
    /// Decode a stored value into the constant name
    pub fn decode(&self, raw: &Value) -> Option<&str> {
        match (self.storage, raw) {
            (_, Value::Enum(name)) => self.constant(name.as_str()),
            (EnumStorage::Name, Value::String(name)) => self.constant(name),
            (EnumStorage::Ordinal, Value::Number(number)) => number
                .as_u64()
                .and_then(|ordinal| self.values.get(ordinal as usize))
                .map(String::as_str),
            (EnumStorage::Ordinal, Value::String(text)) => text
                .parse::<usize>()
                .ok()
                .and_then(|ordinal| self.values.get(ordinal))
                .map(String::as_str),
            _ => None,
        }
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.values.iter().position(|value| value == name)
    }

    fn constant(&self, name: &str) -> Option<&str> {
        self.values.iter().find(|value| *value == name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Name;

    fn genre(storage: EnumStorage) -> EnumType {
        EnumType {
            name: "Genre".to_string(),
            values: vec!["NOVEL".to_string(), "FANTASY".to_string()],
            storage,
            description: None,
        }
    }

    #[test]
    fn test_builtin_value_types() {
        assert_eq!(ValueType::builtin("long"), Some(ValueType::Long));
        assert_eq!(ValueType::builtin("timestamp"), Some(ValueType::DateTime));
        assert_eq!(ValueType::builtin("Genre"), None);
    }

    #[test]
    fn test_enum_decode_by_name() {
        let genre = genre(EnumStorage::Name);
        assert_eq!(genre.decode(&Value::String("FANTASY".to_string())), Some("FANTASY"));
        assert_eq!(genre.decode(&Value::Enum(Name::new("NOVEL"))), Some("NOVEL"));
        assert_eq!(genre.decode(&Value::String("POETRY".to_string())), None);
        assert_eq!(genre.decode(&Value::from(1)), None);
    }

    #[test]
    fn test_enum_decode_by_ordinal() {
        let genre = genre(EnumStorage::Ordinal);
        assert_eq!(genre.decode(&Value::from(1)), Some("FANTASY"));
        assert_eq!(genre.decode(&Value::from(7)), None);
        assert_eq!(genre.ordinal("FANTASY"), Some(1));
    }
}
