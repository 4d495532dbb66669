use serde::{Deserialize, Serialize};

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Physical tables registered with the query engine
    #[serde(default, rename = "table", skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableConfig>,

    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityConfig>,

    #[serde(default, rename = "embeddable", skip_serializing_if = "Vec::is_empty")]
    pub embeddables: Vec<EmbeddableConfig>,

    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to bind the server to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface to bind the server to
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    4000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

/// A table the session layer registers before serving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Name the table is registered under (format: "table" or "catalog.schema.table")
    pub name: String,

    /// Location of the data: a `.csv` file or a Delta table path (local or object store)
    pub storage_location: String,
}

/// Entity (relational record type) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// GraphQL type name (PascalCase)
    pub name: String,

    /// Registered table holding the entity's rows
    pub table: String,

    /// Name of the scalar attribute holding the identity
    pub primary_key: String,

    /// Optional description for GraphQL schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Excludes the entity from the schema
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,

    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeConfig>,
}

/// Embeddable (identity-less value aggregate) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddableConfig {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeConfig>,
}

/// How enum constants are stored in their column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumStorage {
    #[default]
    Name,
    Ordinal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumConfig {
    pub name: String,

    pub values: Vec<String>,

    #[serde(default)]
    pub storage: EnumStorage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKindConfig {
    Scalar,
    Embedded,
    ToOne,
    ToMany,
    ElementCollection,
}

/// Attribute of an entity or embeddable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,

    pub kind: AttributeKindConfig,

    /// Scalar or enum type name for `scalar` attributes and scalar element collections
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    /// Target entity (relationships) or embeddable (embedded, element collections)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Column name, defaults to the attribute name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Foreign key column on this side (owning to-one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_column: Option<String>,

    /// Attribute on the target that owns the mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_table: Option<JoinTableConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_table: Option<CollectionTableConfig>,
}

/// Join table of an owning many-to-many relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTableConfig {
    pub table: String,
    /// Column referencing the owning side's primary key
    pub join_column: String,
    /// Column referencing the target's primary key
    pub inverse_join_column: String,
}

/// Table holding the elements of an element collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTableConfig {
    pub table: String,
    /// Column referencing the owner's primary key
    pub join_column: String,
    /// Element column for scalar elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl AttributeConfig {
    /// Attribute with just a name and kind, the rest left unset
    pub fn new(name: impl Into<String>, kind: AttributeKindConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: None,
            target: None,
            column: None,
            join_column: None,
            mapped_by: None,
            join_table: None,
            collection_table: None,
            description: None,
            ignore: false,
        }
    }

    pub fn scalar(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        let mut attribute = Self::new(name, AttributeKindConfig::Scalar);
        attribute.value_type = Some(value_type.into());
        attribute
    }

    pub fn relation(
        name: impl Into<String>,
        kind: AttributeKindConfig,
        target: impl Into<String>,
    ) -> Self {
        let mut attribute = Self::new(name, kind);
        attribute.target = Some(target.into());
        attribute
    }
}

fn validate_type_name(name: &str) -> Result<(), String> {
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric()) {
        return Err(format!("GraphQL name '{}' must be alphanumeric", name));
    }

    if !name.chars().next().unwrap_or('_').is_uppercase() {
        return Err(format!(
            "GraphQL name '{}' must start with uppercase letter (PascalCase)",
            name
        ));
    }

    Ok(())
}

fn validate_table_name(table: &str) -> Result<(), String> {
    // Either a simple name (local files/testing) or catalog.schema.table
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() != 3 && parts.len() != 1 {
        return Err(format!(
            "Table '{}' must be either a simple name or in format 'catalog.schema.table'",
            table
        ));
    }
    if parts.iter().any(|part| part.is_empty()) {
        return Err(format!("Table '{}' contains an empty name part", table));
    }
    Ok(())
}

impl TableConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_table_name(&self.name)?;
        if self.storage_location.trim().is_empty() {
            return Err(format!("Table '{}' has an empty storage_location", self.name));
        }
        Ok(())
    }
}

impl EntityConfig {
    /// Validate entity configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_table_name(&self.table)?;
        validate_type_name(&self.name)?;

        if !self.attributes.iter().any(|a| a.name == self.primary_key) {
            return Err(format!(
                "Entity '{}' declares primary key '{}' but has no such attribute",
                self.name, self.primary_key
            ));
        }

        validate_attribute_names(&self.name, &self.attributes)
    }
}

impl EmbeddableConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_type_name(&self.name)?;
        validate_attribute_names(&self.name, &self.attributes)
    }
}

impl EnumConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_type_name(&self.name)?;
        if self.values.is_empty() {
            return Err(format!("Enum '{}' has no values", self.name));
        }
        for value in &self.values {
            let valid = value.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
                && value.chars().all(|c| c.is_alphanumeric() || c == '_');
            if !valid {
                return Err(format!(
                    "Enum '{}' value '{}' is not a valid GraphQL name",
                    self.name, value
                ));
            }
        }
        Ok(())
    }
}

fn validate_attribute_names(owner: &str, attributes: &[AttributeConfig]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for attribute in attributes {
        let valid = attribute
            .name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && attribute.name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid || attribute.name.starts_with("__") {
            return Err(format!(
                "Attribute '{}' of '{}' is not a valid GraphQL name",
                attribute.name, owner
            ));
        }
        if !seen.insert(attribute.name.as_str()) {
            return Err(format!(
                "Attribute '{}' is declared twice on '{}'",
                attribute.name, owner
            ));
        }
    }
    Ok(())
}
