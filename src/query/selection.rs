use crate::error::{RelqlError, Result};
use async_graphql::{SelectionField, Value};
use indexmap::IndexMap;

/// One node of a client's field-selection tree, arguments already bound
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: IndexMap<String, Value>,
    pub children: Vec<Selection>,
}

impl Selection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Copy a field of the executing query, with variables substituted
    pub fn from_field(field: SelectionField<'_>) -> Result<Self> {
        let arguments = field
            .arguments()
            .map_err(|e| RelqlError::Query(format!("Invalid arguments on '{}': {}", field.name(), e.message)))?
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        let children = field
            .selection_set()
            .map(Selection::from_field)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: field.name().to_string(),
            alias: field.alias().map(str::to_string),
            arguments,
            children,
        })
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn with_child(mut self, child: Selection) -> Self {
        self.children.push(child);
        self
    }

    /// Add leaf children by name
    pub fn with_fields(mut self, names: &[&str]) -> Self {
        self.children.extend(names.iter().map(|name| Selection::new(*name)));
        self
    }

    /// Key under which the field appears in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn child(&self, name: &str) -> Option<&Selection> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Argument value, treating an explicit null as absent
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|value| !matches!(value, Value::Null))
    }

    /// Introspection fields such as `__typename`
    pub fn is_meta(&self) -> bool {
        self.name.starts_with("__")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let selection = Selection::new("Author")
            .with_argument("name", Value::List(vec![Value::from("Ann")]))
            .with_argument("id", Value::Null)
            .with_fields(&["id", "__typename"])
            .with_child(Selection::new("books").with_alias("works"));

        assert_eq!(selection.response_key(), "Author");
        assert!(selection.argument("name").is_some());
        assert!(selection.argument("id").is_none());
        assert_eq!(selection.child("books").unwrap().response_key(), "works");
        assert!(selection.child("__typename").unwrap().is_meta());
    }
}
