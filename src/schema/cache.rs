/// Type cache for the schema deriver
///
/// One canonical node per metadata identity. A type is reserved under its
/// name before its children are visited, so a child that refers back to it
/// gets a `Reference` instead of recursing forever.

use super::graph::{GraphType, TypeExpr};
use crate::error::{RelqlError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Metadata identity of a derived type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Entity(String),
    EntityInput(String),
    Embeddable(String),
    EmbeddableInput(String),
    Enum(String),
    Connector(String),
    /// Types that exist regardless of the model
    Fixed(&'static str),
}

#[derive(Debug)]
enum Slot {
    Reserved(String),
    Built(GraphType),
}

#[derive(Debug, Default)]
pub struct TypeCache {
    slots: IndexMap<TypeKey, Slot>,
    names: HashMap<String, TypeKey>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference to a type that is built or under construction
    pub fn reference(&self, key: &TypeKey) -> Option<TypeExpr> {
        self.slots.get(key).map(|slot| match slot {
            Slot::Reserved(name) => TypeExpr::named(name.as_str()),
            Slot::Built(ty) => TypeExpr::named(ty.name()),
        })
    }

    pub fn get(&self, key: &TypeKey) -> Option<&GraphType> {
        match self.slots.get(key) {
            Some(Slot::Built(ty)) => Some(ty),
            _ => None,
        }
    }

    /// Claim `name` for `key`; fails when another type already owns the name
    pub fn reserve(&mut self, key: TypeKey, name: &str) -> Result<()> {
        if let Some(owner) = self.names.get(name) {
            if *owner != key {
                return Err(RelqlError::SchemaGeneration(format!(
                    "Type name '{}' is generated for both {:?} and {:?}",
                    name, owner, key
                )));
            }
            return Ok(());
        }
        self.names.insert(name.to_string(), key.clone());
        self.slots.insert(key, Slot::Reserved(name.to_string()));
        Ok(())
    }

    /// Store the finished node of a reserved type
    pub fn complete(&mut self, key: TypeKey, ty: GraphType) -> Result<()> {
        match self.slots.get_mut(&key) {
            Some(slot @ Slot::Reserved(_)) => {
                *slot = Slot::Built(ty);
                Ok(())
            }
            Some(Slot::Built(_)) => Err(RelqlError::SchemaGeneration(format!(
                "Type {:?} is built twice",
                key
            ))),
            None => Err(RelqlError::SchemaGeneration(format!(
                "Type {:?} was not reserved before being built",
                key
            ))),
        }
    }

    /// Reserve and complete in one step, for types without children
    pub fn insert(&mut self, key: TypeKey, ty: GraphType) -> Result<()> {
        let name = ty.name().to_string();
        self.reserve(key.clone(), &name)?;
        self.complete(key, ty)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every node by name, in creation order
    pub fn into_types(self) -> Result<IndexMap<String, GraphType>> {
        let mut types = IndexMap::with_capacity(self.slots.len());
        for (key, slot) in self.slots {
            match slot {
                Slot::Built(ty) => {
                    types.insert(ty.name().to_string(), ty);
                }
                Slot::Reserved(name) => {
                    return Err(RelqlError::SchemaGeneration(format!(
                        "Type '{}' ({:?}) was never completed",
                        name, key
                    )))
                }
            }
        }
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::graph::ScalarDef;
    use std::sync::Arc;

    fn scalar(name: &str) -> GraphType {
        GraphType::Scalar(Arc::new(ScalarDef {
            name: name.to_string(),
            description: None,
        }))
    }

    #[test]
    fn test_reserved_type_is_referenced_by_name() {
        let mut cache = TypeCache::new();
        let key = TypeKey::Entity("Author".into());
        cache.reserve(key.clone(), "Author").unwrap();

        assert_eq!(cache.reference(&key), Some(TypeExpr::named("Author")));
        assert!(cache.get(&key).is_none());
        assert!(cache.into_types().is_err());
    }

    #[test]
    fn test_name_collision_between_keys() {
        let mut cache = TypeCache::new();
        cache
            .reserve(TypeKey::Connector("Author".into()), "AuthorConnection")
            .unwrap();
        let err = cache
            .reserve(TypeKey::Entity("AuthorConnection".into()), "AuthorConnection")
            .unwrap_err();
        assert!(err.to_string().contains("AuthorConnection"));
    }

    #[test]
    fn test_completed_types_keep_creation_order() {
        let mut cache = TypeCache::new();
        cache.insert(TypeKey::Fixed("Long"), scalar("Long")).unwrap();
        cache.insert(TypeKey::Fixed("Date"), scalar("Date")).unwrap();
        assert!(cache.complete(TypeKey::Fixed("Long"), scalar("Long")).is_err());

        let types = cache.into_types().unwrap();
        assert_eq!(types.keys().collect::<Vec<_>>(), vec!["Long", "Date"]);
    }
}
