/// Relational entity metamodel
///
/// The metamodel is the metadata provider the schema deriver and the query compiler
/// work against: entity types, embeddables, enums, attribute kinds, relationship
/// ownership and documentation strings. It is built once from the configuration
/// and is read-only afterwards.

mod types;

pub use types::{
    Attribute, AttributeKind, CollectionTable, ColumnField, ElementType, EmbeddableType,
    EntityType, EnumType, ResolvedField, JoinTable, Mapping, ValueType,
};

use crate::config::{
    AttributeConfig, AttributeKindConfig, Config, EmbeddableConfig, EntityConfig,
};
use crate::error::{RelqlError, Result};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Identifies a documented member: a type, or one attribute of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub declaring: &'a str,
    pub member: Option<&'a str>,
}

impl<'a> MemberRef<'a> {
    pub fn of_type(declaring: &'a str) -> Self {
        Self {
            declaring,
            member: None,
        }
    }

    pub fn of_member(declaring: &'a str, member: &'a str) -> Self {
        Self {
            declaring,
            member: Some(member),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Metamodel {
    entities: IndexMap<String, EntityType>,
    embeddables: IndexMap<String, EmbeddableType>,
    enums: IndexMap<String, EnumType>,
}

impl Metamodel {
    /// Build and validate the metamodel from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut model = Metamodel::default();

        for enum_config in &config.enums {
            let enum_type = EnumType {
                name: enum_config.name.clone(),
                values: enum_config.values.clone(),
                storage: enum_config.storage,
                description: enum_config.description.clone(),
            };
            if model.enums.insert(enum_type.name.clone(), enum_type).is_some() {
                return Err(duplicate_type(&enum_config.name));
            }
        }

        let entity_names: HashSet<&str> = config.entities.iter().map(|e| e.name.as_str()).collect();
        let embeddable_names: HashSet<&str> =
            config.embeddables.iter().map(|e| e.name.as_str()).collect();
        let ignored_entities: HashSet<&str> = config
            .entities
            .iter()
            .filter(|e| e.ignore)
            .map(|e| e.name.as_str())
            .collect();
        let names = TypeNames {
            entities: &entity_names,
            embeddables: &embeddable_names,
            ignored: &ignored_entities,
        };

        for embeddable in &config.embeddables {
            if model.enums.contains_key(&embeddable.name) {
                return Err(duplicate_type(&embeddable.name));
            }
            let built = model.embeddable_from_config(embeddable, &names)?;
            if model.embeddables.insert(built.name.clone(), built).is_some() {
                return Err(duplicate_type(&embeddable.name));
            }
        }

        for entity in &config.entities {
            if model.enums.contains_key(&entity.name) || model.embeddables.contains_key(&entity.name) {
                return Err(duplicate_type(&entity.name));
            }
            let built = model.entity_from_config(entity, &names)?;
            if model.entities.insert(built.name.clone(), built).is_some() {
                return Err(duplicate_type(&entity.name));
            }
        }

        model.resolve_default_join_columns();
        model.check_mapped_by()?;
        model.flatten_fields()?;

        tracing::debug!(
            "Metamodel ready: {} entities, {} embeddables, {} enums",
            model.entities.len(),
            model.embeddables.len(),
            model.enums.len()
        );

        Ok(model)
    }

    /// All entity types in declaration order, including ignored ones
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.entities
            .get(name)
            .ok_or_else(|| RelqlError::Model(format!("Unknown entity '{}'", name)))
    }

    pub fn embeddable(&self, name: &str) -> Result<&EmbeddableType> {
        self.embeddables
            .get(name)
            .ok_or_else(|| RelqlError::Model(format!("Unknown embeddable '{}'", name)))
    }

    pub fn enum_type(&self, name: &str) -> Result<&EnumType> {
        self.enums
            .get(name)
            .ok_or_else(|| RelqlError::Model(format!("Unknown enum '{}'", name)))
    }

    /// Documentation string of a type or of one of its members
    pub fn documentation(&self, member: MemberRef<'_>) -> Option<&str> {
        let attributes = if let Some(entity) = self.entities.get(member.declaring) {
            if member.member.is_none() {
                return entity.description.as_deref();
            }
            &entity.attributes
        } else if let Some(embeddable) = self.embeddables.get(member.declaring) {
            if member.member.is_none() {
                return embeddable.description.as_deref();
            }
            &embeddable.attributes
        } else {
            return self
                .enums
                .get(member.declaring)
                .filter(|_| member.member.is_none())
                .and_then(|e| e.description.as_deref());
        };

        member
            .member
            .and_then(|name| attributes.get(name))
            .and_then(|attribute| attribute.description.as_deref())
    }

    fn embeddable_from_config(
        &self,
        config: &EmbeddableConfig,
        names: &TypeNames<'_>,
    ) -> Result<EmbeddableType> {
        let mut attributes = IndexMap::new();
        for attribute in &config.attributes {
            if !matches!(
                attribute.kind,
                AttributeKindConfig::Scalar | AttributeKindConfig::Embedded
            ) {
                return Err(RelqlError::Model(format!(
                    "Embeddable '{}' attribute '{}': only scalar and embedded attributes are supported",
                    config.name, attribute.name
                )));
            }
            let built = self.attribute_from_config(&config.name, attribute, names)?;
            attributes.insert(built.name.clone(), built);
        }

        Ok(EmbeddableType {
            name: config.name.clone(),
            description: config.description.clone(),
            attributes,
            columns: Vec::new(),
        })
    }

    fn entity_from_config(&self, config: &EntityConfig, names: &TypeNames<'_>) -> Result<EntityType> {
        let mut attributes = IndexMap::new();
        for attribute in &config.attributes {
            let built = self.attribute_from_config(&config.name, attribute, names)?;
            attributes.insert(built.name.clone(), built);
        }

        let primary_key = attributes.get(&config.primary_key).ok_or_else(|| {
            RelqlError::Model(format!(
                "Entity '{}' has no primary key attribute '{}'",
                config.name, config.primary_key
            ))
        })?;
        if primary_key.kind != AttributeKind::Scalar || primary_key.ignored {
            return Err(RelqlError::Model(format!(
                "Primary key '{}' of entity '{}' must be a visible scalar attribute",
                config.primary_key, config.name
            )));
        }

        Ok(EntityType {
            name: config.name.clone(),
            table: config.table.clone(),
            primary_key: config.primary_key.clone(),
            description: config.description.clone(),
            ignored: config.ignore,
            attributes,
            fields: IndexMap::new(),
        })
    }

    fn attribute_from_config(
        &self,
        declaring: &str,
        config: &AttributeConfig,
        names: &TypeNames<'_>,
    ) -> Result<Attribute> {
        let invalid = |reason: &str| {
            RelqlError::Model(format!(
                "Attribute '{}' of '{}': {}",
                config.name, declaring, reason
            ))
        };
        let unmappable = || RelqlError::UnmappableAttribute {
            declaring: declaring.to_string(),
            member: config.name.clone(),
        };

        let mut ignored = config.ignore;

        let (kind, value_type, target, mapping) = match config.kind {
            AttributeKindConfig::Scalar => {
                let type_name = config.value_type.as_deref().ok_or_else(unmappable)?;
                let column = config.column.clone().unwrap_or_else(|| config.name.clone());
                (
                    AttributeKind::Scalar,
                    Some(self.value_type(type_name)),
                    None,
                    Mapping::Column(column),
                )
            }
            AttributeKindConfig::Embedded => {
                let target = config.target.clone().ok_or_else(unmappable)?;
                if !names.embeddables.contains(target.as_str()) {
                    return Err(invalid(&format!("'{}' is not an embeddable", target)));
                }
                (AttributeKind::Embedded, None, Some(target), Mapping::Embedded)
            }
            AttributeKindConfig::ToOne | AttributeKindConfig::ToMany => {
                let target = config.target.clone().ok_or_else(unmappable)?;
                if !names.entities.contains(target.as_str()) {
                    return Err(invalid(&format!("'{}' is not an entity", target)));
                }
                if names.ignored.contains(target.as_str()) {
                    ignored = true;
                }

                let mapping = match (
                    &config.join_column,
                    &config.mapped_by,
                    &config.join_table,
                    config.kind,
                ) {
                    (Some(column), None, None, AttributeKindConfig::ToOne) => {
                        Mapping::JoinColumn(column.clone())
                    }
                    (None, Some(mapped_by), None, _) => Mapping::MappedBy(mapped_by.clone()),
                    (None, None, Some(join_table), AttributeKindConfig::ToMany) => {
                        Mapping::JoinTable(JoinTable {
                            table: join_table.table.clone(),
                            join_column: join_table.join_column.clone(),
                            inverse_join_column: join_table.inverse_join_column.clone(),
                        })
                    }
                    // Resolved to "<name>_<target pk column>" once every entity is known
                    (None, None, None, AttributeKindConfig::ToOne) => Mapping::JoinColumn(String::new()),
                    (None, None, None, _) => {
                        return Err(invalid("to_many relationships need 'mapped_by' or 'join_table'"))
                    }
                    _ => {
                        return Err(invalid(
                            "declare exactly one of 'join_column' (to_one), 'mapped_by' or 'join_table' (to_many)",
                        ))
                    }
                };

                let kind = if config.kind == AttributeKindConfig::ToOne {
                    AttributeKind::ToOne
                } else {
                    AttributeKind::ToMany
                };
                (kind, None, Some(target), mapping)
            }
            AttributeKindConfig::ElementCollection => {
                let table = config
                    .collection_table
                    .as_ref()
                    .ok_or_else(|| invalid("element collections need a 'collection_table'"))?;

                let (value_type, target, column) = match (&config.value_type, &config.target) {
                    (Some(type_name), None) => (
                        Some(self.value_type(type_name)),
                        None,
                        Some(table.column.clone().unwrap_or_else(|| config.name.clone())),
                    ),
                    (None, Some(target)) if names.embeddables.contains(target.as_str()) => {
                        (None, Some(target.clone()), None)
                    }
                    (None, Some(target)) => {
                        return Err(invalid(&format!("'{}' is not an embeddable", target)))
                    }
                    _ => return Err(unmappable()),
                };

                (
                    AttributeKind::ElementCollection,
                    value_type,
                    target,
                    Mapping::CollectionTable(CollectionTable {
                        table: table.table.clone(),
                        join_column: table.join_column.clone(),
                        column,
                    }),
                )
            }
        };

        Ok(Attribute {
            name: config.name.clone(),
            declaring: declaring.to_string(),
            kind,
            value_type,
            target,
            mapping,
            description: config.description.clone(),
            ignored,
        })
    }

    fn value_type(&self, name: &str) -> ValueType {
        match ValueType::builtin(name) {
            Some(value_type) => value_type,
            None if self.enums.contains_key(name) => ValueType::Enum(name.to_string()),
            None => ValueType::Other(name.to_string()),
        }
    }

    fn resolve_default_join_columns(&mut self) {
        let pk_columns: IndexMap<String, String> = self
            .entities
            .values()
            .map(|e| (e.name.clone(), e.primary_key_column().to_string()))
            .collect();

        for entity in self.entities.values_mut() {
            for attribute in entity.attributes.values_mut() {
                if let Mapping::JoinColumn(column) = &mut attribute.mapping {
                    if column.is_empty() {
                        let target = attribute.target.as_deref().unwrap_or_default();
                        let pk = pk_columns.get(target).map(String::as_str).unwrap_or("id");
                        *column = format!("{}_{}", attribute.name, pk);
                    }
                }
            }
        }
    }

    fn check_mapped_by(&self) -> Result<()> {
        for entity in self.entities.values() {
            for attribute in entity.attributes.values() {
                let Mapping::MappedBy(owner_name) = &attribute.mapping else {
                    continue;
                };
                let target = self.entity(attribute.target.as_deref().unwrap_or_default())?;
                let owner = target.attributes.get(owner_name).ok_or_else(|| {
                    RelqlError::Model(format!(
                        "Attribute '{}' of '{}' is mapped by '{}', which '{}' does not declare",
                        attribute.name, entity.name, owner_name, target.name
                    ))
                })?;

                let points_back = owner.target.as_deref() == Some(entity.name.as_str());
                let compatible = match (attribute.kind, owner.kind, &owner.mapping) {
                    (AttributeKind::ToMany, AttributeKind::ToOne, Mapping::JoinColumn(_)) => true,
                    (AttributeKind::ToMany, AttributeKind::ToMany, Mapping::JoinTable(_)) => true,
                    (AttributeKind::ToOne, AttributeKind::ToOne, Mapping::JoinColumn(_)) => true,
                    _ => false,
                };
                if !points_back || !compatible {
                    return Err(RelqlError::Model(format!(
                        "Attribute '{}' of '{}' is mapped by '{}.{}', which is not an owning relationship back to '{}'",
                        attribute.name, entity.name, target.name, owner_name, entity.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Precompute the graph field name to binding maps, flattening embedded attributes
    fn flatten_fields(&mut self) -> Result<()> {
        let mut flattened = IndexMap::new();
        for embeddable in self.embeddables.values() {
            let mut stack = vec![embeddable.name.clone()];
            let mut columns = Vec::new();
            self.flatten_into(&embeddable.attributes, &mut Vec::new(), &mut stack, &mut columns)?;
            flattened.insert(embeddable.name.clone(), columns);
        }
        for (name, columns) in flattened {
            if let Some(embeddable) = self.embeddables.get_mut(&name) {
                embeddable.columns = columns;
            }
        }

        let mut bindings = IndexMap::new();
        for entity in self.entities.values() {
            let mut fields: IndexMap<String, ResolvedField> = IndexMap::new();
            for attribute in entity.attributes.values().filter(|a| !a.ignored) {
                let added = match attribute.kind {
                    AttributeKind::Scalar | AttributeKind::Embedded => {
                        let mut columns = Vec::new();
                        self.flatten_into(
                            std::slice::from_ref(attribute).iter().map(|a| (&a.name, a)),
                            &mut Vec::new(),
                            &mut vec![entity.name.clone()],
                            &mut columns,
                        )?;
                        columns
                            .into_iter()
                            .map(|c| (c.name.clone(), ResolvedField::Column(c)))
                            .collect::<Vec<_>>()
                    }
                    _ => vec![(
                        attribute.name.clone(),
                        ResolvedField::Attribute(attribute.name.clone()),
                    )],
                };
                for (name, binding) in added {
                    if fields.insert(name.clone(), binding).is_some() {
                        return Err(RelqlError::Model(format!(
                            "Field '{}' of '{}' is declared twice after flattening embedded attributes",
                            name, entity.name
                        )));
                    }
                }
            }
            bindings.insert(entity.name.clone(), fields);
        }
        for (name, fields) in bindings {
            if let Some(entity) = self.entities.get_mut(&name) {
                entity.fields = fields;
            }
        }

        Ok(())
    }

    fn flatten_into<'a>(
        &self,
        attributes: impl IntoIterator<Item = (&'a String, &'a Attribute)>,
        path: &mut Vec<String>,
        stack: &mut Vec<String>,
        out: &mut Vec<ColumnField>,
    ) -> Result<()> {
        for (_, attribute) in attributes {
            if attribute.ignored {
                continue;
            }
            match (&attribute.mapping, &attribute.value_type) {
                (Mapping::Column(column), Some(value_type)) => {
                    let mut attribute_path = path.clone();
                    attribute_path.push(attribute.name.clone());
                    out.push(ColumnField {
                        name: attribute.name.clone(),
                        declaring: attribute.declaring.clone(),
                        column: column.clone(),
                        value_type: value_type.clone(),
                        path: attribute_path,
                    });
                }
                (Mapping::Embedded, _) => {
                    let target = attribute.target.as_deref().unwrap_or_default();
                    if stack.iter().any(|name| name == target) {
                        return Err(RelqlError::Model(format!(
                            "Embeddable '{}' embeds itself through '{}.{}'",
                            target, attribute.declaring, attribute.name
                        )));
                    }
                    let embeddable = self.embeddable(target)?;
                    path.push(attribute.name.clone());
                    stack.push(target.to_string());
                    self.flatten_into(&embeddable.attributes, path, stack, out)?;
                    stack.pop();
                    path.pop();
                }
                _ => {}
            }
        }
        Ok(())
    }
}

struct TypeNames<'a> {
    entities: &'a HashSet<&'a str>,
    embeddables: &'a HashSet<&'a str>,
    ignored: &'a HashSet<&'a str>,
}

fn duplicate_type(name: &str) -> RelqlError {
    RelqlError::Model(format!("Type name '{}' is declared more than once", name))
}
