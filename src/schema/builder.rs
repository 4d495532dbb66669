/// GraphQL schema builder
///
/// `SchemaBuilder` walks the metamodel once, deriving an immutable `TypeGraph`,
/// then lowers that graph into an async-graphql dynamic schema with resolvers
/// attached to every field.

use crate::error::{RelqlError, Result};
use crate::model::{
    AttributeKind, ElementType, EmbeddableType, EntityType, MemberRef, Metamodel, ResolvedField,
    ValueType,
};
use crate::query::{JOIN_TYPE, ORDER_BY, PAGINATION_REQUEST};
use crate::schema::cache::{TypeCache, TypeKey};
use crate::schema::graph::{
    ArgumentDef, EnumDef, FieldDef, FieldSource, GraphType, InputObjectDef, ObjectDef, TypeExpr,
    TypeGraph,
};
use crate::schema::resolver;
use crate::schema::scalars;
use crate::schema::type_mapping::{map_value_type, EnumCoercion};
use crate::session::SessionHandle;

use async_graphql::dynamic::{Enum, EnumItem, InputObject, InputValue, Object, Schema};
use std::collections::HashSet;
use std::sync::Arc;

pub const QUERY: &str = "Query";
pub const ORDER_BY_DIRECTION: &str = "OrderByDirection";
pub const JOIN_TYPE_ENUM: &str = "JoinType";
pub const PAGINATION_OBJECT: &str = "PaginationObject";
pub const TOTAL_PAGES: &str = "totalPages";
pub const TOTAL_ELEMENTS: &str = "totalElements";
pub const CONTENT: &str = "content";

/// Schema builder deriving the GraphQL schema from an entity model
pub struct SchemaBuilder {
    model: Arc<Metamodel>,
}

impl SchemaBuilder {
    pub fn new(model: Arc<Metamodel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<Metamodel> {
        &self.model
    }

    /// Derive the type graph
    ///
    /// Fails on the first attribute that has no GraphQL mapping, naming its
    /// declaring type and member.
    pub fn derive(&self) -> Result<TypeGraph> {
        let mut derivation = Derivation {
            model: &self.model,
            cache: TypeCache::new(),
        };
        derivation.fixed_types()?;
        derivation.cache.reserve(TypeKey::Fixed(QUERY), QUERY)?;

        let mut query_fields = Vec::new();
        for entity in self.model.entities().filter(|e| !e.ignored) {
            tracing::info!("Building schema for entity: {}", entity.name);

            let object = derivation.entity_type(entity)?;
            derivation.entity_input(entity)?;
            let connector = derivation.connector(entity)?;

            query_fields.push(FieldDef {
                name: entity.name.clone(),
                description: derivation.doc(MemberRef::of_type(&entity.name)),
                ty: TypeExpr::list(TypeExpr::non_null(object)),
                arguments: derivation.filter_arguments(entity)?,
                source: FieldSource::EntityList {
                    entity: entity.name.clone(),
                },
            });
            query_fields.push(FieldDef {
                name: connection_name(&entity.name),
                description: derivation.doc(MemberRef::of_type(&entity.name)),
                ty: connector,
                arguments: vec![pagination_argument()],
                source: FieldSource::Connection {
                    entity: entity.name.clone(),
                    attribute: None,
                },
            });
        }

        if query_fields.is_empty() {
            return Err(RelqlError::SchemaGeneration(
                "No entities to expose".to_string(),
            ));
        }
        check_unique(QUERY, &query_fields)?;
        derivation.cache.complete(
            TypeKey::Fixed(QUERY),
            GraphType::Object(Arc::new(ObjectDef {
                name: QUERY.to_string(),
                description: None,
                fields: query_fields,
            })),
        )?;

        let graph = TypeGraph {
            query: QUERY.to_string(),
            types: derivation.cache.into_types()?,
        };

        let dangling = graph.dangling_references();
        if !dangling.is_empty() {
            return Err(RelqlError::SchemaGeneration(format!(
                "Unresolved type references: {}",
                dangling.join(", ")
            )));
        }

        tracing::info!("Derived {} GraphQL types", graph.types.len());
        Ok(graph)
    }

    /// Build complete GraphQL schema
    ///
    /// The metamodel is attached as schema data; `session`, when given, is the
    /// default session for requests that do not bring their own scope.
    pub fn build_schema(&self, session: Option<SessionHandle>) -> Result<Schema> {
        let graph = self.derive()?;
        let mut schema_builder = Schema::build(graph.query.as_str(), None, None);

        for ty in graph.types.values() {
            schema_builder = match ty {
                GraphType::Object(def) => schema_builder.register(lower_object(def)),
                GraphType::InputObject(def) => schema_builder.register(lower_input_object(def)),
                GraphType::Enum(def) => schema_builder.register(lower_enum(def)),
                GraphType::Scalar(def) => schema_builder.register(scalars::to_dynamic(def)),
            };
        }

        schema_builder = schema_builder.data(self.model.clone());
        if let Some(session) = session {
            schema_builder = schema_builder.data(session);
        }

        schema_builder.finish().map_err(|e| {
            RelqlError::SchemaGeneration(format!("Failed to build schema: {}", e))
        })
    }
}

struct Derivation<'a> {
    model: &'a Metamodel,
    cache: TypeCache,
}

impl Derivation<'_> {
    fn doc(&self, member: MemberRef<'_>) -> Option<String> {
        self.model.documentation(member).map(str::to_string)
    }

    /// Custom scalars and the enums and inputs every schema carries
    fn fixed_types(&mut self) -> Result<()> {
        for scalar in scalars::custom_scalars() {
            let name = fixed_name(&scalar.name)?;
            self.cache
                .insert(TypeKey::Fixed(name), GraphType::Scalar(Arc::new(scalar)))?;
        }

        for (name, values) in [
            (ORDER_BY_DIRECTION, &["ASC", "DESC"][..]),
            (JOIN_TYPE_ENUM, &["INNER", "LEFT", "RIGHT"][..]),
        ] {
            self.cache.insert(
                TypeKey::Fixed(name),
                GraphType::Enum(Arc::new(EnumDef {
                    name: name.to_string(),
                    description: None,
                    values: values.iter().map(|v| v.to_string()).collect(),
                    coercion: EnumCoercion::ByName,
                })),
            )?;
        }

        self.cache.insert(
            TypeKey::Fixed(PAGINATION_OBJECT),
            GraphType::InputObject(Arc::new(InputObjectDef {
                name: PAGINATION_OBJECT.to_string(),
                description: Some("1-indexed page request".to_string()),
                fields: vec![
                    ArgumentDef::new("page", TypeExpr::named("Int")),
                    ArgumentDef::new("size", TypeExpr::named("Int")),
                ],
            })),
        )
    }

    fn value_type(&mut self, value_type: &ValueType, declaring: &str, member: &str) -> Result<TypeExpr> {
        if let ValueType::Enum(name) = value_type {
            return self.enum_type(name);
        }
        map_value_type(value_type, declaring, member)
    }

    /// Coercion of the enum node a column's type names, `None` for scalars
    fn coercion(&self, ty: &TypeExpr) -> Option<EnumCoercion> {
        match self.cache.get(&TypeKey::Enum(ty.base_name().to_string())) {
            Some(GraphType::Enum(def)) => Some(def.coercion),
            _ => None,
        }
    }

    fn enum_type(&mut self, name: &str) -> Result<TypeExpr> {
        let model = self.model;
        let key = TypeKey::Enum(name.to_string());
        if let Some(reference) = self.cache.reference(&key) {
            return Ok(reference);
        }

        let enum_type = model.enum_type(name)?;
        self.cache.insert(
            key,
            GraphType::Enum(Arc::new(EnumDef {
                name: enum_type.name.clone(),
                description: self.doc(MemberRef::of_type(&enum_type.name)),
                values: enum_type.values.clone(),
                coercion: EnumCoercion::Identity,
            })),
        )?;
        Ok(TypeExpr::named(name))
    }

    fn entity_type(&mut self, entity: &EntityType) -> Result<TypeExpr> {
        let model = self.model;
        let key = TypeKey::Entity(entity.name.clone());
        if let Some(reference) = self.cache.reference(&key) {
            return Ok(reference);
        }
        self.cache.reserve(key.clone(), &entity.name)?;

        let mut fields = Vec::new();
        for (name, resolved) in entity.fields() {
            match resolved {
                ResolvedField::Column(column) => {
                    let ty = self.value_type(&column.value_type, &column.declaring, &column.name)?;
                    fields.push(FieldDef {
                        name: name.to_string(),
                        description: self
                            .doc(MemberRef::of_member(&column.declaring, &column.name)),
                        source: FieldSource::Column {
                            coercion: self.coercion(&ty),
                        },
                        ty,
                        arguments: vec![order_by_argument()],
                    });
                }
                ResolvedField::Attribute(attribute_name) => {
                    let attribute = entity.attribute(attribute_name).ok_or_else(|| {
                        RelqlError::SchemaGeneration(format!(
                            "{} resolves field '{}' to a missing attribute",
                            entity.name, name
                        ))
                    })?;
                    let description = self.doc(MemberRef::of_member(&entity.name, &attribute.name));

                    match attribute.kind {
                        AttributeKind::ToOne | AttributeKind::ToMany => {
                            let target = model.entity(attribute.target_name())?;
                            let target_ref = self.entity_type(target)?;
                            let many = attribute.kind == AttributeKind::ToMany;

                            let mut arguments = vec![order_by_argument(), join_type_argument()];
                            arguments.extend(self.filter_arguments(target)?);
                            fields.push(FieldDef {
                                name: attribute.name.clone(),
                                description: description.clone(),
                                ty: if many { TypeExpr::list(target_ref) } else { target_ref },
                                arguments,
                                source: FieldSource::Relation { many },
                            });

                            let connector = self.connector(target)?;
                            fields.push(FieldDef {
                                name: connection_name(&attribute.name),
                                description,
                                ty: connector,
                                arguments: vec![pagination_argument()],
                                source: FieldSource::Connection {
                                    entity: target.name.clone(),
                                    attribute: Some(attribute.name.clone()),
                                },
                            });
                        }
                        AttributeKind::ElementCollection => {
                            let mut arguments = vec![order_by_argument(), join_type_argument()];
                            let (element, embeddable) = match attribute.element() {
                                Some(ElementType::Scalar(value_type)) => (
                                    self.value_type(value_type, &entity.name, &attribute.name)?,
                                    false,
                                ),
                                Some(ElementType::Embeddable(embeddable_name)) => {
                                    let embeddable = model.embeddable(embeddable_name)?;
                                    arguments.extend(self.embeddable_filter_arguments(embeddable)?);
                                    (self.embeddable_type(embeddable)?, true)
                                }
                                None => return Err(unmappable(&entity.name, &attribute.name)),
                            };
                            fields.push(FieldDef {
                                name: attribute.name.clone(),
                                description,
                                ty: TypeExpr::list(element),
                                arguments,
                                source: FieldSource::ElementCollection { embeddable },
                            });
                        }
                        AttributeKind::Scalar | AttributeKind::Embedded => {
                            return Err(unmappable(&entity.name, &attribute.name))
                        }
                    }
                }
            }
        }

        check_unique(&entity.name, &fields)?;
        self.cache.complete(
            key,
            GraphType::Object(Arc::new(ObjectDef {
                name: entity.name.clone(),
                description: self.doc(MemberRef::of_type(&entity.name)),
                fields,
            })),
        )?;
        Ok(TypeExpr::named(entity.name.as_str()))
    }

    /// `<Entity>Input`, mirroring the entity's fields
    fn entity_input(&mut self, entity: &EntityType) -> Result<TypeExpr> {
        let model = self.model;
        let key = TypeKey::EntityInput(entity.name.clone());
        if let Some(reference) = self.cache.reference(&key) {
            return Ok(reference);
        }
        let name = format!("{}Input", entity.name);
        self.cache.reserve(key.clone(), &name)?;

        let mut fields = Vec::new();
        for (field_name, resolved) in entity.fields() {
            let ty = match resolved {
                ResolvedField::Column(column) => {
                    self.value_type(&column.value_type, &column.declaring, &column.name)?
                }
                ResolvedField::Attribute(attribute_name) => {
                    let Some(attribute) = entity.attribute(attribute_name) else {
                        continue;
                    };
                    match (attribute.kind, attribute.element()) {
                        (AttributeKind::ToOne, _) => {
                            self.entity_input(model.entity(attribute.target_name())?)?
                        }
                        (AttributeKind::ToMany, _) => TypeExpr::list(
                            self.entity_input(model.entity(attribute.target_name())?)?,
                        ),
                        (_, Some(ElementType::Scalar(value_type))) => TypeExpr::list(
                            self.value_type(value_type, &entity.name, &attribute.name)?,
                        ),
                        (_, Some(ElementType::Embeddable(embeddable))) => TypeExpr::list(
                            self.embeddable_input(model.embeddable(embeddable)?)?,
                        ),
                        _ => return Err(unmappable(&entity.name, &attribute.name)),
                    }
                }
            };
            fields.push(ArgumentDef::new(field_name, ty));
        }

        self.cache.complete(
            key,
            GraphType::InputObject(Arc::new(InputObjectDef {
                name: name.clone(),
                description: self.doc(MemberRef::of_type(&entity.name)),
                fields,
            })),
        )?;
        Ok(TypeExpr::named(name))
    }

    fn embeddable_type(&mut self, embeddable: &EmbeddableType) -> Result<TypeExpr> {
        let key = TypeKey::Embeddable(embeddable.name.clone());
        if let Some(reference) = self.cache.reference(&key) {
            return Ok(reference);
        }
        self.cache.reserve(key.clone(), &embeddable.name)?;

        let mut fields = Vec::new();
        for column in embeddable.columns() {
            fields.push(FieldDef {
                name: column.name.clone(),
                description: self.doc(MemberRef::of_member(&column.declaring, &column.name)),
                ty: self.value_type(&column.value_type, &column.declaring, &column.name)?,
                arguments: Vec::new(),
                source: FieldSource::EmbeddableField,
            });
        }

        check_unique(&embeddable.name, &fields)?;
        self.cache.complete(
            key,
            GraphType::Object(Arc::new(ObjectDef {
                name: embeddable.name.clone(),
                description: self.doc(MemberRef::of_type(&embeddable.name)),
                fields,
            })),
        )?;
        Ok(TypeExpr::named(embeddable.name.as_str()))
    }

    fn embeddable_input(&mut self, embeddable: &EmbeddableType) -> Result<TypeExpr> {
        let key = TypeKey::EmbeddableInput(embeddable.name.clone());
        if let Some(reference) = self.cache.reference(&key) {
            return Ok(reference);
        }
        let name = format!("{}Input", embeddable.name);
        self.cache.reserve(key.clone(), &name)?;

        let mut fields = Vec::new();
        for column in embeddable.columns() {
            fields.push(ArgumentDef::new(
                column.name.as_str(),
                self.value_type(&column.value_type, &column.declaring, &column.name)?,
            ));
        }

        self.cache.complete(
            key,
            GraphType::InputObject(Arc::new(InputObjectDef {
                name: name.clone(),
                description: self.doc(MemberRef::of_type(&embeddable.name)),
                fields,
            })),
        )?;
        Ok(TypeExpr::named(name))
    }

    /// `<Entity>Connection`, built once per entity
    fn connector(&mut self, entity: &EntityType) -> Result<TypeExpr> {
        let key = TypeKey::Connector(entity.name.clone());
        if let Some(reference) = self.cache.reference(&key) {
            return Ok(reference);
        }
        let name = connection_name(&entity.name);
        self.cache.reserve(key.clone(), &name)?;

        let object = self.entity_type(entity)?;
        let fields = vec![
            FieldDef {
                name: TOTAL_PAGES.to_string(),
                description: None,
                ty: TypeExpr::named("Long"),
                arguments: Vec::new(),
                source: FieldSource::TotalPages,
            },
            FieldDef {
                name: TOTAL_ELEMENTS.to_string(),
                description: None,
                ty: TypeExpr::named("Long"),
                arguments: Vec::new(),
                source: FieldSource::TotalElements,
            },
            FieldDef {
                name: CONTENT.to_string(),
                description: None,
                ty: TypeExpr::list(object),
                arguments: self.filter_arguments(entity)?,
                source: FieldSource::Content {
                    entity: entity.name.clone(),
                },
            },
        ];

        self.cache.complete(
            key,
            GraphType::Object(Arc::new(ObjectDef {
                name: name.clone(),
                description: Some(format!("One page of {}", entity.name)),
                fields,
            })),
        )?;
        Ok(TypeExpr::named(name))
    }

    /// List-typed filter argument per column and element collection
    fn filter_arguments(&mut self, entity: &EntityType) -> Result<Vec<ArgumentDef>> {
        let model = self.model;
        let mut arguments = Vec::new();
        for (name, resolved) in entity.fields() {
            let element = match resolved {
                ResolvedField::Column(column) => {
                    self.value_type(&column.value_type, &column.declaring, &column.name)?
                }
                ResolvedField::Attribute(attribute_name) => {
                    let Some(attribute) = entity
                        .attribute(attribute_name)
                        .filter(|a| a.kind == AttributeKind::ElementCollection)
                    else {
                        continue;
                    };
                    match attribute.element() {
                        Some(ElementType::Scalar(value_type)) => {
                            self.value_type(value_type, &entity.name, &attribute.name)?
                        }
                        Some(ElementType::Embeddable(embeddable)) => {
                            self.embeddable_input(model.embeddable(embeddable)?)?
                        }
                        None => return Err(unmappable(&entity.name, &attribute.name)),
                    }
                }
            };
            arguments.push(ArgumentDef::new(name, TypeExpr::list(element)));
        }
        Ok(arguments)
    }

    fn embeddable_filter_arguments(&mut self, embeddable: &EmbeddableType) -> Result<Vec<ArgumentDef>> {
        let mut arguments = Vec::new();
        for column in embeddable.columns() {
            let element = self.value_type(&column.value_type, &column.declaring, &column.name)?;
            arguments.push(ArgumentDef::new(column.name.as_str(), TypeExpr::list(element)));
        }
        Ok(arguments)
    }
}

fn connection_name(name: &str) -> String {
    format!("{}Connection", name)
}

fn order_by_argument() -> ArgumentDef {
    ArgumentDef::new(ORDER_BY, TypeExpr::named(ORDER_BY_DIRECTION))
}

fn join_type_argument() -> ArgumentDef {
    ArgumentDef::new(JOIN_TYPE, TypeExpr::named(JOIN_TYPE_ENUM))
}

fn pagination_argument() -> ArgumentDef {
    ArgumentDef::new(PAGINATION_REQUEST, TypeExpr::named(PAGINATION_OBJECT))
}

fn unmappable(declaring: &str, member: &str) -> RelqlError {
    RelqlError::UnmappableAttribute {
        declaring: declaring.to_string(),
        member: member.to_string(),
    }
}

fn fixed_name(name: &str) -> Result<&'static str> {
    ["Long", "Short", "BigDecimal", "UUID", "Date", "DateTime"]
        .into_iter()
        .find(|fixed| *fixed == name)
        .ok_or_else(|| RelqlError::SchemaGeneration(format!("Unknown custom scalar '{}'", name)))
}

fn check_unique(owner: &str, fields: &[FieldDef]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(RelqlError::SchemaGeneration(format!(
                "Field '{}' is generated twice on {}",
                field.name, owner
            )));
        }
    }
    Ok(())
}

fn lower_object(def: &ObjectDef) -> Object {
    let mut object = Object::new(def.name.as_str());
    if let Some(description) = &def.description {
        object = object.description(description.as_str());
    }
    for field in &def.fields {
        object = object.field(resolver::field(field));
    }
    object
}

fn lower_input_object(def: &InputObjectDef) -> InputObject {
    let mut input = InputObject::new(def.name.as_str());
    if let Some(description) = &def.description {
        input = input.description(description.as_str());
    }
    for field in &def.fields {
        input = input.field(lower_argument(field));
    }
    input
}

pub(crate) fn lower_argument(def: &ArgumentDef) -> InputValue {
    let mut value = InputValue::new(def.name.as_str(), def.ty.to_type_ref());
    if let Some(description) = &def.description {
        value = value.description(description.as_str());
    }
    value
}

fn lower_enum(def: &EnumDef) -> Enum {
    let mut graphql_enum = Enum::new(def.name.as_str());
    if let Some(description) = &def.description {
        graphql_enum = graphql_enum.description(description.as_str());
    }
    for value in &def.values {
        graphql_enum = graphql_enum.item(EnumItem::new(value.as_str()));
    }
    graphql_enum
}
