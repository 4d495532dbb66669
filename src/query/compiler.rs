/// Compiling a selection tree into a relational query
///
/// The compiler walks one selection level and inlines every joinable child
/// level into the same `SelectPlan`: to-one and to-many relationships and
/// element collections become joins whose own filter arguments land in their
/// ON clause, `orderBy` arguments append ORDER BY terms in selection order, and
/// any row-multiplying join makes the query DISTINCT. `...Connection` fields are
/// skipped here; each one opens a fresh query bounded by its own pagination
/// envelope when it is resolved.

use super::hydrate::{ColumnShape, RelationContent, RelationShape, RowShape};
use super::pagination::{PaginationEnvelope, ParentLink};
use super::parent::parent_predicate;
use super::plan::{ColumnRef, Direction, Join, JoinKind, Predicate, SelectPlan};
use super::selection::Selection;
use super::values::{list_elements, to_sql};
use crate::error::{RelqlError, Result};
use crate::model::{
    Attribute, AttributeKind, ColumnField, ElementType, EntityType, Mapping, Metamodel, ResolvedField,
};
use crate::session::IdentifierLookup;
use async_graphql::Value;

pub const ORDER_BY: &str = "orderBy";
pub const JOIN_TYPE: &str = "joinType";
pub const PAGINATION_REQUEST: &str = "paginationRequest";

const ROOT_ALIAS: &str = "t0";

/// Rows of a page to select
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: Option<u64>,
    pub offset: u64,
}

/// Output of one compilation
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Data query
    pub plan: SelectPlan,
    /// Key window selecting the page's root keys when joins multiply rows
    pub window: Option<SelectPlan>,
    /// `COUNT(DISTINCT <root key>)` over the same joins and predicates
    pub count: SelectPlan,
    pub root_key: ColumnRef,
    pub shape: RowShape,
}

pub struct QueryCompiler<'a> {
    model: &'a Metamodel,
    identifiers: Option<&'a dyn IdentifierLookup>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(model: &'a Metamodel) -> Self {
        Self {
            model,
            identifiers: None,
        }
    }

    /// Use the session's identifier-only reads for to-one parent keys
    pub fn with_identifiers(mut self, identifiers: Option<&'a dyn IdentifierLookup>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Compile an unpaginated root selection
    pub fn compile(&self, selection: &Selection, entity: &str) -> Result<CompiledQuery> {
        self.compile_within(selection, entity, None, PageWindow::default())
    }

    /// Compile the `content` selection of a connection page
    pub fn compile_page(
        &self,
        selection: &Selection,
        envelope: &PaginationEnvelope,
    ) -> Result<CompiledQuery> {
        let page = PageWindow {
            limit: envelope.limit(),
            offset: envelope.offset(),
        };
        self.compile_within(selection, &envelope.entity, envelope.parent.as_ref(), page)
    }

    pub fn compile_within(
        &self,
        selection: &Selection,
        entity: &str,
        parent: Option<&ParentLink>,
        page: PageWindow,
    ) -> Result<CompiledQuery> {
        let entity = self.model.entity(entity)?;
        if entity.ignored {
            return Err(RelqlError::Query(format!("{} is not queryable", entity.name)));
        }

        let mut compilation = Compilation {
            model: self.model,
            plan: SelectPlan::new(&entity.table, ROOT_ALIAS),
            next_alias: 1,
            level_keys: Vec::new(),
            single_valued: vec![ROOT_ALIAS.to_string()],
            multiplied: false,
        };

        let shape = compilation.level(entity, ROOT_ALIAS, selection)?;
        let filters = compilation.filters(entity, ROOT_ALIAS, selection)?;
        compilation.plan.filters.extend(filters);

        if let Some(link) = parent {
            if let Some(predicate) =
                parent_predicate(self.model, self.identifiers, entity, ROOT_ALIAS, link)?
            {
                compilation.plan.filters.push(predicate);
            }
        }

        for key in std::mem::take(&mut compilation.level_keys) {
            compilation.plan.order(key, Direction::Asc);
        }

        let root_key = ColumnRef::new(ROOT_ALIAS, entity.primary_key_column());
        let mut plan = compilation.plan;
        plan.distinct = compilation.multiplied;
        let count = plan.count_distinct(root_key.clone());

        let window = match page.limit {
            Some(limit) if plan.distinct => Some(key_window(
                &plan,
                &root_key,
                &compilation.single_valued,
                limit,
                page.offset,
            )),
            Some(limit) => {
                plan.limit = Some(limit);
                plan.offset = (page.offset > 0).then_some(page.offset);
                None
            }
            None => None,
        };

        tracing::debug!("Compiled {}: {}", entity.name, plan);

        Ok(CompiledQuery {
            plan,
            window,
            count,
            root_key,
            shape,
        })
    }
}

/// Page over distinct root keys, ordered by every term with one value per root row
fn key_window(
    plan: &SelectPlan,
    root_key: &ColumnRef,
    single_valued: &[String],
    limit: u64,
    offset: u64,
) -> SelectPlan {
    let mut window = plan.clone();
    window.projection.clear();
    window.order_by.clear();
    window.project(root_key.clone());
    for term in plan
        .order_by
        .iter()
        .filter(|t| single_valued.contains(&t.column.alias))
    {
        window.order(term.column.clone(), term.direction);
    }
    window.distinct = true;
    window.limit = Some(limit);
    window.offset = (offset > 0).then_some(offset);
    window
}

struct Compilation<'m> {
    model: &'m Metamodel,
    plan: SelectPlan,
    next_alias: usize,
    /// Primary keys of every level, appended as tie-breakers
    level_keys: Vec<ColumnRef>,
    /// Aliases holding at most one row per root row: the root and its to-one chains
    single_valued: Vec<String>,
    multiplied: bool,
}

impl<'m> Compilation<'m> {
    fn alias(&mut self, prefix: &str) -> String {
        let alias = format!("{}{}", prefix, self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn level(&mut self, entity: &EntityType, alias: &str, selection: &Selection) -> Result<RowShape> {
        let key = ColumnRef::new(alias, entity.primary_key_column());
        let mut shape = RowShape::new(&entity.name, self.plan.project(key.clone()));
        self.level_keys.push(key);

        for (attribute, column) in entity.join_columns() {
            if !attribute.ignored {
                let output = self.plan.project(ColumnRef::new(alias, column));
                shape.references.push((attribute.name.clone(), output));
            }
        }

        for child in &selection.children {
            if child.is_meta() {
                continue;
            }
            match entity.field(&child.name) {
                Some(ResolvedField::Column(column)) => {
                    let column_ref = ColumnRef::new(alias, &column.column);
                    let output = self.plan.project(column_ref.clone());
                    self.order_by(child, column_ref)?;
                    shape.columns.push(ColumnShape {
                        field: child.name.clone(),
                        output,
                        value_type: column.value_type.clone(),
                    });
                }
                Some(ResolvedField::Attribute(name)) => {
                    let attribute = entity.attribute(name).ok_or_else(|| unknown_field(entity, name))?;
                    let relation = self.join(entity, alias, attribute, child)?;
                    shape.relations.push(relation);
                }
                None if is_connection_field(entity, &child.name) => continue,
                None => return Err(unknown_field(entity, &child.name)),
            }
        }

        Ok(shape)
    }

    fn join(
        &mut self,
        entity: &EntityType,
        alias: &str,
        attribute: &Attribute,
        selection: &Selection,
    ) -> Result<RelationShape> {
        let model = self.model;
        let kind = join_kind(selection)?;
        let parent_key = ColumnRef::new(alias, entity.primary_key_column());
        let mut filtered = false;

        let content = match attribute.kind {
            AttributeKind::ToOne | AttributeKind::ToMany => {
                let target = model.entity(attribute.target_name())?;
                let target_alias = self.alias("t");
                let target_key = ColumnRef::new(&target_alias, target.primary_key_column());

                let on_target = match &attribute.mapping {
                    Mapping::JoinColumn(foreign_key) => {
                        Predicate::ColumnEq(target_key.clone(), ColumnRef::new(alias, foreign_key))
                    }
                    Mapping::JoinTable(join_table) => {
                        let link = self.alias("j");
                        self.plan.joins.push(Join {
                            kind,
                            table: join_table.table.clone(),
                            alias: link.clone(),
                            on: vec![Predicate::ColumnEq(
                                ColumnRef::new(&link, &join_table.join_column),
                                parent_key,
                            )],
                        });
                        Predicate::ColumnEq(
                            target_key.clone(),
                            ColumnRef::new(&link, &join_table.inverse_join_column),
                        )
                    }
                    Mapping::MappedBy(owner_name) => {
                        let owner = target.attribute(owner_name).ok_or_else(|| unknown_field(target, owner_name))?;
                        match &owner.mapping {
                            Mapping::JoinColumn(foreign_key) => Predicate::ColumnEq(
                                ColumnRef::new(&target_alias, foreign_key),
                                parent_key,
                            ),
                            Mapping::JoinTable(join_table) => {
                                let link = self.alias("j");
                                self.plan.joins.push(Join {
                                    kind,
                                    table: join_table.table.clone(),
                                    alias: link.clone(),
                                    on: vec![Predicate::ColumnEq(
                                        ColumnRef::new(&link, &join_table.inverse_join_column),
                                        parent_key,
                                    )],
                                });
                                Predicate::ColumnEq(
                                    target_key.clone(),
                                    ColumnRef::new(&link, &join_table.join_column),
                                )
                            }
                            _ => return Err(unmapped(attribute)),
                        }
                    }
                    _ => return Err(unmapped(attribute)),
                };

                let mut on = vec![on_target];
                on.extend(self.filters(target, &target_alias, selection)?);
                filtered = on.len() > 1;
                self.plan.joins.push(Join {
                    kind,
                    table: target.table.clone(),
                    alias: target_alias.clone(),
                    on,
                });
                if attribute.kind == AttributeKind::ToMany {
                    self.multiplied = true;
                } else if kind != JoinKind::Right && self.single_valued.iter().any(|a| a == alias) {
                    self.single_valued.push(target_alias.clone());
                }

                self.order_by(selection, target_key)?;
                RelationContent::Entity(self.level(target, &target_alias, selection)?)
            }
            AttributeKind::ElementCollection => {
                let Mapping::CollectionTable(table) = &attribute.mapping else {
                    return Err(unmapped(attribute));
                };
                let elements = self.alias("c");
                let mut on = vec![Predicate::ColumnEq(
                    ColumnRef::new(&elements, &table.join_column),
                    parent_key,
                )];
                self.multiplied = true;

                match attribute.element() {
                    Some(ElementType::Scalar(value_type)) => {
                        on.extend(self.element_filters(&[], &elements, selection)?);
                        filtered = on.len() > 1;
                        self.plan.joins.push(Join {
                            kind,
                            table: table.table.clone(),
                            alias: elements.clone(),
                            on,
                        });

                        let column = table.column.as_deref().unwrap_or(&attribute.name);
                        let column_ref = ColumnRef::new(&elements, column);
                        let output = self.plan.project(column_ref.clone());
                        self.order_by(selection, column_ref)?;
                        RelationContent::Scalars(ColumnShape {
                            field: attribute.name.clone(),
                            output,
                            value_type: value_type.clone(),
                        })
                    }
                    Some(ElementType::Embeddable(name)) => {
                        let embeddable = model.embeddable(name)?;
                        on.extend(self.element_filters(embeddable.columns(), &elements, selection)?);
                        filtered = on.len() > 1;
                        self.plan.joins.push(Join {
                            kind,
                            table: table.table.clone(),
                            alias: elements.clone(),
                            on,
                        });

                        let mut columns = Vec::new();
                        for column in embeddable.columns() {
                            let column_ref = ColumnRef::new(&elements, &column.column);
                            let output = self.plan.project(column_ref.clone());
                            self.order_by(selection, column_ref)?;
                            columns.push(ColumnShape {
                                field: column.name.clone(),
                                output,
                                value_type: column.value_type.clone(),
                            });
                        }
                        RelationContent::Embeddables(columns)
                    }
                    None => return Err(unmapped(attribute)),
                }
            }
            AttributeKind::Scalar | AttributeKind::Embedded => return Err(unmapped(attribute)),
        };

        Ok(RelationShape {
            response_key: selection.response_key().to_string(),
            attribute: attribute.name.clone(),
            filtered,
            content,
        })
    }

    fn order_by(&mut self, selection: &Selection, column: ColumnRef) -> Result<()> {
        if let Some(value) = selection.argument(ORDER_BY) {
            let direction = enum_name(value)
                .and_then(Direction::from_name)
                .ok_or_else(|| RelqlError::Query(format!("Invalid orderBy value {}", value)))?;
            self.plan.order(column, direction);
        }
        Ok(())
    }

    /// Predicates for the filter arguments of a field returning `entity`
    fn filters(&mut self, entity: &EntityType, alias: &str, selection: &Selection) -> Result<Vec<Predicate>> {
        let mut predicates = Vec::new();

        for (name, value) in &selection.arguments {
            if is_reserved_argument(name) || matches!(value, Value::Null) {
                continue;
            }
            match entity.field(name) {
                Some(ResolvedField::Column(column)) => {
                    predicates.push(self.any_of(ColumnRef::new(alias, &column.column), column, value)?);
                }
                Some(ResolvedField::Attribute(attribute_name)) => {
                    let attribute = entity
                        .attribute(attribute_name)
                        .filter(|a| a.kind == AttributeKind::ElementCollection)
                        .ok_or_else(|| unknown_argument(&entity.name, name))?;
                    predicates.push(self.collection_filter(entity, alias, attribute, value)?);
                }
                None => return Err(unknown_argument(&entity.name, name)),
            }
        }

        Ok(predicates)
    }

    /// Filter arguments of an element collection field, matched against its own rows
    fn element_filters(
        &self,
        columns: &[ColumnField],
        alias: &str,
        selection: &Selection,
    ) -> Result<Vec<Predicate>> {
        let mut predicates = Vec::new();
        for (name, value) in &selection.arguments {
            if is_reserved_argument(name) || matches!(value, Value::Null) {
                continue;
            }
            let column = columns
                .iter()
                .find(|column| column.name == *name)
                .ok_or_else(|| unknown_argument(&selection.name, name))?;
            predicates.push(self.any_of(ColumnRef::new(alias, &column.column), column, value)?);
        }
        Ok(predicates)
    }

    fn any_of(&self, column_ref: ColumnRef, column: &ColumnField, value: &Value) -> Result<Predicate> {
        let values = list_elements(value)
            .into_iter()
            .map(|element| to_sql(self.model, &column.value_type, element))
            .collect::<Result<Vec<_>>>()?;
        Ok(Predicate::any_of(column_ref, values))
    }

    /// `<key> IN (SELECT <owner> FROM <collection table> WHERE <element matches>)`
    fn collection_filter(
        &mut self,
        entity: &EntityType,
        alias: &str,
        attribute: &Attribute,
        value: &Value,
    ) -> Result<Predicate> {
        let model = self.model;
        let Mapping::CollectionTable(table) = &attribute.mapping else {
            return Err(unmapped(attribute));
        };
        let sub_alias = self.alias("s");
        let mut subquery = SelectPlan::new(&table.table, &sub_alias);
        subquery.project(ColumnRef::new(&sub_alias, &table.join_column));

        let element_match = match attribute.element() {
            Some(ElementType::Scalar(value_type)) => {
                let column = ColumnField {
                    name: attribute.name.clone(),
                    declaring: attribute.declaring.clone(),
                    column: table.column.clone().unwrap_or_else(|| attribute.name.clone()),
                    value_type: value_type.clone(),
                    path: vec![attribute.name.clone()],
                };
                self.any_of(ColumnRef::new(&sub_alias, &column.column), &column, value)?
            }
            Some(ElementType::Embeddable(name)) => {
                let embeddable = model.embeddable(name)?;
                let mut alternatives = Vec::new();
                for element in list_elements(value) {
                    let Value::Object(fields) = element else {
                        return Err(RelqlError::Query(format!(
                            "Filter '{}' expects {} input objects",
                            attribute.name, name
                        )));
                    };
                    let mut conjunction = Vec::new();
                    for (field, field_value) in fields {
                        let column = embeddable
                            .columns()
                            .iter()
                            .find(|column| column.name == field.as_str())
                            .ok_or_else(|| unknown_argument(name, field.as_str()))?;
                        let column_ref = ColumnRef::new(&sub_alias, &column.column);
                        conjunction.push(match field_value {
                            Value::Null => Predicate::IsNull(column_ref),
                            other => Predicate::Eq(column_ref, to_sql(self.model, &column.value_type, other)?),
                        });
                    }
                    alternatives.push(Predicate::And(conjunction));
                }
                if alternatives.is_empty() {
                    Predicate::False
                } else {
                    Predicate::Or(alternatives)
                }
            }
            None => return Err(unmapped(attribute)),
        };
        subquery.filters.push(element_match);

        Ok(Predicate::InSubquery(
            ColumnRef::new(alias, entity.primary_key_column()),
            Box::new(subquery),
        ))
    }
}

fn join_kind(selection: &Selection) -> Result<JoinKind> {
    match selection.argument(JOIN_TYPE) {
        None => Ok(JoinKind::default()),
        Some(value) => enum_name(value)
            .and_then(JoinKind::from_name)
            .ok_or_else(|| RelqlError::Query(format!("Invalid joinType value {}", value))),
    }
}

/// Enum arguments arrive as enum literals, or as strings through variables
fn enum_name(value: &Value) -> Option<&str> {
    match value {
        Value::Enum(name) => Some(name.as_str()),
        Value::String(name) => Some(name.as_str()),
        _ => None,
    }
}

fn is_reserved_argument(name: &str) -> bool {
    matches!(name, ORDER_BY | JOIN_TYPE | PAGINATION_REQUEST)
}

fn is_connection_field(entity: &EntityType, name: &str) -> bool {
    name.strip_suffix("Connection")
        .and_then(|attribute| entity.attribute(attribute))
        .is_some_and(|attribute| attribute.is_relationship() && !attribute.ignored)
}

fn unknown_field(entity: &EntityType, name: &str) -> RelqlError {
    RelqlError::Query(format!("{} has no field '{}'", entity.name, name))
}

fn unknown_argument(owner: &str, name: &str) -> RelqlError {
    RelqlError::Query(format!("'{}' is not a filter of {}", name, owner))
}

fn unmapped(attribute: &Attribute) -> RelqlError {
    RelqlError::Query(format!(
        "{}.{} cannot be joined",
        attribute.declaring, attribute.name
    ))
}
