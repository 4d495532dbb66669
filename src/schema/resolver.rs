/// GraphQL resolvers
///
/// Root list fields and connection `content` fields compile the client's
/// selection into one relational query and run it. Every other field reads
/// from the rows those queries already loaded, except nested connections,
/// which open a fresh query bounded by their own pagination envelope.

use crate::model::Metamodel;
use crate::query::{
    load, EntityRow, PageRequest, PageWindow, PaginationEnvelope, ParentLink, QueryCompiler,
    RelatedContent, Selection, PAGINATION_REQUEST,
};
use crate::schema::builder::{lower_argument, CONTENT};
use crate::schema::graph::{FieldDef, FieldSource};
use crate::schema::type_mapping::EnumCoercion;
use crate::session::SessionHandle;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, ResolverContext, TypeRef};
use async_graphql::Value;
use std::sync::Arc;

/// Engine field for a graph field, resolver chosen by its source
pub fn field(def: &FieldDef) -> Field {
    let type_ref = def.ty.to_type_ref();
    let mut field = match &def.source {
        FieldSource::EntityList { entity } => entity_list(&def.name, type_ref, entity.clone()),
        FieldSource::Connection { entity, attribute } => {
            connection(&def.name, type_ref, entity.clone(), attribute.clone())
        }
        FieldSource::Content { .. } => content(&def.name, type_ref),
        FieldSource::TotalPages => envelope_count(&def.name, type_ref, |e| e.total_pages),
        FieldSource::TotalElements => envelope_count(&def.name, type_ref, |e| e.total_elements),
        FieldSource::Relation { many } => relation(&def.name, type_ref, *many),
        FieldSource::ElementCollection { embeddable } => {
            element_collection(&def.name, type_ref, *embeddable)
        }
        FieldSource::Column { coercion } => column(&def.name, type_ref, *coercion),
        FieldSource::EmbeddableField => embeddable_field(&def.name, type_ref),
    };

    if let Some(description) = &def.description {
        field = field.description(description.as_str());
    }
    for argument in &def.arguments {
        field = field.argument(lower_argument(argument));
    }
    field
}

/// `E: [E!]` on the query root
fn entity_list(name: &str, type_ref: TypeRef, entity: String) -> Field {
    Field::new(name, type_ref, move |ctx: ResolverContext| {
        let entity = entity.clone();

        FieldFuture::new(async move {
            let model = ctx.data::<Arc<Metamodel>>()?;
            let session = ctx.data::<SessionHandle>()?;
            let selection = Selection::from_field(ctx.ctx.field())?;

            let compiled = QueryCompiler::new(model)
                .with_identifiers(session.identifiers())
                .compile(&selection, &entity)?;
            let rows = load(&compiled, session.as_ref(), model).await?;

            tracing::debug!("Resolved {} {} rows", rows.len(), entity);
            Ok(Some(FieldValue::list(rows.into_iter().map(FieldValue::owned_any))))
        })
    })
}

/// `EConnection` on the query root, `<attr>Connection` on an entity
///
/// Counts the matching rows and hands a `PaginationEnvelope` to the
/// connector's fields.
fn connection(
    name: &str,
    type_ref: TypeRef,
    entity: String,
    attribute: Option<String>,
) -> Field {
    Field::new(name, type_ref, move |ctx: ResolverContext| {
        let entity = entity.clone();
        let attribute = attribute.clone();

        FieldFuture::new(async move {
            let model = ctx.data::<Arc<Metamodel>>()?;
            let session = ctx.data::<SessionHandle>()?;
            let selection = Selection::from_field(ctx.ctx.field())?;
            let request = PageRequest::from_argument(selection.argument(PAGINATION_REQUEST))?;

            let parent = match attribute {
                Some(attribute) => {
                    let row = ctx.parent_value.try_downcast_ref::<EntityRow>()?;
                    Some(ParentLink {
                        entity: row.entity.clone(),
                        attribute,
                        row: row.clone(),
                    })
                }
                None => None,
            };

            // Totals depend on the content filters, not on what content selects
            let content = selection
                .child(CONTENT)
                .cloned()
                .unwrap_or_else(|| Selection::new(CONTENT));
            let compiled = QueryCompiler::new(model)
                .with_identifiers(session.identifiers())
                .compile_within(&content, &entity, parent.as_ref(), PageWindow::default())?;
            let total = session.count(&compiled.count).await?;

            let envelope = PaginationEnvelope::new(entity, request, total, parent);
            Ok(Some(FieldValue::owned_any(envelope)))
        })
    })
}

/// `content` of a connector: one page of rows
fn content(name: &str, type_ref: TypeRef) -> Field {
    Field::new(name, type_ref, move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let model = ctx.data::<Arc<Metamodel>>()?;
            let session = ctx.data::<SessionHandle>()?;
            let envelope = ctx.parent_value.try_downcast_ref::<PaginationEnvelope>()?;
            let selection = Selection::from_field(ctx.ctx.field())?;

            let compiled = QueryCompiler::new(model)
                .with_identifiers(session.identifiers())
                .compile_page(&selection, envelope)?;
            let rows = load(&compiled, session.as_ref(), model).await?;

            Ok(Some(FieldValue::list(rows.into_iter().map(FieldValue::owned_any))))
        })
    })
}

fn envelope_count(
    name: &str,
    type_ref: TypeRef,
    read: fn(&PaginationEnvelope) -> u64,
) -> Field {
    Field::new(name, type_ref, move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let envelope = ctx.parent_value.try_downcast_ref::<PaginationEnvelope>()?;
            Ok(Some(FieldValue::value(Value::from(read(envelope)))))
        })
    })
}

/// Relationship rows joined into the parent's query
fn relation(name: &str, type_ref: TypeRef, many: bool) -> Field {
    Field::new(name, type_ref, move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<EntityRow>()?;
            let field = ctx.ctx.field();
            let key = field.alias().unwrap_or(field.name());

            let rows = match row.relations.get(key).map(|related| &related.content) {
                Some(RelatedContent::Rows(rows)) => rows,
                _ => {
                    return Err(format!(
                        "'{}' was not loaded with its {} row",
                        key, row.entity
                    )
                    .into())
                }
            };

            if many {
                return Ok(Some(FieldValue::list(
                    rows.iter().cloned().map(FieldValue::owned_any),
                )));
            }

            if rows.len() > 1 {
                tracing::warn!(
                    "Singular relationship '{}' of {} {} loaded {} rows, returning the first",
                    key,
                    row.entity,
                    row.key,
                    rows.len()
                );
            }
            Ok(rows.first().cloned().map(FieldValue::owned_any))
        })
    })
}

/// Element collection values joined into the parent's query
fn element_collection(name: &str, type_ref: TypeRef, embeddable: bool) -> Field {
    Field::new(name, type_ref, move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<EntityRow>()?;
            let field = ctx.ctx.field();
            let key = field.alias().unwrap_or(field.name());

            let elements = match row.relations.get(key).map(|related| &related.content) {
                Some(RelatedContent::Elements(elements)) => elements,
                _ => {
                    return Err(format!(
                        "'{}' was not loaded with its {} row",
                        key, row.entity
                    )
                    .into())
                }
            };

            let values = elements.iter().cloned().map(|element| {
                if embeddable {
                    FieldValue::owned_any(element)
                } else {
                    FieldValue::value(element)
                }
            });
            Ok(Some(FieldValue::list(values)))
        })
    })
}

/// Scalar of a loaded entity row
fn column(name: &str, type_ref: TypeRef, coercion: Option<EnumCoercion>) -> Field {
    let field_name = name.to_string();

    Field::new(name, type_ref, move |ctx: ResolverContext| {
        let field_name = field_name.clone();

        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<EntityRow>()?;
            let value = match row.fields.get(&field_name) {
                None | Some(Value::Null) => return Ok(None),
                Some(value) => value.clone(),
            };
            let value = match coercion {
                Some(coercion) => coercion.coerce(value),
                None => value,
            };
            Ok(Some(FieldValue::value(value)))
        })
    })
}

/// Field of an embeddable element
fn embeddable_field(name: &str, type_ref: TypeRef) -> Field {
    let field_name = name.to_string();

    Field::new(name, type_ref, move |ctx: ResolverContext| {
        let field_name = field_name.clone();

        FieldFuture::new(async move {
            let parent = ctx.parent_value.try_downcast_ref::<Value>()?;

            match parent {
                Value::Object(obj) => match obj.get(field_name.as_str()) {
                    None | Some(Value::Null) => Ok(None),
                    Some(value) => Ok(Some(FieldValue::value(value.clone()))),
                },
                _ => Ok(None),
            }
        })
    })
}
