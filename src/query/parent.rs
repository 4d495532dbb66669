/// Constraining a nested connection's query to the row it was opened from

use super::pagination::ParentLink;
use super::plan::{ColumnRef, Predicate, SelectPlan, SqlValue};
use super::values;
use crate::error::{RelqlError, Result};
use crate::model::{Attribute, AttributeKind, EntityType, Mapping, Metamodel};
use crate::session::IdentifierLookup;
use async_graphql::Value;

/// Predicate relating rows of `target` (aliased `alias`) to the parent row,
/// `None` when the parent's key could not be determined
pub fn parent_predicate(
    model: &Metamodel,
    identifiers: Option<&dyn IdentifierLookup>,
    target: &EntityType,
    alias: &str,
    link: &ParentLink,
) -> Result<Option<Predicate>> {
    let parent = model.entity(&link.entity)?;
    let attribute = parent
        .attribute(&link.attribute)
        .filter(|a| a.is_relationship() && !a.ignored && a.target_name() == target.name)
        .ok_or_else(|| {
            RelqlError::Query(format!(
                "Field '{}Connection' of {} does not page over a relationship to {}",
                link.attribute, parent.name, target.name
            ))
        })?;

    let root_key = ColumnRef::new(alias, target.primary_key_column());

    if let (AttributeKind::ToOne, Mapping::JoinColumn(_)) = (attribute.kind, &attribute.mapping) {
        return owning_reference(model, identifiers, target, root_key, attribute, link);
    }

    let parent_key = values::to_sql(model, parent.primary_key_type(), &link.row.key)?;

    let predicate = match &attribute.mapping {
        Mapping::JoinTable(join_table) => Predicate::InSubquery(
            root_key,
            Box::new(link_subquery(
                &join_table.table,
                &join_table.inverse_join_column,
                &join_table.join_column,
                parent_key,
            )),
        ),
        Mapping::MappedBy(owner_name) => {
            let owner = target.attribute(owner_name).ok_or_else(|| {
                RelqlError::Query(format!(
                    "{} does not declare '{}', the owner of {}.{}",
                    target.name, owner_name, parent.name, attribute.name
                ))
            })?;
            match &owner.mapping {
                Mapping::JoinColumn(foreign_key) => {
                    Predicate::Eq(ColumnRef::new(alias, foreign_key), parent_key)
                }
                // Ownership lives on the target: select the owners reachable from the parent
                Mapping::JoinTable(join_table) => Predicate::InSubquery(
                    root_key,
                    Box::new(link_subquery(
                        &join_table.table,
                        &join_table.join_column,
                        &join_table.inverse_join_column,
                        parent_key,
                    )),
                ),
                _ => {
                    return Err(RelqlError::Query(format!(
                        "{}.{} is not an owning relationship",
                        target.name, owner_name
                    )))
                }
            }
        }
        _ => {
            return Err(RelqlError::Query(format!(
                "{}.{} has no relationship mapping",
                parent.name, attribute.name
            )))
        }
    };

    Ok(Some(predicate))
}

/// `SELECT <selected> FROM <table> WHERE <matching> = <key>`
fn link_subquery(table: &str, selected: &str, matching: &str, key: SqlValue) -> SelectPlan {
    let mut subquery = SelectPlan::new(table, "p0");
    subquery.project(ColumnRef::new("p0", selected));
    subquery
        .filters
        .push(Predicate::Eq(ColumnRef::new("p0", matching), key));
    subquery
}

/// Owning to-one: the parent row already holds the target's key
fn owning_reference(
    model: &Metamodel,
    identifiers: Option<&dyn IdentifierLookup>,
    target: &EntityType,
    root_key: ColumnRef,
    attribute: &Attribute,
    link: &ParentLink,
) -> Result<Option<Predicate>> {
    let key = identifiers
        .and_then(|lookup| lookup.reference_identifier(&link.row, &attribute.name))
        .or_else(|| {
            link.row
                .related_rows(&attribute.name)
                .map(|rows| rows.first().map(|row| row.key.clone()).unwrap_or(Value::Null))
        });

    match key {
        Some(Value::Null) => Ok(Some(Predicate::False)),
        Some(key) => {
            let key = values::to_sql(model, target.primary_key_type(), &key)?;
            Ok(Some(Predicate::Eq(root_key, key)))
        }
        None => {
            tracing::warn!(
                "No key for {}.{} on the parent row, leaving the connection unfiltered",
                link.entity,
                attribute.name
            );
            Ok(None)
        }
    }
}
