/// Result materialization
///
/// Turns the flat, possibly row-multiplied result of one compiled query into
/// nested entity rows: joined rows are grouped under their parent by primary
/// key, element collections get set semantics and enum columns are decoded once.

use super::compiler::CompiledQuery;
use super::plan::Predicate;
use super::values;
use crate::error::Result;
use crate::model::{Metamodel, ValueType};
use crate::session::{QueryExecutor, ResultRow};
use async_graphql::{Name, Value};
use indexmap::IndexMap;

/// Where the values of one entity level live in the result set
#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    pub entity: String,
    /// Output name of the primary key
    pub key: String,
    pub columns: Vec<ColumnShape>,
    /// Foreign keys of owning to-one attributes, by attribute name
    pub references: Vec<(String, String)>,
    pub relations: Vec<RelationShape>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnShape {
    /// Graph field name
    pub field: String,
    pub output: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationShape {
    /// Response key of the selecting field
    pub response_key: String,
    pub attribute: String,
    /// Filter arguments narrowed the join
    pub filtered: bool,
    pub content: RelationContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationContent {
    Entity(RowShape),
    /// Scalar element collection
    Scalars(ColumnShape),
    /// Embeddable element collection, one shape per embeddable column
    Embeddables(Vec<ColumnShape>),
}

impl RowShape {
    pub fn new(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
            columns: Vec::new(),
            references: Vec::new(),
            relations: Vec::new(),
        }
    }
}

/// One loaded entity row with its joined relations
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub entity: String,
    pub key: Value,
    /// Selected scalar fields by graph field name
    pub fields: IndexMap<String, Value>,
    /// Foreign key values of owning to-one attributes
    pub references: IndexMap<String, Value>,
    /// Joined relations by response key
    pub relations: IndexMap<String, Related>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    pub attribute: String,
    pub filtered: bool,
    pub content: RelatedContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelatedContent {
    Rows(Vec<EntityRow>),
    /// Scalar values, or objects for embeddable elements
    Elements(Vec<Value>),
}

impl EntityRow {
    /// Rows joined for the given attribute without filter arguments,
    /// under any response key
    pub fn related_rows(&self, attribute: &str) -> Option<&[EntityRow]> {
        self.relations.values().find_map(|related| match &related.content {
            RelatedContent::Rows(rows) if related.attribute == attribute && !related.filtered => {
                Some(rows.as_slice())
            }
            _ => None,
        })
    }
}

/// Run a compiled query and materialize its rows
pub async fn load(
    compiled: &CompiledQuery,
    executor: &dyn QueryExecutor,
    model: &Metamodel,
) -> Result<Vec<EntityRow>> {
    let plan = match &compiled.window {
        Some(window) => {
            let key_output = compiled.root_key.output_name();
            let key_type = model.entity(&compiled.shape.entity)?.primary_key_type().clone();
            let keys = executor
                .fetch(window)
                .await?
                .iter()
                .filter_map(|row| row.get(&key_output))
                .map(|key| values::to_sql(model, &key_type, key))
                .collect::<Result<Vec<_>>>()?;

            if keys.is_empty() {
                return Ok(Vec::new());
            }

            let mut plan = compiled.plan.clone();
            plan.filters
                .push(Predicate::any_of(compiled.root_key.clone(), keys));
            plan
        }
        None => compiled.plan.clone(),
    };

    let rows = executor.fetch(&plan).await?;
    tracing::debug!("Loaded {} rows for {}", rows.len(), compiled.shape.entity);

    let rows: Vec<&ResultRow> = rows.iter().collect();
    Ok(hydrate(&rows, &compiled.shape, model))
}

/// Group flat rows into entity rows, preserving first-appearance order
pub fn hydrate(rows: &[&ResultRow], shape: &RowShape, model: &Metamodel) -> Vec<EntityRow> {
    let mut groups: IndexMap<String, (EntityRow, Vec<&ResultRow>)> = IndexMap::new();

    for row in rows {
        let key = match row.get(&shape.key) {
            Some(Value::Null) | None => continue,
            Some(key) => key,
        };
        let group = groups
            .entry(key.to_string())
            .or_insert_with(|| (entity_row(row, key, shape, model), Vec::new()));
        group.1.push(*row);
    }

    groups
        .into_values()
        .map(|(mut entity, group)| {
            for relation in &shape.relations {
                let content = match &relation.content {
                    RelationContent::Entity(child) => {
                        RelatedContent::Rows(hydrate(&group, child, model))
                    }
                    RelationContent::Scalars(column) => {
                        let mut elements = Vec::new();
                        for row in &group {
                            let value = decode(row, column, model);
                            if value != Value::Null && !elements.contains(&value) {
                                elements.push(value);
                            }
                        }
                        RelatedContent::Elements(elements)
                    }
                    RelationContent::Embeddables(columns) => {
                        let mut elements = Vec::new();
                        for row in &group {
                            let fields: IndexMap<Name, Value> = columns
                                .iter()
                                .map(|column| (Name::new(&column.field), decode(row, column, model)))
                                .collect();
                            if fields.values().all(|v| *v == Value::Null) {
                                continue;
                            }
                            let element = Value::Object(fields);
                            if !elements.contains(&element) {
                                elements.push(element);
                            }
                        }
                        RelatedContent::Elements(elements)
                    }
                };
                entity.relations.insert(
                    relation.response_key.clone(),
                    Related {
                        attribute: relation.attribute.clone(),
                        filtered: relation.filtered,
                        content,
                    },
                );
            }
            entity
        })
        .collect()
}

fn entity_row(row: &ResultRow, key: &Value, shape: &RowShape, model: &Metamodel) -> EntityRow {
    EntityRow {
        entity: shape.entity.clone(),
        key: key.clone(),
        fields: shape
            .columns
            .iter()
            .map(|column| (column.field.clone(), decode(row, column, model)))
            .collect(),
        references: shape
            .references
            .iter()
            .map(|(attribute, output)| {
                (attribute.clone(), row.get(output).cloned().unwrap_or(Value::Null))
            })
            .collect(),
        relations: IndexMap::new(),
    }
}

fn decode(row: &ResultRow, column: &ColumnShape, model: &Metamodel) -> Value {
    let raw = row.get(&column.output).cloned().unwrap_or(Value::Null);
    let ValueType::Enum(enum_name) = &column.value_type else {
        return raw;
    };
    if raw == Value::Null {
        return raw;
    }

    match model
        .enum_type(enum_name)
        .ok()
        .and_then(|enum_type| enum_type.decode(&raw))
    {
        Some(constant) => Value::Enum(Name::new(constant)),
        None => {
            tracing::warn!(
                "Stored value {} of column '{}' is not a {} constant, returning null",
                raw,
                column.output,
                enum_name
            );
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeConfig, Config, EntityConfig, EnumConfig, EnumStorage};

    fn model() -> Metamodel {
        let config = Config {
            entities: vec![EntityConfig {
                name: "Book".to_string(),
                table: "book".to_string(),
                primary_key: "id".to_string(),
                description: None,
                ignore: false,
                attributes: vec![
                    AttributeConfig::scalar("id", "long"),
                    AttributeConfig::scalar("genre", "Genre"),
                ],
            }],
            enums: vec![EnumConfig {
                name: "Genre".to_string(),
                values: vec!["NOVEL".to_string(), "FANTASY".to_string()],
                storage: EnumStorage::Ordinal,
                description: None,
            }],
            ..Config::default()
        };
        Metamodel::from_config(&config).unwrap()
    }

    fn row(values: &[(&str, Value)]) -> ResultRow {
        values
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn book_shape() -> RowShape {
        let mut shape = RowShape::new("Book", "t0__id");
        shape.columns.push(ColumnShape {
            field: "genre".to_string(),
            output: "t0__genre".to_string(),
            value_type: ValueType::Enum("Genre".to_string()),
        });
        shape.relations.push(RelationShape {
            response_key: "tags".to_string(),
            attribute: "tags".to_string(),
            filtered: false,
            content: RelationContent::Scalars(ColumnShape {
                field: "tags".to_string(),
                output: "t1__tag".to_string(),
                value_type: ValueType::String,
            }),
        });
        shape
    }

    #[test]
    fn test_rows_are_grouped_by_key_in_order() {
        let model = model();
        let rows = vec![
            row(&[("t0__id", Value::from(2)), ("t0__genre", Value::from(1)), ("t1__tag", Value::from("epic"))]),
            row(&[("t0__id", Value::from(1)), ("t0__genre", Value::from(0)), ("t1__tag", Value::Null)]),
            row(&[("t0__id", Value::from(2)), ("t0__genre", Value::from(1)), ("t1__tag", Value::from("dragons"))]),
            row(&[("t0__id", Value::from(2)), ("t0__genre", Value::from(1)), ("t1__tag", Value::from("epic"))]),
        ];
        let rows: Vec<&ResultRow> = rows.iter().collect();

        let books = hydrate(&rows, &book_shape(), &model);
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].key, Value::from(2));
        assert_eq!(books[0].fields["genre"], Value::Enum(Name::new("FANTASY")));
        assert_eq!(
            books[0].relations["tags"].content,
            RelatedContent::Elements(vec![Value::from("epic"), Value::from("dragons")])
        );
        assert_eq!(books[1].relations["tags"].content, RelatedContent::Elements(vec![]));
    }

    #[test]
    fn test_rows_without_key_are_skipped() {
        let model = model();
        let rows = vec![row(&[("t0__id", Value::Null), ("t0__genre", Value::Null)])];
        let rows: Vec<&ResultRow> = rows.iter().collect();
        assert!(hydrate(&rows, &book_shape(), &model).is_empty());
    }

    #[test]
    fn test_undecodable_enum_becomes_null() {
        let model = model();
        let rows = vec![row(&[("t0__id", Value::from(1)), ("t0__genre", Value::from(9))])];
        let rows: Vec<&ResultRow> = rows.iter().collect();
        let books = hydrate(&rows, &book_shape(), &model);
        assert_eq!(books[0].fields["genre"], Value::Null);
    }
}
