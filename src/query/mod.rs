/// Query compilation and execution
///
/// Per request, a field resolver turns its selection into a `Selection` tree,
/// the `QueryCompiler` compiles it into relational plans, a `QueryExecutor` runs
/// them and `hydrate` nests the rows back into entity rows.

mod compiler;
mod hydrate;
mod pagination;
mod parent;
mod plan;
mod selection;
mod values;

pub use compiler::{CompiledQuery, PageWindow, QueryCompiler, JOIN_TYPE, ORDER_BY, PAGINATION_REQUEST};
pub use hydrate::{
    hydrate, load, ColumnShape, EntityRow, Related, RelatedContent, RelationContent, RelationShape,
    RowShape,
};
pub use pagination::{total_pages, PageRequest, PaginationEnvelope, ParentLink};
pub use parent::parent_predicate;
pub use plan::{
    quote_identifier, ColumnRef, Direction, Join, JoinKind, OrderTerm, Predicate, Projection,
    SelectPlan, SqlValue,
};
pub use selection::Selection;
pub use values::to_sql;
pub(crate) use values::is_decimal_literal;

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::config::Config;
    use crate::model::Metamodel;

    pub const LIBRARY: &str = r#"
[[entity]]
name = "Author"
table = "author"
primary_key = "id"

  [[entity.attribute]]
  name = "id"
  kind = "scalar"
  type = "long"

  [[entity.attribute]]
  name = "name"
  kind = "scalar"
  type = "string"

  [[entity.attribute]]
  name = "address"
  kind = "embedded"
  target = "Address"

  [[entity.attribute]]
  name = "books"
  kind = "to_many"
  target = "Book"
  mapped_by = "author"

[[entity]]
name = "Book"
table = "book"
primary_key = "id"

  [[entity.attribute]]
  name = "id"
  kind = "scalar"
  type = "long"

  [[entity.attribute]]
  name = "title"
  kind = "scalar"
  type = "string"

  [[entity.attribute]]
  name = "genre"
  kind = "scalar"
  type = "Genre"

  [[entity.attribute]]
  name = "author"
  kind = "to_one"
  target = "Author"
  join_column = "author_id"

  [[entity.attribute]]
  name = "tags"
  kind = "element_collection"
  type = "string"
  collection_table = { table = "book_tags", join_column = "book_id", column = "tag" }

[[entity]]
name = "Character"
table = "character"
primary_key = "id"

  [[entity.attribute]]
  name = "id"
  kind = "scalar"
  type = "long"

  [[entity.attribute]]
  name = "name"
  kind = "scalar"
  type = "string"

  [[entity.attribute]]
  name = "friends"
  kind = "to_many"
  target = "Character"
  join_table = { table = "character_friends", join_column = "character_id", inverse_join_column = "friend_id" }

  [[entity.attribute]]
  name = "fans"
  kind = "to_many"
  target = "Character"
  mapped_by = "friends"

[[embeddable]]
name = "Address"

  [[embeddable.attribute]]
  name = "city"
  kind = "scalar"
  type = "string"

  [[embeddable.attribute]]
  name = "zip"
  kind = "scalar"
  type = "string"

[[enum]]
name = "Genre"
values = ["NOVEL", "FANTASY"]
"#;

    pub fn library() -> Metamodel {
        let config: Config = toml::from_str(LIBRARY).unwrap();
        Metamodel::from_config(&config).unwrap()
    }
}
