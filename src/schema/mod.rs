/// GraphQL schema derivation from the entity model
///
/// The deriver builds an engine-neutral `TypeGraph` through a `TypeCache`,
/// then lowers it into an async-graphql dynamic schema with resolvers.

mod builder;
mod cache;
mod graph;
mod resolver;
mod scalars;
mod type_mapping;

pub use builder::{
    SchemaBuilder, CONTENT, JOIN_TYPE_ENUM, ORDER_BY_DIRECTION, PAGINATION_OBJECT, QUERY,
    TOTAL_ELEMENTS, TOTAL_PAGES,
};
pub use cache::{TypeCache, TypeKey};
pub use graph::{
    ArgumentDef, EnumDef, FieldDef, FieldSource, GraphType, InputObjectDef, ObjectDef, ScalarDef,
    TypeExpr, TypeGraph,
};
pub use scalars::custom_scalars;
pub use type_mapping::{map_value_type, EnumCoercion};
