/// Engine-neutral type graph
///
/// Types live in an arena keyed by name and refer to each other through
/// `TypeExpr::Reference`, so cyclic entity graphs need no back-patching. The
/// graph is built once and never mutated afterwards.

use super::type_mapping::EnumCoercion;
use async_graphql::dynamic::TypeRef;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    Reference(String),
    List(Box<TypeExpr>),
    NonNull(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Reference(name.into())
    }

    pub fn list(inner: TypeExpr) -> Self {
        TypeExpr::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeExpr) -> Self {
        TypeExpr::NonNull(Box::new(inner))
    }

    /// Name of the referenced type, wrappers removed
    pub fn base_name(&self) -> &str {
        match self {
            TypeExpr::Reference(name) => name,
            TypeExpr::List(inner) | TypeExpr::NonNull(inner) => inner.base_name(),
        }
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeExpr::List(_) => true,
            TypeExpr::NonNull(inner) => inner.is_list(),
            TypeExpr::Reference(_) => false,
        }
    }

    pub fn to_type_ref(&self) -> TypeRef {
        match self {
            TypeExpr::Reference(name) => TypeRef::Named(name.clone().into()),
            TypeExpr::List(inner) => TypeRef::List(Box::new(inner.to_type_ref())),
            TypeExpr::NonNull(inner) => TypeRef::NonNull(Box::new(inner.to_type_ref())),
        }
    }
}

impl std::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpr::Reference(name) => f.write_str(name),
            TypeExpr::List(inner) => write!(f, "[{}]", inner),
            TypeExpr::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDef {
    pub name: String,
    pub ty: TypeExpr,
    pub description: Option<String>,
}

impl ArgumentDef {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
        }
    }
}

/// Where a field's value comes from at request time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Scalar of a loaded entity row, flattened embedded attributes included
    Column { coercion: Option<EnumCoercion> },
    /// Joined relationship rows of a loaded entity row
    Relation { many: bool },
    /// Joined element collection values of a loaded entity row
    ElementCollection { embeddable: bool },
    /// Field of an embeddable element
    EmbeddableField,
    /// Root list field: one query per request
    EntityList { entity: String },
    /// Connection field: root when `attribute` is `None`, else nested under a row
    Connection {
        entity: String,
        attribute: Option<String>,
    },
    /// `content` of a connector: one query per page
    Content { entity: String },
    TotalPages,
    TotalElements,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeExpr,
    pub arguments: Vec<ArgumentDef>,
    pub source: FieldSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl ObjectDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<ArgumentDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
    pub coercion: EnumCoercion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

/// One canonical node of the type graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphType {
    Object(Arc<ObjectDef>),
    InputObject(Arc<InputObjectDef>),
    Enum(Arc<EnumDef>),
    Scalar(Arc<ScalarDef>),
}

impl GraphType {
    pub fn name(&self) -> &str {
        match self {
            GraphType::Object(def) => &def.name,
            GraphType::InputObject(def) => &def.name,
            GraphType::Enum(def) => &def.name,
            GraphType::Scalar(def) => &def.name,
        }
    }

    /// Whether two handles point at the same node
    pub fn ptr_eq(&self, other: &GraphType) -> bool {
        match (self, other) {
            (GraphType::Object(a), GraphType::Object(b)) => Arc::ptr_eq(a, b),
            (GraphType::InputObject(a), GraphType::InputObject(b)) => Arc::ptr_eq(a, b),
            (GraphType::Enum(a), GraphType::Enum(b)) => Arc::ptr_eq(a, b),
            (GraphType::Scalar(a), GraphType::Scalar(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// GraphQL built-in scalars, never stored in the arena
pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// The derived, immutable type graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGraph {
    pub query: String,
    pub types: IndexMap<String, GraphType>,
}

impl TypeGraph {
    pub fn get(&self, name: &str) -> Option<&GraphType> {
        self.types.get(name)
    }

    /// Canonical node a type expression refers to
    pub fn resolve(&self, ty: &TypeExpr) -> Option<&GraphType> {
        self.types.get(ty.base_name())
    }

    pub fn object(&self, name: &str) -> Option<&Arc<ObjectDef>> {
        match self.types.get(name) {
            Some(GraphType::Object(def)) => Some(def),
            _ => None,
        }
    }

    pub fn input_object(&self, name: &str) -> Option<&Arc<InputObjectDef>> {
        match self.types.get(name) {
            Some(GraphType::InputObject(def)) => Some(def),
            _ => None,
        }
    }

    pub fn query_root(&self) -> Option<&Arc<ObjectDef>> {
        self.object(&self.query)
    }

    /// References that name no type in the graph
    pub fn dangling_references(&self) -> Vec<String> {
        let mut dangling = Vec::new();
        let mut check = |ty: &TypeExpr| {
            let name = ty.base_name();
            if !BUILTIN_SCALARS.contains(&name) && !self.types.contains_key(name) {
                dangling.push(name.to_string());
            }
        };

        for ty in self.types.values() {
            match ty {
                GraphType::Object(def) => {
                    for field in &def.fields {
                        check(&field.ty);
                        field.arguments.iter().for_each(|arg| check(&arg.ty));
                    }
                }
                GraphType::InputObject(def) => def.fields.iter().for_each(|field| check(&field.ty)),
                GraphType::Enum(_) | GraphType::Scalar(_) => {}
            }
        }
        dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_expr_rendering() {
        let ty = TypeExpr::list(TypeExpr::non_null(TypeExpr::named("Book")));
        assert_eq!(ty.to_string(), "[Book!]");
        assert_eq!(ty.base_name(), "Book");
        assert!(ty.is_list());
        assert_eq!(ty.to_type_ref().to_string(), "[Book!]");
    }

    #[test]
    fn test_dangling_references() {
        let mut types = IndexMap::new();
        types.insert(
            "Query".to_string(),
            GraphType::Object(Arc::new(ObjectDef {
                name: "Query".to_string(),
                description: None,
                fields: vec![FieldDef {
                    name: "Book".to_string(),
                    description: None,
                    ty: TypeExpr::list(TypeExpr::named("Book")),
                    arguments: vec![ArgumentDef::new("title", TypeExpr::list(TypeExpr::named("String")))],
                    source: FieldSource::EntityList {
                        entity: "Book".to_string(),
                    },
                }],
            })),
        );
        let graph = TypeGraph {
            query: "Query".to_string(),
            types,
        };
        assert_eq!(graph.dangling_references(), vec!["Book".to_string()]);
    }
}
