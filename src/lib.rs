pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod schema;
pub mod session;

// Re-export commonly used types
pub use config::{Config, EntityConfig, ServerConfig};
pub use error::{RelqlError, Result};
pub use model::Metamodel;
pub use schema::SchemaBuilder;
pub use session::{DataFusionSession, QueryExecutor, SessionHandle};
