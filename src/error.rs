use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelqlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entity model error: {0}")]
    Model(String),

    #[error("Schema generation error: {0}")]
    SchemaGeneration(String),

    #[error("Attribute could not be mapped to GraphQL: field '{member}' of entity '{declaring}'")]
    UnmappableAttribute { declaring: String, member: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("Delta table error: {0}")]
    DeltaTable(#[from] deltalake::DeltaTableError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for RelqlError {
    fn from(err: toml::de::Error) -> Self {
        RelqlError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for RelqlError {
    fn from(err: toml::ser::Error) -> Self {
        RelqlError::Serialization(format!("TOML serialization error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, RelqlError>;
