mod types;

pub use types::{
    AttributeConfig, AttributeKindConfig, CollectionTableConfig, Config, EmbeddableConfig,
    EntityConfig, EnumConfig, EnumStorage, JoinTableConfig, ServerConfig, TableConfig,
};

use crate::error::{RelqlError, Result};
use std::fs;

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .map_err(|e| RelqlError::Config(format!("Failed to read config file '{}': {}", path, e)))?;

    let config: Config = toml::from_str(&contents)?;
    validate(&config)?;

    Ok(config)
}

/// Save configuration to a TOML file
pub fn save_config(config: &Config, path: &str) -> Result<()> {
    validate(config)?;

    let toml_string = toml::to_string_pretty(config)?;
    fs::write(path, toml_string)
        .map_err(|e| RelqlError::Config(format!("Failed to write config file '{}': {}", path, e)))?;

    Ok(())
}

/// Validate every section of a configuration
pub fn validate(config: &Config) -> Result<()> {
    if config.entities.is_empty() {
        return Err(RelqlError::Config("No entities configured".to_string()));
    }

    for table in &config.tables {
        table.validate().map_err(RelqlError::Config)?;
    }
    for entity in &config.entities {
        entity
            .validate()
            .map_err(|e| RelqlError::Config(format!("Invalid entity '{}': {}", entity.name, e)))?;
    }
    for embeddable in &config.embeddables {
        embeddable.validate().map_err(RelqlError::Config)?;
    }
    for enum_config in &config.enums {
        enum_config.validate().map_err(RelqlError::Config)?;
    }

    Ok(())
}
