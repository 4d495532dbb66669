use relql::error::Result;
use relql::{Metamodel, SchemaBuilder};
use std::sync::Arc;

/// Print the GraphQL schema derived from a configuration
pub fn run(config_path: String) -> Result<()> {
    tracing::info!("📖 Loading configuration from {}", config_path);
    let config = relql::config::load_config(&config_path)?;

    let model = Arc::new(Metamodel::from_config(&config)?);
    let schema = SchemaBuilder::new(model).build_schema(None)?;

    println!("{}", schema.sdl());
    Ok(())
}
