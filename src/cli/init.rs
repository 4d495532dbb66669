use relql::error::{RelqlError, Result};

const DEMO_DATA: &str = "demos/data";

/// Run the init command to generate example configuration
pub fn run(example: bool, output: Option<String>) -> Result<()> {
    if !example {
        return Err(RelqlError::Config(
            "Only the example model can be generated; pass --example".to_string(),
        ));
    }

    tracing::info!("🎨 Setting up the library example...");
    let config = crate::cli::example::create_example_config(DEMO_DATA);

    tracing::info!("✨ Created {} example entities:", config.entities.len());
    for entity in &config.entities {
        tracing::info!(
            "   • {} ({} attributes) -> {}",
            entity.name,
            entity.attributes.len(),
            entity.table
        );
    }

    let wrote_to_file = if let Some(output_path) = &output {
        relql::config::save_config(&config, output_path)?;
        tracing::info!("📝 Generated {}", output_path);
        true
    } else {
        let toml_string = toml::to_string_pretty(&config)?;
        println!("{}", toml_string);
        false
    };

    tracing::info!("");
    tracing::info!("💡 Next steps:");
    if wrote_to_file {
        tracing::info!("   1. Review the generated configuration file");
        tracing::info!("   2. Start server with 'relql serve --config <file>'");
    } else {
        tracing::info!("   1. Save the configuration to a file: relql init --example --output relql.toml");
        tracing::info!("   2. Start server with 'relql serve'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relql.toml");
        let path = path.to_str().unwrap().to_string();

        run(true, Some(path.clone())).unwrap();
        let config = relql::config::load_config(&path).unwrap();
        assert_eq!(config.entities.len(), 3);
    }

    #[test]
    fn test_init_requires_example_flag() {
        assert!(run(false, None).is_err());
    }
}
