use anyhow::Context;
use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "relql")]
#[command(version = "0.1.0")]
#[command(about = "Turn relational entity models into GraphQL APIs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the example library model
    Init {
        /// Generate example configuration
        #[arg(long)]
        example: bool,

        /// Output config file path (if not specified, outputs to stdout)
        #[arg(long)]
        output: Option<String>,
    },

    /// Start GraphQL server
    Serve {
        /// Config file path
        #[arg(long, default_value = "relql.toml")]
        config: String,

        /// Server port
        #[arg(long, default_value_t = 4000)]
        port: u16,
    },

    /// Print the derived GraphQL schema
    Schema {
        /// Config file path
        #[arg(long, default_value = "relql.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { example, output } => {
            cli::init::run(example, output).context("init failed")?;
        }
        Commands::Serve { config, port } => {
            cli::serve::run(config.clone(), port)
                .await
                .with_context(|| format!("serving {} failed", config))?;
        }
        Commands::Schema { config } => {
            cli::schema::run(config.clone())
                .with_context(|| format!("no schema for {}", config))?;
        }
    }

    Ok(())
}
