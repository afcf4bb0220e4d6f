pub mod commands;
pub mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "buildtrack")]
#[command(about = "BuildTrack CLI - inspect query policies and try queries offline")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "YAML policy override file (defaults to QUERY_POLICY_FILE)")]
    pub policies: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Query policy table")]
    Policies {
        #[command(subcommand)]
        cmd: commands::policies::PolicyCommands,
    },

    #[command(about = "Show the query a list request would build")]
    Explain {
        #[arg(help = "Entity name, e.g. materials")]
        entity: String,

        #[arg(help = "Query string, e.g. 'quantity[gte]=50&sort=name'", default_value = "")]
        query: String,
    },

    #[command(about = "Run a query against fixture data")]
    Query {
        #[arg(help = "Entity name, e.g. materials")]
        entity: String,

        #[arg(help = "Query string, e.g. 'category[in]=cement,steel&limit=5'", default_value = "")]
        query: String,

        #[arg(long, help = "JSON fixture file: { \"<entity>\": [ {...}, ... ] }")]
        fixtures: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let policy_file = cli
        .policies
        .clone()
        .or_else(|| crate::config::config().query.policy_file.clone());

    match cli.command {
        Commands::Policies { cmd } => commands::policies::handle(cmd, policy_file, output_format).await,
        Commands::Explain { entity, query } => {
            commands::explain::handle(&entity, &query, policy_file, output_format).await
        }
        Commands::Query { entity, query, fixtures } => {
            commands::query::handle(&entity, &query, &fixtures, policy_file, output_format).await
        }
    }
}
