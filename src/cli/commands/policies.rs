use std::path::PathBuf;

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum PolicyCommands {
    #[command(about = "List all entity policies")]
    List,

    #[command(about = "Show one entity policy")]
    Show {
        #[arg(help = "Entity name")]
        entity: String,
    },

    #[command(about = "Validate the policy table, optionally with an override file")]
    Check {
        #[arg(long, help = "YAML policy override file to validate")]
        file: Option<PathBuf>,
    },
}

pub async fn handle(cmd: PolicyCommands, policy_file: Option<PathBuf>, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::List => {
            let registry = load_policies(policy_file.as_deref())?;

            match output_format {
                OutputFormat::Json => {
                    let policies: Vec<_> = registry.iter().collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "policies": policies }))?);
                }
                OutputFormat::Text => {
                    println!("{:<12} {:<7} {:<9} {:<5} {:<5} {}", "ENTITY", "FIELDS", "OPERATORS", "PAGE", "MAX", "DEFAULT SORT");
                    println!("{}", "-".repeat(70));

                    for policy in registry.iter() {
                        println!(
                            "{:<12} {:<7} {:<9} {:<5} {:<5} {}",
                            policy.entity,
                            policy.allowed_fields.len(),
                            policy.allowed_operators.len(),
                            policy.default_page_size,
                            policy.max_page_size,
                            describe_sort(&policy.default_sort)
                        );
                    }
                }
            }

            Ok(())
        }
        PolicyCommands::Show { entity } => {
            let registry = load_policies(policy_file.as_deref())?;
            let policy = require_policy(&registry, &entity)?;

            match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(policy.as_ref())?);
                }
                OutputFormat::Text => {
                    let operators: Vec<&str> = policy.allowed_operators.iter().map(|op| op.as_str()).collect();
                    println!("Entity: {}", policy.entity);
                    println!("Fields: {}", policy.allowed_fields.join(", "));
                    println!("Operators: {}", operators.join(", "));
                    println!("Default sort: {}", describe_sort(&policy.default_sort));
                    println!("Page size: {} (max {})", policy.default_page_size, policy.max_page_size);
                }
            }

            Ok(())
        }
        PolicyCommands::Check { file } => {
            let file = file.or(policy_file);
            let registry = load_policies(file.as_deref())?;
            let source = file
                .as_ref()
                .map(|f| f.display().to_string())
                .unwrap_or_else(|| "built-in table".to_string());

            output_success(
                &output_format,
                &format!("{} policies valid ({})", registry.len(), source),
                Some(json!({ "entities": registry.entities().collect::<Vec<_>>() })),
            )
        }
    }
}
