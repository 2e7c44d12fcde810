//! Command-line shell over the core API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use llmfight_core::api::v1::{
    self, ApiState, CompareInput, GenerateInput, SetPreferredForRecordInput, SetPreferredInput,
};
use llmfight_core::config::FightConfig;
use llmfight_core::db::init_db;
use llmfight_core::orchestrator::ProviderTarget;
use llmfight_core::registry::ProviderRegistry;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "llmfight", version, about = "Ask several LLM providers the same prompt and compare")]
struct Cli {
    /// JSON provider configuration; environment variables override it
    #[arg(long, env = "LLMFIGHT_CONFIG")]
    config: Option<PathBuf>,
    /// Directory holding the SQLite database
    #[arg(long, env = "LLMFIGHT_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every provider's models
    Models,
    /// Ask one provider
    Ask {
        prompt: String,
        #[arg(long)]
        provider: String,
        #[arg(long, default_value = "")]
        model: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Ask several providers at once; targets are `provider` or `provider:model`
    Compare {
        prompt: String,
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
        #[arg(long)]
        conversation: Option<String>,
    },
    /// List conversations, newest first
    Conversations,
    /// Show one conversation grouped by prompt
    Show { conversation: String },
    /// Mark the preferred provider for a prompt
    Prefer {
        prompt: String,
        #[arg(long)]
        provider: String,
        #[arg(long, conflicts_with = "record", required_unless_present = "record")]
        conversation: Option<String>,
        /// Address the conversation through one of its record ids
        #[arg(long)]
        record: Option<i64>,
    },
    /// Delete every stored record
    Clear,
}

fn workspace_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("com", "LLMFight", "LLMFight") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("LLMFight")
    }
}

fn parse_target(raw: &str) -> ProviderTarget {
    match raw.split_once(':') {
        Some((provider, model)) => ProviderTarget {
            provider_id: provider.to_string(),
            model_id: model.to_string(),
        },
        None => ProviderTarget {
            provider_id: raw.to_string(),
            model_id: String::new(),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            log::info!("loading provider config from {}", path.display());
            FightConfig::load(path)?
        }
        None => {
            log::info!("loading provider config from the environment");
            FightConfig::from_env()
        }
    };
    let data_dir = cli.data_dir.clone().unwrap_or_else(workspace_dir);
    log::info!("using data dir {}", data_dir.display());
    let db = init_db(data_dir).context("failed to init db")?;
    let registry =
        ProviderRegistry::from_config(&config).context("failed to initialise providers")?;
    let state = ApiState::new(db, registry);

    match cli.command {
        Command::Models => print_json(&v1::list_models(&state).await),
        Command::Ask {
            prompt,
            provider,
            model,
            conversation,
        } => {
            let outcome = v1::generate(
                &state,
                GenerateInput {
                    prompt,
                    conversation_id: conversation,
                    provider_id: provider,
                    model_id: model,
                },
            )
            .await?;
            print_json(&outcome)
        }
        Command::Compare {
            prompt,
            targets,
            conversation,
        } => {
            let view = v1::compare(
                &state,
                CompareInput {
                    prompt,
                    conversation_id: conversation,
                    targets: targets.iter().map(|t| parse_target(t)).collect(),
                },
            )
            .await?;
            print_json(&view)
        }
        Command::Conversations => print_json(&v1::list_conversations(&state).await?),
        Command::Show { conversation } => {
            print_json(&v1::get_conversation(&state, &conversation).await?)
        }
        Command::Prefer {
            prompt,
            provider,
            conversation,
            record,
        } => {
            let updated = match (conversation, record) {
                (_, Some(record_id)) => {
                    v1::set_preferred_for_record(
                        &state,
                        SetPreferredForRecordInput {
                            record_id,
                            prompt,
                            preferred_provider_id: provider,
                        },
                    )
                    .await?
                }
                (conversation, None) => {
                    v1::set_preferred(
                        &state,
                        SetPreferredInput {
                            conversation_id: conversation.unwrap_or_default(),
                            prompt,
                            preferred_provider_id: provider,
                        },
                    )
                    .await?
                }
            };
            print_json(&updated)
        }
        Command::Clear => print_json(&v1::clear_conversations(&state).await?),
    }
}
