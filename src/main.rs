mod commands;
mod docs;
mod embed;
mod llm;
mod qa;
mod state;
#[cfg(test)]
mod testing;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use docs::ingest::IngestionService;
use docs::markup::MarkupStore;
use docs::tracker::ArtifactTracker;
use docs::DocumentIndex;
use embed::Embedder;
use llm::{LanguageModel, LlmClient};
use qa::retrieval::RetrievalEngine;
use qa::{GenerationLimits, GenerationOrchestrator};
use state::{AppState, QaConfig};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Report command failures to the caller instead of a generic message.
async fn on_error(err: poise::FrameworkError<'_, AppState, anyhow::Error>) {
    match err {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().name, "Command failed: {:#}", error);
            if let Err(e) = ctx.say(format!("Error: {}", error)).await {
                error!("Failed to report command error: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let level = dotenv::var("QA_LOG_LEVEL")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Storage
    let data_dir = PathBuf::from(dotenv::var("QA_DATA_DIR").unwrap_or_else(|_| "./data".into()));
    let embedder: Arc<dyn Embedder> = Arc::from(embed::from_env()?);
    let index = Arc::new(DocumentIndex::open(&data_dir.join("index"), embedder.profile()).await?);
    let markup = Arc::new(MarkupStore::new(&data_dir.join("markup"))?);
    let tracker = Arc::new(ArtifactTracker::new());
    info!(data_dir = ?data_dir, embedder = embedder.profile(), "Storage initialized");

    let llm_client = LlmClient::from_env()?;
    info!(model = llm_client.model(), "LLM client initialized");
    let llm: Arc<dyn LanguageModel> = Arc::new(llm_client);

    let limits = GenerationLimits {
        timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", 120)),
        max_concurrent: env_parse("LLM_MAX_CONCURRENT", 4),
    };
    info!(
        timeout_secs = limits.timeout.as_secs(),
        max_concurrent = limits.max_concurrent,
        "Generation limits"
    );

    let ingestion = Arc::new(IngestionService::new(
        embedder.clone(),
        index.clone(),
        markup.clone(),
        tracker.clone(),
    ));
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        RetrievalEngine::new(embedder, index.clone()),
        llm,
        markup,
        tracker.clone(),
        limits,
    ));

    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let app_state = AppState {
        index,
        ingestion,
        orchestrator,
        tracker,
        admin_ids,
        qa_config: Arc::new(RwLock::new(QaConfig::default())),
        testcases: RwLock::new(HashMap::new()),
    };

    let intents = serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::qa()],
            on_error: |err| Box::pin(on_error(err)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                for cmd in commands {
                    for sub in &cmd.subcommands {
                        info!("  /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(ctx, commands, gid).await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(ctx, commands).await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting QA assistant...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
