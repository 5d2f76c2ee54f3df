mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use csp_stats::{
    Credentials, ElasticsearchClient, FindingsStatsTask, StaticSettings, TaskRegistry, TaskState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, LogFormat};
use config::Config;

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_task(cli: &Cli, config: &Config) -> Result<FindingsStatsTask> {
    let url = cli
        .es_url
        .clone()
        .unwrap_or_else(|| config.elasticsearch.url.clone());
    let credentials = cli
        .es_api_key
        .clone()
        .map(Credentials::ApiKey)
        .or_else(|| config.credentials());

    let store = ElasticsearchClient::with_timeout(
        url,
        credentials,
        Duration::from_secs(config.elasticsearch.timeout_secs),
    )?;
    let settings = StaticSettings::new(config.muted_rules.clone());
    Ok(FindingsStatsTask::new(
        Arc::new(store),
        Arc::new(settings),
        config.indices(),
    ))
}

async fn run_once(task: &FindingsStatsTask, prior: Option<&str>) -> Result<()> {
    let state = match prior {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw).context("--state is not valid JSON")?;
            TaskState::from_stored(&value)?
        }
        None => TaskState::empty(),
    };
    let next = task.run(state).await;
    println!("{}", next.to_stored());
    Ok(())
}

async fn run_scheduled(task: FindingsStatsTask, config: &Config) -> Result<()> {
    let mut registry = TaskRegistry::new();
    registry.register(task.definition())?;

    let mut instance = FindingsStatsTask::instance()?;
    instance.interval = config.interval()?;
    let id = instance.id.clone();
    registry.schedule_safe(instance).await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    registry.remove_safe(&id).await;
    registry.shutdown().await;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let task = build_task(&cli, &config)?;

    match &cli.command {
        Command::Once { state } => run_once(&task, state.as_deref()).await,
        Command::Run => run_scheduled(task, &config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
