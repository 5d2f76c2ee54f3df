use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Aggregate cloud security posture findings into score snapshots
#[derive(Parser)]
#[command(name = "csp-stats", version)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "CSP_STATS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Elasticsearch base URL (overrides the config file)
    #[arg(long, env = "CSP_STATS_ES_URL", global = true)]
    pub es_url: Option<String>,

    /// Elasticsearch API key (overrides the config file)
    #[arg(long, env = "CSP_STATS_ES_API_KEY", hide_env_values = true, global = true)]
    pub es_api_key: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a single aggregation tick and print the resulting task state
    Once {
        /// Prior task state as JSON, e.g. '{"runs": 3, "health_status": "ok"}'
        #[arg(long)]
        state: Option<String>,
    },
    /// Schedule the aggregation task and keep running until interrupted
    Run,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
