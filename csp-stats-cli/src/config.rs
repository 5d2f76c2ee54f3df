use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use csp_stats::store::DEFAULT_ES_URL;
use csp_stats::task::{
    FINDINGS_STATS_INTERVAL, LATEST_MISCONFIGURATIONS_INDEX, LATEST_VULNERABILITIES_INDEX,
    SCORE_INDEX,
};
use csp_stats::{Credentials, MutedRule, StatsIndices, parse_interval};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub indices: IndicesConfig,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default)]
    pub muted_rules: Vec<MutedRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elasticsearch: ElasticsearchConfig::default(),
            indices: IndicesConfig::default(),
            interval: default_interval(),
            muted_rules: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_url")]
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicesConfig {
    #[serde(default = "default_misconfigurations")]
    pub misconfigurations: String,
    #[serde(default = "default_vulnerabilities")]
    pub vulnerabilities: String,
    #[serde(default = "default_scores")]
    pub scores: String,
}

impl Default for IndicesConfig {
    fn default() -> Self {
        Self {
            misconfigurations: default_misconfigurations(),
            vulnerabilities: default_vulnerabilities(),
            scores: default_scores(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_ES_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_interval() -> String {
    FINDINGS_STATS_INTERVAL.to_string()
}

fn default_misconfigurations() -> String {
    LATEST_MISCONFIGURATIONS_INDEX.to_string()
}

fn default_vulnerabilities() -> String {
    LATEST_VULNERABILITIES_INDEX.to_string()
}

fn default_scores() -> String {
    SCORE_INDEX.to_string()
}

impl Config {
    /// Load from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.interval()?;
        Ok(config)
    }

    pub fn interval(&self) -> Result<Duration> {
        parse_interval(&self.interval)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        let es = &self.elasticsearch;
        if let Some(key) = &es.api_key {
            return Some(Credentials::ApiKey(key.clone()));
        }
        es.username.as_ref().map(|username| Credentials::Basic {
            username: username.clone(),
            password: es.password.clone().unwrap_or_default(),
        })
    }

    pub fn indices(&self) -> StatsIndices {
        StatsIndices {
            misconfigurations: self.indices.misconfigurations.clone(),
            vulnerabilities: self.indices.vulnerabilities.clone(),
            scores: self.indices.scores.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.elasticsearch.url, DEFAULT_ES_URL);
        assert_eq!(config.interval().unwrap(), Duration::from_secs(300));
        assert_eq!(config.indices(), StatsIndices::default());
        assert!(config.muted_rules.is_empty());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.interval, "5m");
        assert_eq!(config.elasticsearch.timeout_secs, 30);
    }

    #[test]
    fn parses_full_config() {
        let config = Config::parse(
            "elasticsearch:
  url: https://es.internal:9200
  username: elastic
  password: changeme
indices:
  scores: custom-scores
interval: 10m
muted_rules:
  - benchmark_id: cis_k8s
    benchmark_version: v1.0.1
    rule_number: \"1.1.1\"
",
        )
        .unwrap();

        assert_eq!(config.elasticsearch.url, "https://es.internal:9200");
        assert_eq!(config.indices().scores, "custom-scores");
        assert_eq!(config.indices().misconfigurations, LATEST_MISCONFIGURATIONS_INDEX);
        assert_eq!(config.interval().unwrap(), Duration::from_secs(600));
        assert_eq!(config.muted_rules.len(), 1);
        assert_eq!(config.muted_rules[0].rule_number, "1.1.1");
        assert_eq!(
            config.credentials(),
            Some(Credentials::Basic {
                username: "elastic".into(),
                password: "changeme".into(),
            })
        );
    }

    #[test]
    fn api_key_wins_over_basic() {
        let config = Config::parse(
            "elasticsearch:\n  username: elastic\n  password: x\n  api_key: abc\n",
        )
        .unwrap();
        assert_eq!(config.credentials(), Some(Credentials::ApiKey("abc".into())));
    }

    #[test]
    fn rejects_bad_interval() {
        let err = Config::parse("interval: soon\n").unwrap_err();
        assert!(format!("{err:#}").contains("invalid interval"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::parse("elasticsearch:\n  hostname: es\n").is_err());
    }

    #[test]
    fn missing_file_names_path() {
        let err = Config::load(Some(Path::new("/nonexistent/csp-stats.yml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/csp-stats.yml"));
    }
}
