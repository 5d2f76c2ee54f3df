use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregations::{ScoreAggregation, VulnSeverityAggregation};
use crate::documents::{score_documents, vulnerability_trend_document};
use crate::error::{ErrorKind, TaskError, classify};
use crate::query::{score_query, vuln_trend_query};
use crate::scheduler::{TaskDefinition, TaskInstance, TaskRunner, parse_interval};
use crate::settings::{SettingsRepository, muted_rules_filter};
use crate::state::{HealthStatus, TaskState};
use crate::store::{DocumentStore, SearchRequest, SearchResponse};

pub const FINDINGS_STATS_TASK_ID: &str = "cloud_security_posture-findings_stats";
pub const FINDINGS_STATS_TASK_TYPE: &str = "cloud_security_posture-stats_task";
pub const FINDINGS_STATS_TASK_TITLE: &str = "Aggregate latest findings index for score calculation";
pub const FINDINGS_STATS_INTERVAL: &str = "5m";

pub const LATEST_MISCONFIGURATIONS_INDEX: &str =
    "security_solution-cloud_security_posture.misconfiguration_latest";
pub const LATEST_VULNERABILITIES_INDEX: &str =
    "security_solution-cloud_security_posture.vulnerability_latest";
pub const SCORE_INDEX: &str = "logs-cloud_security_posture.scores-default";

/// Index names the task reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsIndices {
    pub misconfigurations: String,
    pub vulnerabilities: String,
    pub scores: String,
}

impl Default for StatsIndices {
    fn default() -> Self {
        Self {
            misconfigurations: LATEST_MISCONFIGURATIONS_INDEX.to_string(),
            vulnerabilities: LATEST_VULNERABILITIES_INDEX.to_string(),
            scores: SCORE_INDEX.to_string(),
        }
    }
}

/// Aggregates the latest findings into score and vulnerability trend
/// snapshots on every tick.
#[derive(Clone)]
pub struct FindingsStatsTask {
    store: Arc<dyn DocumentStore>,
    settings: Arc<dyn SettingsRepository>,
    indices: StatsIndices,
}

impl FindingsStatsTask {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        settings: Arc<dyn SettingsRepository>,
        indices: StatsIndices,
    ) -> Self {
        Self {
            store,
            settings,
            indices,
        }
    }

    /// Task definition for registering this task with a [`crate::TaskRegistry`].
    pub fn definition(self) -> TaskDefinition {
        TaskDefinition {
            task_type: FINDINGS_STATS_TASK_TYPE.to_string(),
            title: FINDINGS_STATS_TASK_TITLE.to_string(),
            runner: Arc::new(self),
        }
    }

    /// The scheduled instance, starting from an empty state.
    pub fn instance() -> anyhow::Result<TaskInstance> {
        Ok(TaskInstance {
            id: FINDINGS_STATS_TASK_ID.to_string(),
            task_type: FINDINGS_STATS_TASK_TYPE.to_string(),
            interval: parse_interval(FINDINGS_STATS_INTERVAL)?,
            state: TaskState::empty().to_stored(),
        })
    }

    /// Run one tick. Never fails: every outcome is folded into the returned
    /// state's health status.
    pub async fn run(&self, state: TaskState) -> TaskState {
        info!(task = FINDINGS_STATS_TASK_TYPE, runs = state.runs, "running task");
        let status = self.aggregate_latest_findings().await;
        state.next(status)
    }

    /// One fetch, aggregate and write pass, reported as a health status.
    pub async fn aggregate_latest_findings(&self) -> HealthStatus {
        let started = Instant::now();
        match self.try_aggregate(started).await {
            Ok(status) => status,
            Err(e) => {
                let kind = classify(&e);
                let message = format!("{e:#}");
                error!(
                    task = FINDINGS_STATS_TASK_TYPE,
                    kind = kind.as_str(),
                    duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                    error = %message,
                    "failure during task run"
                );
                kind.health()
            }
        }
    }

    #[instrument(skip(self, started), fields(task = FINDINGS_STATS_TASK_TYPE))]
    async fn try_aggregate(&self, started: Instant) -> anyhow::Result<HealthStatus> {
        let muted = self.settings.muted_rules().await.map_err(TaskError::Settings)?;
        let excluded = muted_rules_filter(&muted);

        let custom = self
            .search(&score_query(&self.indices.misconfigurations, &excluded))
            .await?;
        let full = self
            .search(&score_query(&self.indices.misconfigurations, &[]))
            .await?;
        let vulns = self
            .search(&vuln_trend_query(&self.indices.vulnerabilities))
            .await?;

        if custom.aggregations.is_none() && vulns.aggregations.is_none() {
            warn!(
                task = FINDINGS_STATS_TASK_TYPE,
                kind = ErrorKind::NoData.as_str(),
                "no data found in latest findings index"
            );
            return Ok(ErrorKind::NoData.health());
        }

        debug!(
            task = FINDINGS_STATS_TASK_TYPE,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "executed aggregation queries"
        );

        let now = Utc::now();
        let mut documents = Vec::new();

        let custom: Option<ScoreAggregation> =
            decode(&self.indices.misconfigurations, custom.aggregations)?;
        let full: Option<ScoreAggregation> =
            decode(&self.indices.misconfigurations, full.aggregations)?;
        let vulns: Option<VulnSeverityAggregation> =
            decode(&self.indices.vulnerabilities, vulns.aggregations)?;

        for (aggs, is_enabled_rules_score) in [(custom, true), (full, false)] {
            let Some(aggs) = aggs else { continue };
            let buckets = &aggs.score_by_namespace.buckets;
            for doc in score_documents(buckets, is_enabled_rules_score, now) {
                let doc = serde_json::to_value(doc).context("failed to encode score document")?;
                documents.push(doc);
            }
        }
        if let Some(vulns) = vulns {
            documents.push(
                serde_json::to_value(vulnerability_trend_document(&vulns, now))
                    .context("failed to encode vulnerability trend document")?,
            );
        }

        let index_started = Instant::now();
        self.write_all(&documents).await?;

        debug!(
            task = FINDINGS_STATS_TASK_TYPE,
            documents = documents.len(),
            duration_ms = index_started.elapsed().as_secs_f64() * 1000.0,
            "finished saving results"
        );
        debug!(
            task = FINDINGS_STATS_TASK_TYPE,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "finished run"
        );

        Ok(HealthStatus::Ok)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TaskError> {
        self.store
            .search(request)
            .await
            .map_err(|source| TaskError::Query {
                index: request.index.clone(),
                source,
            })
    }

    /// Index every document concurrently. All writes settle before the first
    /// failure is reported.
    async fn write_all(&self, documents: &[Value]) -> Result<(), TaskError> {
        let index = self.indices.scores.as_str();
        let results = join_all(documents.iter().map(|doc| self.store.index(index, doc))).await;

        let total = results.len();
        let mut errors: Vec<anyhow::Error> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            return Ok(());
        }

        let failed = errors.len();
        Err(TaskError::Index {
            index: index.to_string(),
            failed,
            total,
            source: errors.swap_remove(0),
        })
    }
}

fn decode<T: DeserializeOwned>(
    index: &str,
    aggregations: Option<Value>,
) -> Result<Option<T>, TaskError> {
    aggregations
        .map(serde_json::from_value)
        .transpose()
        .map_err(|source| TaskError::Decode {
            index: index.to_string(),
            source,
        })
}

#[async_trait]
impl TaskRunner for FindingsStatsTask {
    /// A stored state that cannot be decoded is replaced: the tick restarts
    /// the count from empty and reports `error`, so the next tick recovers.
    async fn run(&self, state: &Value) -> anyhow::Result<Value> {
        let next = match TaskState::from_stored(state) {
            Ok(state) => FindingsStatsTask::run(self, state).await,
            Err(e) => {
                error!(
                    task = FINDINGS_STATS_TASK_TYPE,
                    error = %format!("{e:#}"),
                    "discarding unreadable task state"
                );
                TaskState::empty().next(HealthStatus::Error)
            }
        };
        Ok(next.to_stored())
    }
}
