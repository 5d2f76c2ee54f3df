use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregations::{
    CountsBucket, EvaluationCounts, NamespaceBucket, SeverityCounts, VulnSeverityAggregation,
};

pub const VULN_MGMT_POLICY_TEMPLATE: &str = "vuln_mgmt";
pub const UNSPECIFIED_NAMESPACE: &str = "unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreCounts {
    pub total_findings: u64,
    pub passed_findings: u64,
    pub failed_findings: u64,
}

impl From<&EvaluationCounts> for ScoreCounts {
    fn from(counts: &EvaluationCounts) -> Self {
        Self {
            total_findings: counts.total_findings.value,
            passed_findings: counts.passed_findings.doc_count,
            failed_findings: counts.failed_findings.doc_count,
        }
    }
}

/// Posture score snapshot for one namespace and policy template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub policy_template: String,
    pub passed_findings: u64,
    pub failed_findings: u64,
    pub total_findings: u64,
    pub score_by_cluster_id: BTreeMap<String, ScoreCounts>,
    pub score_by_benchmark_id: BTreeMap<String, BTreeMap<String, ScoreCounts>>,
    pub is_enabled_rules_score: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudAccountStats {
    pub cloud_account_id: String,
    pub cloud_account_name: String,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilityTrendDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub policy_template: &'static str,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub vulnerabilities_stats_by_cloud_account: BTreeMap<String, CloudAccountStats>,
}

/// Field names may not contain dots, so `v1.2.0` is stored as `v1_2_0`.
pub fn benchmark_version_key(version: &str) -> String {
    version.replace('.', "_")
}

fn counts_by_key(
    buckets: &[CountsBucket],
    key: impl Fn(&str) -> String,
) -> BTreeMap<String, ScoreCounts> {
    buckets
        .iter()
        .map(|bucket| (key(&bucket.key), ScoreCounts::from(&bucket.counts)))
        .collect()
}

/// One document per namespace × policy template bucket.
pub fn score_documents(
    namespaces: &[NamespaceBucket],
    is_enabled_rules_score: bool,
    timestamp: DateTime<Utc>,
) -> Vec<ScoreDocument> {
    namespaces
        .iter()
        .flat_map(|ns| {
            let namespace = if ns.key.is_empty() {
                UNSPECIFIED_NAMESPACE.to_string()
            } else {
                ns.key.clone()
            };

            ns.score_by_policy_template.buckets.iter().map(move |tpl| {
                let counts = ScoreCounts::from(&tpl.counts);
                let score_by_benchmark_id = tpl
                    .score_by_benchmark_id
                    .buckets
                    .iter()
                    .map(|benchmark| {
                        let versions = &benchmark.benchmark_versions.buckets;
                        (
                            benchmark.key.clone(),
                            counts_by_key(versions, benchmark_version_key),
                        )
                    })
                    .collect();

                ScoreDocument {
                    timestamp,
                    namespace: namespace.clone(),
                    policy_template: tpl.key.clone(),
                    passed_findings: counts.passed_findings,
                    failed_findings: counts.failed_findings,
                    total_findings: counts.total_findings,
                    score_by_cluster_id: counts_by_key(
                        &tpl.score_by_cluster_id.buckets,
                        str::to_string,
                    ),
                    score_by_benchmark_id,
                    is_enabled_rules_score,
                }
            })
        })
        .collect()
}

pub fn vulnerability_trend_document(
    aggs: &VulnSeverityAggregation,
    timestamp: DateTime<Utc>,
) -> VulnerabilityTrendDocument {
    let SeverityCounts {
        critical,
        high,
        medium,
        low,
    } = aggs.severities;

    let by_account = aggs
        .vulnerabilities_stats_by_cloud_account
        .buckets
        .iter()
        .map(|account| {
            let name = account
                .cloud_account_name
                .buckets
                .first()
                .map(|b| b.key.clone())
                .unwrap_or_default();
            (
                account.key.clone(),
                CloudAccountStats {
                    cloud_account_id: account.key.clone(),
                    cloud_account_name: name,
                    critical: account.severities.critical.doc_count,
                    high: account.severities.high.doc_count,
                    medium: account.severities.medium.doc_count,
                    low: account.severities.low.doc_count,
                },
            )
        })
        .collect();

    VulnerabilityTrendDocument {
        timestamp,
        policy_template: VULN_MGMT_POLICY_TEMPLATE,
        critical: critical.doc_count,
        high: high.doc_count,
        medium: medium.doc_count,
        low: low.doc_count,
        vulnerabilities_stats_by_cloud_account: by_account,
    }
}
