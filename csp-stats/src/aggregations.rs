//! Typed view of the aggregation responses produced by the queries in
//! [`crate::query`].

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Buckets<T> {
    #[serde(default = "Vec::new")]
    pub buckets: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self { buckets: vec![] }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DocCount {
    #[serde(default)]
    pub doc_count: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ValueCount {
    #[serde(default)]
    pub value: u64,
}

/// The total / passed / failed triple found at every score level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationCounts {
    #[serde(default)]
    pub total_findings: ValueCount,
    #[serde(default)]
    pub passed_findings: DocCount,
    #[serde(default)]
    pub failed_findings: DocCount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreAggregation {
    #[serde(default)]
    pub score_by_namespace: Buckets<NamespaceBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceBucket {
    #[serde(deserialize_with = "key_as_string")]
    pub key: String,
    #[serde(default)]
    pub score_by_policy_template: Buckets<PolicyTemplateBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyTemplateBucket {
    #[serde(deserialize_with = "key_as_string")]
    pub key: String,
    #[serde(flatten)]
    pub counts: EvaluationCounts,
    #[serde(default)]
    pub score_by_cluster_id: Buckets<CountsBucket>,
    #[serde(default)]
    pub score_by_benchmark_id: Buckets<BenchmarkBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountsBucket {
    #[serde(deserialize_with = "key_as_string")]
    pub key: String,
    #[serde(flatten)]
    pub counts: EvaluationCounts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkBucket {
    #[serde(deserialize_with = "key_as_string")]
    pub key: String,
    #[serde(default)]
    pub benchmark_versions: Buckets<CountsBucket>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub critical: DocCount,
    #[serde(default)]
    pub high: DocCount,
    #[serde(default)]
    pub medium: DocCount,
    #[serde(default)]
    pub low: DocCount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VulnSeverityAggregation {
    #[serde(flatten)]
    pub severities: SeverityCounts,
    #[serde(default)]
    pub vulnerabilities_stats_by_cloud_account: Buckets<CloudAccountBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudAccountBucket {
    #[serde(deserialize_with = "key_as_string")]
    pub key: String,
    #[serde(default)]
    pub cloud_account_name: Buckets<KeyBucket>,
    #[serde(flatten)]
    pub severities: SeverityCounts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyBucket {
    #[serde(deserialize_with = "key_as_string")]
    pub key: String,
}

/// Terms bucket keys can come back as numbers; the documents always key by
/// string.
fn key_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
