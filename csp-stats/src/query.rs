use serde_json::{Value, json};

use crate::store::SearchRequest;

pub const SEVERITIES: [&str; 4] = ["CRITICAL", "HIGH", "MEDIUM", "LOW"];

const SAFE_POSTURE_TYPE_SCRIPT: &str = "\
if (doc.containsKey('rule.benchmark.posture_type') && doc['rule.benchmark.posture_type'].size() > 0) {
  emit(doc['rule.benchmark.posture_type'].value);
} else {
  emit('kspm');
}";

const ASSET_IDENTIFIER_SCRIPT: &str = "\
def postureType = 'kspm';
if (doc.containsKey('rule.benchmark.posture_type') && doc['rule.benchmark.posture_type'].size() > 0) {
  postureType = doc['rule.benchmark.posture_type'].value;
}
def field = postureType == 'cspm' ? 'cloud.account.id' : 'cluster_id';
if (doc.containsKey(field) && doc[field].size() > 0) {
  emit(doc[field].value);
}";

fn runtime_mappings() -> Value {
    json!({
        "safe_posture_type": {
            "type": "keyword",
            "script": { "source": SAFE_POSTURE_TYPE_SCRIPT }
        },
        "asset_identifier": {
            "type": "keyword",
            "script": { "source": ASSET_IDENTIFIER_SCRIPT }
        }
    })
}

/// total / passed / failed sub-aggregations shared by every score level.
fn evaluation_counts() -> serde_json::Map<String, Value> {
    let mut counts = serde_json::Map::new();
    counts.insert(
        "total_findings".into(),
        json!({ "value_count": { "field": "result.evaluation" } }),
    );
    counts.insert(
        "passed_findings".into(),
        json!({ "filter": { "term": { "result.evaluation": "passed" } } }),
    );
    counts.insert(
        "failed_findings".into(),
        json!({ "filter": { "term": { "result.evaluation": "failed" } } }),
    );
    counts
}

fn with_counts(mut extra: serde_json::Map<String, Value>) -> Value {
    extra.extend(evaluation_counts());
    Value::Object(extra)
}

fn score_by_policy_template() -> Value {
    let mut per_template = serde_json::Map::new();
    per_template.insert(
        "score_by_cluster_id".into(),
        json!({
            "terms": { "field": "asset_identifier" },
            "aggs": with_counts(serde_json::Map::new())
        }),
    );
    per_template.insert(
        "score_by_benchmark_id".into(),
        json!({
            "terms": { "field": "rule.benchmark.id" },
            "aggs": {
                "benchmark_versions": {
                    "terms": { "field": "rule.benchmark.version" },
                    "aggs": with_counts(serde_json::Map::new())
                }
            }
        }),
    );

    json!({
        "score_by_policy_template": {
            "terms": { "field": "safe_posture_type" },
            "aggs": with_counts(per_template)
        }
    })
}

/// Score aggregation over the last day of findings. `excluded` goes into
/// `must_not` verbatim; pass an empty slice for the full score.
pub fn score_query(index: &str, excluded: &[Value]) -> SearchRequest {
    SearchRequest {
        index: index.to_string(),
        body: json!({
            "size": 0,
            "runtime_mappings": runtime_mappings(),
            "query": {
                "bool": {
                    "must": [
                        { "range": { "@timestamp": { "gte": "now-1d", "lte": "now" } } }
                    ],
                    "must_not": excluded
                }
            },
            "aggs": {
                "score_by_namespace": {
                    "terms": { "field": "data_stream.namespace" },
                    "aggs": score_by_policy_template()
                }
            }
        }),
    }
}

fn severity_filters() -> serde_json::Map<String, Value> {
    SEVERITIES
        .iter()
        .map(|severity| {
            (
                severity.to_lowercase(),
                json!({ "filter": { "term": { "vulnerability.severity": severity } } }),
            )
        })
        .collect()
}

pub fn vuln_trend_query(index: &str) -> SearchRequest {
    let mut per_account = serde_json::Map::new();
    per_account.insert(
        "cloud_account_id".into(),
        json!({ "terms": { "field": "cloud.account.id", "size": 1 } }),
    );
    per_account.insert(
        "cloud_account_name".into(),
        json!({ "terms": { "field": "cloud.account.name", "size": 1 } }),
    );
    per_account.extend(severity_filters());

    let mut aggs = severity_filters();
    aggs.insert(
        "vulnerabilities_stats_by_cloud_account".into(),
        json!({
            "terms": { "field": "cloud.account.id" },
            "aggs": per_account
        }),
    );

    SearchRequest {
        index: index.to_string(),
        body: json!({
            "size": 0,
            "query": { "match_all": {} },
            "aggs": aggs
        }),
    }
}
