use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A benchmark rule the user has excluded from the enabled-rules score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutedRule {
    pub benchmark_id: String,
    pub benchmark_version: String,
    pub rule_number: String,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn muted_rules(&self) -> anyhow::Result<Vec<MutedRule>>;
}

/// Settings served from a fixed list, typically loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    muted: Vec<MutedRule>,
}

impl StaticSettings {
    pub fn new(muted: Vec<MutedRule>) -> Self {
        Self { muted }
    }
}

#[async_trait]
impl SettingsRepository for StaticSettings {
    async fn muted_rules(&self) -> anyhow::Result<Vec<MutedRule>> {
        Ok(self.muted.clone())
    }
}

/// One `must_not` clause per muted rule, matching on benchmark id, version
/// and rule number together.
pub fn muted_rules_filter(rules: &[MutedRule]) -> Vec<Value> {
    rules
        .iter()
        .map(|rule| {
            json!({
                "bool": {
                    "must": [
                        { "term": { "rule.benchmark.id": rule.benchmark_id } },
                        { "term": { "rule.benchmark.version": rule.benchmark_version } },
                        { "term": { "rule.benchmark.rule_number": rule.rule_number } }
                    ]
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, version: &str, number: &str) -> MutedRule {
        MutedRule {
            benchmark_id: id.into(),
            benchmark_version: version.into(),
            rule_number: number.into(),
        }
    }

    #[test]
    fn filter_empty_for_no_rules() {
        assert!(muted_rules_filter(&[]).is_empty());
    }

    #[test]
    fn filter_one_clause_per_rule() {
        let filters = muted_rules_filter(&[
            rule("cis_k8s", "v1.0.1", "1.1.1"),
            rule("cis_aws", "v1.5.0", "2.1"),
        ]);
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters[0],
            json!({
                "bool": {
                    "must": [
                        { "term": { "rule.benchmark.id": "cis_k8s" } },
                        { "term": { "rule.benchmark.version": "v1.0.1" } },
                        { "term": { "rule.benchmark.rule_number": "1.1.1" } }
                    ]
                }
            })
        );
        assert_eq!(filters[1]["bool"]["must"][0]["term"]["rule.benchmark.id"], "cis_aws");
    }

    #[tokio::test]
    async fn static_settings_returns_configured_rules() {
        let settings = StaticSettings::new(vec![rule("cis_gcp", "v2.0.0", "3.4")]);
        let rules = settings.muted_rules().await.unwrap();
        assert_eq!(rules, vec![rule("cis_gcp", "v2.0.0", "3.4")]);
    }

    #[tokio::test]
    async fn default_static_settings_is_empty() {
        let rules = StaticSettings::default().muted_rules().await.unwrap();
        assert!(rules.is_empty());
    }
}
