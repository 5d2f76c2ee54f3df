use std::fmt;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// State carried between ticks of the findings-stats task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default)]
    pub runs: u64,
    #[serde(default)]
    pub health_status: HealthStatus,
}

impl TaskState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// State after one more completed tick.
    pub fn next(&self, health_status: HealthStatus) -> Self {
        Self {
            runs: self.runs.saturating_add(1),
            health_status,
        }
    }

    /// Decode a stored state document, upgrading older shapes to the latest
    /// schema. Missing fields take their empty-state values.
    pub fn from_stored(value: &Value) -> anyhow::Result<Self> {
        if value.is_null() {
            return Ok(Self::empty());
        }
        if !value.is_object() {
            bail!("stored task state must be an object, got: {value}");
        }
        serde_json::from_value(value.clone()).context("failed to decode stored task state")
    }

    pub fn to_stored(&self) -> Value {
        serde_json::json!({
            "runs": self.runs,
            "health_status": self.health_status,
        })
    }
}
