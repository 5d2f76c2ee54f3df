use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Executes one tick of a task: takes the stored state, returns the next one.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, state: &Value) -> anyhow::Result<Value>;
}

pub struct TaskDefinition {
    pub task_type: String,
    pub title: String,
    pub runner: Arc<dyn TaskRunner>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskInstance {
    pub id: String,
    pub task_type: String,
    pub interval: Duration,
    pub state: Value,
}

struct Scheduled {
    runner: Arc<dyn TaskRunner>,
    // Held across a tick so ticks of one id never overlap.
    state: Arc<Mutex<Value>>,
    handle: JoinHandle<()>,
}

impl Drop for Scheduled {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Registry of task definitions and the loops driving scheduled instances.
/// Created once at startup and passed to whatever needs to schedule work.
#[derive(Default)]
pub struct TaskRegistry {
    definitions: HashMap<String, TaskDefinition>,
    scheduled: Mutex<HashMap<String, Scheduled>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: TaskDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.task_type) {
            bail!("task type {} is already registered", definition.task_type);
        }
        info!(task = %definition.task_type, title = %definition.title, "registered task");
        self.definitions.insert(definition.task_type.clone(), definition);
        Ok(())
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.definitions.contains_key(task_type)
    }

    /// Start ticking `instance` on its interval. The first tick fires
    /// immediately.
    #[instrument(skip(self, instance), fields(id = %instance.id, task = %instance.task_type))]
    pub async fn schedule(&self, instance: TaskInstance) -> Result<()> {
        let definition = self
            .definitions
            .get(&instance.task_type)
            .with_context(|| format!("task type {} is not registered", instance.task_type))?;
        if instance.interval.is_zero() {
            bail!("task {} has a zero interval", instance.id);
        }

        let mut scheduled = self.scheduled.lock().await;
        if scheduled.contains_key(&instance.id) {
            bail!("task {} is already scheduled", instance.id);
        }

        let runner = definition.runner.clone();
        let state = Arc::new(Mutex::new(instance.state));
        let handle = tokio::spawn(tick_loop(
            instance.id.clone(),
            instance.interval,
            runner.clone(),
            state.clone(),
        ));

        info!(interval_secs = instance.interval.as_secs(), "scheduled task");
        scheduled.insert(
            instance.id,
            Scheduled {
                runner,
                state,
                handle,
            },
        );
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        if self.scheduled.lock().await.remove(id).is_none() {
            bail!("task {id} is not scheduled");
        }
        info!(id, "removed task");
        Ok(())
    }

    /// Schedule, logging instead of returning a failure.
    pub async fn schedule_safe(&self, instance: TaskInstance) {
        let id = instance.id.clone();
        if let Err(e) = self.schedule(instance).await {
            error!(id = %id, error = %e, "failed to schedule task");
        }
    }

    /// Remove, logging instead of returning a failure.
    pub async fn remove_safe(&self, id: &str) {
        if let Err(e) = self.remove(id).await {
            error!(id, error = %e, "failed to remove task");
        }
    }

    /// Run one tick of a scheduled task right away, waiting for any tick
    /// already in flight. Returns the new state.
    pub async fn run_now(&self, id: &str) -> Result<Value> {
        let (runner, state) = {
            let scheduled = self.scheduled.lock().await;
            let task = scheduled
                .get(id)
                .with_context(|| format!("task {id} is not scheduled"))?;
            (task.runner.clone(), task.state.clone())
        };
        tick(id, runner.as_ref(), &state).await;
        Ok(state.lock().await.clone())
    }

    /// Last state persisted for a scheduled task.
    pub async fn state(&self, id: &str) -> Option<Value> {
        let state = self.scheduled.lock().await.get(id)?.state.clone();
        let value = state.lock().await.clone();
        Some(value)
    }

    pub async fn scheduled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scheduled.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn shutdown(&self) {
        for (id, _task) in self.scheduled.lock().await.drain() {
            debug!(id = %id, "stopped task");
        }
    }
}

async fn tick_loop(
    id: String,
    every: Duration,
    runner: Arc<dyn TaskRunner>,
    state: Arc<Mutex<Value>>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        tick(&id, runner.as_ref(), &state).await;
    }
}

/// A runner error leaves the stored state untouched; the next tick retries.
async fn tick(id: &str, runner: &dyn TaskRunner, state: &Mutex<Value>) {
    let mut current = state.lock().await;
    match runner.run(&current).await {
        Ok(next) => {
            debug!(id, state = %next, "tick complete");
            *current = next;
        }
        Err(e) => warn!(id, error = %e, "tick failed, keeping previous state"),
    }
}

/// Parse an interval such as `30s`, `5m` or `1h`.
pub fn parse_interval(spec: &str) -> Result<Duration> {
    let spec = spec.trim();
    let Some(unit) = spec.chars().last() else {
        bail!("empty interval");
    };
    let number = &spec[..spec.len() - unit.len_utf8()];
    let n: u64 = number
        .parse()
        .with_context(|| format!("invalid interval '{spec}'"))?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        other => bail!("invalid interval unit '{other}' in '{spec}' (valid: s, m, h)"),
    };
    let secs = n
        .checked_mul(multiplier)
        .with_context(|| format!("interval '{spec}' is too large"))?;
    if secs == 0 {
        bail!("interval '{spec}' must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}
