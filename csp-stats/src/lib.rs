pub mod aggregations;
pub mod documents;
pub mod error;
pub mod query;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod store;
pub mod task;

pub use error::{ErrorKind, TaskError, classify};
pub use scheduler::{TaskDefinition, TaskInstance, TaskRegistry, TaskRunner, parse_interval};
pub use settings::{MutedRule, SettingsRepository, StaticSettings};
pub use state::{HealthStatus, TaskState};
pub use store::{Credentials, DocumentStore, ElasticsearchClient, SearchRequest, SearchResponse};
pub use task::{FindingsStatsTask, StatsIndices};
