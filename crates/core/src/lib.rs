pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod security;
pub mod store;
pub mod types;
pub mod utils;

pub use cache::Cache;
pub use config::{CacheConfig, Config, CorsConfig, DatabaseConfig, VaultConfig};
pub use error::{Error, ErrorCode, ErrorContext, ErrorMetrics, Result};
pub use jobs::{
    CollectionOutcome, CollectionRunner, LifecycleSweeper, MemoryJobQueue, Scheduler, SchedulerConfig,
};
pub use metrics::{MetricsRegistry, MetricsService};
pub use security::{Vault, VaultError};
pub use store::{BreakdownEntry, ResolutionDetail, Store, StatsSnapshot, TimelinePoint};
pub use types::*;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
