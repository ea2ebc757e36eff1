pub mod memory_queue;
pub mod scheduler;
pub mod traits;
pub mod types;

pub use memory_queue::MemoryJobQueue;
pub use scheduler::{CollectionOutcome, CollectionRunner, LifecycleSweeper, Scheduler, SchedulerConfig};
pub use traits::JobQueue;
pub use types::{JobId, JobPriority, JobState, JobStatus, SerializableJob};
