use super::types::{JobId, JobStatus, QueuedJob};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for job queue implementations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for processing
    async fn enqueue(&self, job: QueuedJob) -> Result<JobId>;

    /// Dequeue the next available job
    async fn dequeue(&self, worker_id: &str) -> Result<Option<QueuedJob>>;

    /// Get job status
    async fn get_status(&self, job_id: &JobId) -> Result<Option<JobStatus>>;

    /// Update job status
    async fn update_status(&self, job_id: &JobId, status: JobStatus) -> Result<()>;

    /// Cancel a job
    async fn cancel_job(&self, job_id: &JobId) -> Result<bool>;

    /// Get job statistics
    async fn get_stats(&self) -> Result<QueueStats>;

    /// Clean up completed/failed jobs older than the specified time
    async fn cleanup_old_jobs(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Get jobs by status
    async fn get_jobs_by_status(&self, status: super::types::JobState, limit: Option<u32>) -> Result<Vec<QueuedJob>>;

    /// Health check
    async fn health_check(&self) -> Result<bool>;
}

/// Statistics about the job queue
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueStats {
    pub total_jobs: u64,
    pub queued_jobs: u64,
    pub processing_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub retrying_jobs: u64,
    pub cancelled_jobs: u64,
    pub average_processing_time: Option<chrono::Duration>,
    pub jobs_per_minute: Option<f64>,
    pub error_rate: Option<f64>, // Percentage of failed jobs
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            total_jobs: 0,
            queued_jobs: 0,
            processing_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            retrying_jobs: 0,
            cancelled_jobs: 0,
            average_processing_time: None,
            jobs_per_minute: None,
            error_rate: None,
        }
    }
}

impl QueueStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            self.completed_jobs as f64 / self.total_jobs as f64
        }
    }

    pub fn is_healthy(&self) -> bool {
        // Consider queue healthy if:
        // - Error rate is below 10%
        // - Not too many jobs stuck in processing (might indicate crashed workers)
        let error_rate = self.error_rate.unwrap_or(0.0);
        let processing_ratio = if self.total_jobs > 0 {
            self.processing_jobs as f64 / self.total_jobs as f64
        } else {
            0.0
        };

        error_rate < 0.10 && processing_ratio < 0.50
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_stats() {
        let stats = QueueStats {
            total_jobs: 100,
            queued_jobs: 10,
            processing_jobs: 5,
            completed_jobs: 80,
            failed_jobs: 3,
            retrying_jobs: 2,
            cancelled_jobs: 0,
            average_processing_time: None,
            jobs_per_minute: None,
            error_rate: Some(0.05), // 5%
        };

        assert_eq!(stats.success_rate(), 0.80);
        assert!(stats.is_healthy()); // 5% error rate is acceptable
    }
}
