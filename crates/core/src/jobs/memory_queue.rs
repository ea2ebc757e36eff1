//! In-process FIFO job queue.
//!
//! A single ingestion node owns its whole job stream end to end, so a Redis-backed
//! priority queue buys nothing but a network hop. This queue implements the
//! `JobQueue` trait over a `tokio::sync::Mutex`-guarded `VecDeque` plus a status map.

use super::traits::{JobQueue, QueueStats};
use super::types::{JobId, JobState, JobStatus, QueuedJob};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<QueuedJob>,
    statuses: HashMap<JobId, JobStatus>,
}

/// FIFO `JobQueue` backed by process memory. Jobs do not survive a restart; the
/// scheduler that owns this queue re-seeds recurring work from `cron` state on boot.
#[derive(Debug)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<JobId> {
        let mut inner = self.inner.lock().await;
        let id = job.id.clone();
        inner.statuses.insert(id.clone(), job.status.clone());
        inner.queue.push_back(job);
        Ok(id)
    }

    async fn dequeue(&self, _worker_id: &str) -> Result<Option<QueuedJob>> {
        let mut inner = self.inner.lock().await;
        let position = inner.queue.iter().position(|j| j.is_ready_to_run());
        let Some(position) = position else {
            return Ok(None);
        };
        let mut job = inner.queue.remove(position).expect("position was just located");
        job.mark_processing();
        inner.statuses.insert(job.id.clone(), job.status.clone());
        Ok(Some(job))
    }

    async fn get_status(&self, job_id: &JobId) -> Result<Option<JobStatus>> {
        let inner = self.inner.lock().await;
        Ok(inner.statuses.get(job_id).cloned())
    }

    async fn update_status(&self, job_id: &JobId, status: JobStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.statuses.insert(job_id.clone(), status);
        Ok(())
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if let Some(position) = inner.queue.iter().position(|j| &j.id == job_id) {
            let mut job = inner.queue.remove(position).expect("position was just located");
            job.mark_cancelled();
            inner.statuses.insert(job_id.clone(), job.status.clone());
            return Ok(true);
        }
        if let Some(status) = inner.statuses.get_mut(job_id) {
            if !status.is_terminal() {
                status.state = JobState::Cancelled;
                status.completed_at = Some(Utc::now());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get_stats(&self) -> Result<QueueStats> {
        let inner = self.inner.lock().await;
        let mut stats = QueueStats::default();
        for status in inner.statuses.values() {
            stats.total_jobs += 1;
            match status.state {
                JobState::Queued => stats.queued_jobs += 1,
                JobState::Processing => stats.processing_jobs += 1,
                JobState::Completed => stats.completed_jobs += 1,
                JobState::Failed => stats.failed_jobs += 1,
                JobState::Retrying => stats.retrying_jobs += 1,
                JobState::Cancelled => stats.cancelled_jobs += 1,
            }
        }
        if stats.total_jobs > 0 {
            stats.error_rate = Some(stats.failed_jobs as f64 / stats.total_jobs as f64);
        }
        Ok(stats)
    }

    async fn cleanup_old_jobs(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.statuses.len();
        inner
            .statuses
            .retain(|_, status| !(status.is_terminal() && status.created_at < older_than));
        Ok((before - inner.statuses.len()) as u64)
    }

    async fn get_jobs_by_status(&self, status: JobState, limit: Option<u32>) -> Result<Vec<QueuedJob>> {
        let inner = self.inner.lock().await;
        let limit = limit.unwrap_or(u32::MAX) as usize;
        Ok(inner
            .queue
            .iter()
            .filter(|job| job.status.state == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{JobPriority, SerializableJob};
    use std::collections::HashMap as StdHashMap;

    struct PingJob;
    impl SerializableJob for PingJob {
        fn job_type(&self) -> &'static str {
            "ping"
        }
        fn serialize(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
            Ok(serde_json::json!({}))
        }
        fn deserialize(
            _data: &serde_json::Value,
        ) -> std::result::Result<Box<dyn SerializableJob>, serde_json::Error> {
            Ok(Box::new(PingJob))
        }
        fn priority(&self) -> JobPriority {
            JobPriority::Normal
        }
        fn metadata(&self) -> StdHashMap<String, serde_json::Value> {
            StdHashMap::new()
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_returns_same_job() {
        let queue = MemoryJobQueue::new();
        let job = QueuedJob::new(&PingJob).unwrap();
        let id = queue.enqueue(job).await.unwrap();

        let dequeued = queue.dequeue("worker-1").await.unwrap().unwrap();
        assert_eq!(dequeued.id, id);
        assert_eq!(dequeued.status.state, JobState::Processing);
    }

    #[tokio::test]
    async fn dequeue_on_empty_queue_returns_none() {
        let queue = MemoryJobQueue::new();
        assert!(queue.dequeue("worker-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_removes_queued_job() {
        let queue = MemoryJobQueue::new();
        let job = QueuedJob::new(&PingJob).unwrap();
        let id = queue.enqueue(job).await.unwrap();

        assert!(queue.cancel_job(&id).await.unwrap());
        assert!(queue.dequeue("worker-1").await.unwrap().is_none());
        let status = queue.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn stats_reflect_enqueued_jobs() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(QueuedJob::new(&PingJob).unwrap()).await.unwrap();
        queue.enqueue(QueuedJob::new(&PingJob).unwrap()).await.unwrap();

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.queued_jobs, 2);
    }
}
