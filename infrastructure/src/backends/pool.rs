//! Bounded worker pool for streaming jobs.
//!
//! A thin wrapper around a semaphore: `spawn` hands the job to the runtime
//! immediately, but the job body only runs once it holds a permit, and the
//! permit is held until the job completes. With a pool of size N at most N
//! streams run concurrently, and each stream's fragment sequence reaches
//! the correlation queue contiguously: a waiting job cannot interleave
//! with a running one.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Run `job` once a pool slot frees up, holding the slot to completion.
    pub fn spawn<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // Closed semaphore means the pool owner is gone; drop the job.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn pool_of_one_keeps_job_output_contiguous() {
        let pool = WorkerPool::new(1);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let mut handles = Vec::new();
        for job in ["first", "second"] {
            let tx = tx.clone();
            handles.push(pool.spawn(async move {
                for i in 0..3 {
                    tx.send(format!("{job}-{i}")).unwrap();
                    // Yield so an interleaving bug would actually show up.
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }));
        }
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut seen = Vec::new();
        while let Some(item) = rx.recv().await {
            seen.push(item);
        }
        assert_eq!(seen.len(), 6);
        // Each job's three items form one contiguous run.
        let first_job = seen[0].split('-').next().unwrap().to_string();
        assert!(seen[..3].iter().all(|s| s.starts_with(&first_job)));
        assert!(seen[3..].iter().all(|s| !s.starts_with(&first_job)));
    }

    #[tokio::test]
    async fn jobs_run_concurrently_up_to_pool_size() {
        let pool = WorkerPool::new(2);
        let (tx, mut rx) = mpsc::unbounded_channel::<&str>();

        let slow_tx = tx.clone();
        let slow = pool.spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            slow_tx.send("slow").unwrap();
        });
        let fast_tx = tx.clone();
        let fast = pool.spawn(async move {
            fast_tx.send("fast").unwrap();
        });
        drop(tx);

        fast.await.unwrap();
        slow.await.unwrap();
        assert_eq!(rx.recv().await, Some("fast"));
        assert_eq!(rx.recv().await, Some("slow"));
    }
}
