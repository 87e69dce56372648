use crate::domain::ports::{Scheduler, Task};
use crate::utils::error::{ExtenderError, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{error, trace};

/// 在呼叫端執行緒上直接執行
#[derive(Debug, Clone, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn submit(&self, task: Task) {
        task();
    }
}

/// tokio blocking pool 上的有界 worker pool
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl TokioScheduler {
    pub fn new(handle: Handle, pool_size: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// 使用目前的 tokio runtime
    pub fn current(pool_size: usize) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ExtenderError::illegal_state(format!("no tokio runtime: {}", e)))?;
        Ok(Self::new(handle, pool_size))
    }
}

impl Scheduler for TokioScheduler {
    fn submit(&self, task: Task) {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker pool is closed, dropping task: {}", e);
                    return;
                }
            };
            trace!("Running deployment task");
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                error!("Deployment task panicked: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_inline_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        InlineScheduler.submit(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_scheduler_runs_tasks() {
        let scheduler = TokioScheduler::current(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let c = Arc::clone(&counter);
            scheduler.submit(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_current_without_runtime() {
        assert!(TokioScheduler::current(1).is_err());
    }
}
