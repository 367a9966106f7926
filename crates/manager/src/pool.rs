use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// 工作池的进度计数
#[derive(Debug, Default)]
pub struct PoolProgress {
    pub total: AtomicUsize,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
}

impl PoolProgress {
    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.total.load(Ordering::SeqCst),
            self.started.load(Ordering::SeqCst),
            self.finished.load(Ordering::SeqCst),
        )
    }
}

/// # Summary
/// 固定大小的工作池，用于按候选并发执行打分、论点与合议。
///
/// # Invariants
/// - 同一时刻最多 `size` 个任务在执行。
/// - `run` 在全部任务结束后才返回，阶段之间不会重叠。
/// - 结果与输入按下标对齐；任务 panic 或被取消时对应位置为 `None`。
pub struct WorkerPool {
    size: usize,
    progress: Arc<PoolProgress>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            progress: Arc::new(PoolProgress::default()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn progress(&self) -> Arc<PoolProgress> {
        self.progress.clone()
    }

    /// # Summary
    /// 并发处理一批输入。
    ///
    /// # Logic
    /// 1. 每个输入一个任务，先获取信号量许可再执行。
    /// 2. 等待 JoinSet 中的全部任务，按下标回填结果。
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<Option<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let count = items.len();
        self.progress.total.fetch_add(count, Ordering::SeqCst);
        let semaphore = Arc::new(Semaphore::new(self.size));
        let task = Arc::new(task);
        let mut set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let task = task.clone();
            let progress = self.progress.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                progress.started.fetch_add(1, Ordering::SeqCst);
                let output = task(item).await;
                progress.finished.fetch_add(1, Ordering::SeqCst);
                (index, output)
            });
        }

        let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, output)) => {
                    if let Some(slot) = results.get_mut(index) {
                        *slot = Some(output);
                    }
                }
                Err(e) => tracing::error!(error = %e, "worker task did not complete"),
            }
        }
        results
    }
}
