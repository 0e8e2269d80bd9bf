//! Worker pool for shard-level jobs.
//!
//! Shards are independent units of work with disjoint output files, so the
//! pool is a plain job queue: N worker tasks drain an async-channel, each
//! job runs its (blocking, file-I/O-bound) closure on the blocking thread
//! pool, and the outcome is reported on a result channel. Cancellation is
//! cooperative: a cancelled pool stops picking up queued jobs.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One shard's worth of work. The closure owns everything it needs and
/// returns the value reported on the pool's result channel.
pub struct ShardJob<T> {
    pub shard: u32,
    pub run: Box<dyn FnOnce() -> T + Send + 'static>,
}

/// A fixed-size pool of worker tasks processing [`ShardJob`]s.
///
/// Submit jobs via [`submit`](ShardPool::submit), read `(shard, outcome)`
/// pairs from [`results`](ShardPool::results), then [`shutdown`] to close
/// the queue and wait for the workers to drain.
pub struct ShardPool<T: Send + 'static> {
    job_tx: async_channel::Sender<ShardJob<T>>,
    result_rx: async_channel::Receiver<(u32, T)>,
    pool_handle: JoinHandle<()>,
}

impl<T: Send + 'static> ShardPool<T> {
    pub fn new(num_workers: usize, cancel: CancellationToken) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<ShardJob<T>>();
        let (result_tx, result_rx) = async_channel::unbounded::<(u32, T)>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    result_tx.clone(),
                    cancel.clone(),
                )));
            }
            // Workers hold the remaining clones; drop ours so closing the
            // job sender lets them drain and exit.
            drop(job_rx);
            drop(result_tx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            result_rx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: ShardJob<T>) {
        let _ = self.job_tx.send(job).await;
    }

    /// Cloneable receiver for `(shard, outcome)` pairs.
    pub fn results(&self) -> async_channel::Receiver<(u32, T)> {
        self.result_rx.clone()
    }

    /// Close the queue and wait for all workers to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop<T: Send + 'static>(
    job_rx: async_channel::Receiver<ShardJob<T>>,
    result_tx: async_channel::Sender<(u32, T)>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        if cancel.is_cancelled() {
            tracing::debug!(shard = job.shard, "skipping: cancelled");
            continue;
        }

        let shard = job.shard;
        match tokio::task::spawn_blocking(job.run).await {
            Ok(outcome) => {
                let _ = result_tx.send((shard, outcome)).await;
            }
            Err(e) => {
                tracing::error!(shard, error = %e, "shard job panicked");
            }
        }
    }
}
