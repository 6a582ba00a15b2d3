use crate::queue::{BoundedQueue, DEFAULT_CAPACITY, QueueStats};
use crate::task::Workload;
use anyhow::{Context, Result, anyhow, ensure};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    pub capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            producers: 1,
            consumers: 1,
            items_per_producer: 20_000,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RunConfig {
    pub fn expected_items(&self) -> Result<u64> {
        (self.producers as u64)
            .checked_mul(self.items_per_producer)
            .ok_or_else(|| anyhow!("producers x items_per_producer overflows u64"))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunStats {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    pub capacity: usize,
    pub duration: Duration,
    pub queue: QueueStats,
    pub per_consumer_executed: Vec<u64>,
    pub busy_time: Duration,
}

impl RunStats {
    pub fn mean_wait_micros(&self) -> f64 {
        self.queue.mean_wait_micros()
    }

    pub fn throughput_items_per_sec(&self) -> f64 {
        let duration_sec = self.duration.as_secs_f64().max(0.000_001);
        self.queue.consumed as f64 / duration_sec
    }
}

enum WorkerReport {
    Producer { enqueued: u64 },
    Consumer { id: usize, executed: u64, busy: Duration },
}

/// Drive one complete run: spawn the producer and consumer pools against a
/// single shared queue, wait for the counting-based termination, and return
/// the aggregate stats. The workload supplies one job per (producer, seq).
pub fn run<W: Workload>(workload: W, config: RunConfig) -> Result<RunStats> {
    ensure!(config.producers >= 1, "at least one producer is required");
    ensure!(config.consumers >= 1, "at least one consumer is required");
    ensure!(config.capacity >= 1, "queue capacity must be at least 1");
    ensure!(
        config.items_per_producer >= 1,
        "items_per_producer must be at least 1"
    );
    let expected = config.expected_items()?;

    let workload = Arc::new(workload);
    let queue = Arc::new(BoundedQueue::new(config.capacity, expected));
    let (report_tx, report_rx) = crossbeam_channel::unbounded();
    let started_at = Instant::now();

    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(config.producers + config.consumers);

    for producer_id in 0..config.producers {
        let worker_queue = Arc::clone(&queue);
        let worker_workload = Arc::clone(&workload);
        let worker_tx = report_tx.clone();
        let quota = config.items_per_producer;
        let handle = std::thread::Builder::new()
            .name(format!("producer-{producer_id}"))
            .spawn(move || {
                let mut enqueued = 0u64;
                for seq in 0..quota {
                    if !worker_queue.push(worker_workload.job(producer_id, seq)) {
                        break;
                    }
                    enqueued += 1;
                }
                let _ = worker_tx.send(WorkerReport::Producer { enqueued });
            });
        match handle {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                abort_workers(&queue, workers);
                return Err(err)
                    .with_context(|| format!("failed to spawn producer thread {producer_id}"));
            }
        }
    }

    for consumer_id in 0..config.consumers {
        let worker_queue = Arc::clone(&queue);
        let worker_tx = report_tx.clone();
        let handle = std::thread::Builder::new()
            .name(format!("consumer-{consumer_id}"))
            .spawn(move || {
                let mut executed = 0u64;
                let mut busy = Duration::ZERO;
                while let Some(task) = worker_queue.pop() {
                    // The job itself runs outside the queue lock.
                    let run_started = Instant::now();
                    task.run();
                    busy += run_started.elapsed();
                    executed += 1;
                }
                let _ = worker_tx.send(WorkerReport::Consumer {
                    id: consumer_id,
                    executed,
                    busy,
                });
            });
        match handle {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                abort_workers(&queue, workers);
                return Err(err)
                    .with_context(|| format!("failed to spawn consumer thread {consumer_id}"));
            }
        }
    }
    drop(report_tx);

    for worker in workers {
        let name = worker.thread().name().unwrap_or("worker").to_string();
        worker
            .join()
            .map_err(|_| anyhow!("{name} thread panicked"))?;
    }
    let duration = started_at.elapsed();

    let mut per_consumer_executed = vec![0u64; config.consumers];
    let mut busy_time = Duration::ZERO;
    let mut total_enqueued = 0u64;
    for report in report_rx.iter() {
        match report {
            WorkerReport::Producer { enqueued } => total_enqueued += enqueued,
            WorkerReport::Consumer { id, executed, busy } => {
                per_consumer_executed[id] = executed;
                busy_time += busy;
            }
        }
    }

    let queue_stats = queue.stats();
    ensure!(
        total_enqueued == expected && queue_stats.consumed == expected,
        "run ended short: enqueued {total_enqueued}, consumed {}, expected {expected}",
        queue_stats.consumed
    );

    Ok(RunStats {
        producers: config.producers,
        consumers: config.consumers,
        items_per_producer: config.items_per_producer,
        capacity: config.capacity,
        duration,
        queue: queue_stats,
        per_consumer_executed,
        busy_time,
    })
}

// Hardened shutdown for a half-built pool: close the queue so every spawned
// worker drains and exits, then join them before surfacing the spawn error.
fn abort_workers<T>(queue: &BoundedQueue<T>, workers: Vec<JoinHandle<()>>) {
    queue.close();
    for worker in workers {
        let _ = worker.join();
    }
}

#[cfg(test)]
mod tests {
    use super::{RunConfig, run};
    use crate::task::{SpinWorkload, Task, Workload};
    use anyhow::Result;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn single_producer_single_consumer_small_quota() -> Result<()> {
        let stats = run(
            SpinWorkload::default(),
            RunConfig {
                producers: 1,
                consumers: 1,
                items_per_producer: 5,
                capacity: 10,
            },
        )?;
        assert_eq!(stats.queue.consumed, 5);
        assert_eq!(stats.queue.enqueued, 5);
        assert!(stats.mean_wait_micros() >= 0.0);
        assert!(stats.mean_wait_micros().is_finite());
        Ok(())
    }

    #[test]
    fn many_producers_tiny_buffer() -> Result<()> {
        let stats = run(
            SpinWorkload::default(),
            RunConfig {
                producers: 4,
                consumers: 2,
                items_per_producer: 50,
                capacity: 1,
            },
        )?;
        assert_eq!(stats.queue.consumed, 200);
        assert_eq!(stats.queue.max_occupancy, 1);
        Ok(())
    }

    #[test]
    fn consumer_reports_sum_to_total() -> Result<()> {
        let stats = run(
            SpinWorkload::default(),
            RunConfig {
                producers: 2,
                consumers: 4,
                items_per_producer: 100,
                capacity: 8,
            },
        )?;
        let reported: u64 = stats.per_consumer_executed.iter().sum();
        assert_eq!(reported, stats.queue.consumed);
        assert_eq!(stats.per_consumer_executed.len(), 4);
        Ok(())
    }

    struct CountingWorkload {
        executed: Arc<AtomicU64>,
    }

    impl Workload for CountingWorkload {
        fn job(&self, _producer: usize, _seq: u64) -> Task {
            let executed = Arc::clone(&self.executed);
            Task::new(move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
        }
    }

    #[test]
    fn injected_workload_runs_each_job_exactly_once() -> Result<()> {
        let executed = Arc::new(AtomicU64::new(0));
        let stats = run(
            CountingWorkload {
                executed: Arc::clone(&executed),
            },
            RunConfig {
                producers: 3,
                consumers: 3,
                items_per_producer: 40,
                capacity: 4,
            },
        )?;
        assert_eq!(stats.queue.consumed, 120);
        assert_eq!(executed.load(Ordering::Relaxed), 120);
        Ok(())
    }

    #[test]
    fn rejects_zero_worker_counts() {
        let err = run(
            SpinWorkload::default(),
            RunConfig {
                producers: 0,
                ..RunConfig::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("producer"));

        let err = run(
            SpinWorkload::default(),
            RunConfig {
                consumers: 0,
                ..RunConfig::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("consumer"));
    }
}
