use std::fmt;

/// A unit of work handed from a producer to a consumer. The job runs exactly
/// once, on the consumer thread, outside the queue lock.
pub struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new(job: impl FnOnce() + Send + 'static) -> Self {
        Self { job: Box::new(job) }
    }

    pub fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

/// Factory for the jobs producers enqueue. The driver supplies one shared
/// instance; `producer` and `seq` identify the item being built.
pub trait Workload: Send + Sync + 'static {
    fn job(&self, producer: usize, seq: u64) -> Task;
}

/// Pure CPU-burning placeholder workload. Each job runs a short
/// xorshift-seeded cosine loop and discards the result.
#[derive(Clone, Copy, Debug)]
pub struct SpinWorkload {
    pub rounds: u32,
}

impl SpinWorkload {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl Default for SpinWorkload {
    fn default() -> Self {
        Self { rounds: 10 }
    }
}

impl Workload for SpinWorkload {
    fn job(&self, producer: usize, seq: u64) -> Task {
        let rounds = self.rounds;
        let seed = (producer as u64) << 32 | (seq & 0xffff_ffff);
        Task::new(move || burn(seed, rounds))
    }
}

fn burn(seed: u64, rounds: u32) {
    let mut x = seed | 1;
    let mut acc = 0.0f64;
    for _ in 0..rounds {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        acc += ((x % 20) as f64).cos();
    }
    // Keep the loop from being optimized away; the value itself is unused.
    std::hint::black_box(acc);
}

#[cfg(test)]
mod tests {
    use super::{SpinWorkload, Task, Workload};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn task_runs_its_job_once() {
        let counter = Arc::new(AtomicU64::new(0));
        let task_counter = Arc::clone(&counter);
        let task = Task::new(move || {
            task_counter.fetch_add(1, Ordering::Relaxed);
        });
        task.run();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn spin_workload_builds_runnable_jobs() {
        let workload = SpinWorkload::default();
        assert_eq!(workload.rounds, 10);
        for seq in 0..4 {
            workload.job(0, seq).run();
        }
        // Zero rounds is a valid no-op job
        SpinWorkload::new(0).job(3, 7).run();
    }
}
