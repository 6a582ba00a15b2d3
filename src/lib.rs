pub mod queue;
pub mod runtime;
pub mod task;

pub use queue::{BoundedQueue, QueueStats};
pub use runtime::{RunConfig, RunStats, run};
pub use task::{SpinWorkload, Task, Workload};
