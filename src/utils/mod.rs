pub mod barrier;
pub mod processing;

pub use barrier::HostBarrier;
pub use processing::{BatchSender, BatchWriter, WorkerPool, WriteBatch};
