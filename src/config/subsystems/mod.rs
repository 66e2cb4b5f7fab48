pub mod window;
pub mod index;
pub mod matcher;
pub mod storage;
pub mod processor;

pub use window::WindowConfig;
pub use index::IndexConfig;
pub use matcher::{MatcherConfig, FileSimilarityPolicy};
pub use storage::{StorageConfig, StorageBackendKind};
pub use processor::ProcessorConfig;
