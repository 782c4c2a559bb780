pub mod persist;
pub mod scheduler;
pub mod shutdown;

pub use persist::{persist_items, PersistReport};
pub use scheduler::{Aggregator, AggregatorConfig, CycleError, CycleOutcome, CycleReport};
pub use shutdown::{Shutdown, ShutdownSignal};
