pub mod database;
pub mod memory;
pub mod metrics;

pub use database::*;
pub use memory::*;
pub use metrics::MetricsCollector;
