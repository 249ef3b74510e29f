pub mod executor;
pub mod handler;
pub mod handlers;
pub mod registry;

pub use executor::JobExecutor;
pub use handler::{JobContext, JobHandler};
pub use registry::HandlerRegistry;
