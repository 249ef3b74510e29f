pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod traits;

pub use errors::*;
pub use services::{CapacityLedger, JobLedger};
pub use traits::*;
