mod batch_computation;
mod data_processing;
mod generic;
mod machine_learning;

pub use batch_computation::{BatchComputationHandler, BatchOperation, BatchParams};
pub use data_processing::{DataProcessingHandler, DataProcessingParams};
pub use generic::{GenericHandler, GenericParams, GENERIC_JOB_TYPE};
pub use machine_learning::{MachineLearningHandler, RegressionParams};
