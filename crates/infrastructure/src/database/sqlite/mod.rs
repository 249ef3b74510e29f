pub mod migrations;
pub mod sqlite_autoscaler_repository;
pub mod sqlite_job_repository;
pub mod sqlite_node_metric_repository;
pub mod sqlite_node_repository;
pub mod sqlite_scaling_event_repository;

pub use migrations::run_migrations;
pub use sqlite_autoscaler_repository::SqliteAutoScalerRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_node_metric_repository::SqliteNodeMetricRepository;
pub use sqlite_node_repository::SqliteNodeRepository;
pub use sqlite_scaling_event_repository::SqliteScalingEventRepository;
