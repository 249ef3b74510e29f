//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：
//!
//! 1. 各配置段的默认值
//! 2. TOML 配置文件
//! 3. `CLUSTER_` 前缀的环境变量，段和字段之间用双下划线分隔，
//!    例如 `CLUSTER_REGISTRY__HEARTBEAT_INTERVAL_MS=10000`

pub mod app_config;
pub mod cluster;
pub mod database;
pub mod observability;

pub use app_config::AppConfig;
pub use cluster::{AutoScalerConfig, ExecutorConfig, RegistryConfig, SchedulerConfig};
pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;
