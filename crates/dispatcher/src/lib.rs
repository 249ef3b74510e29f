//! 集群调度与自动伸缩
//!
//! - [`node_registry`]: 节点注册、心跳监控和失效检测
//! - [`scheduler`] / [`strategies`]: 资源匹配、节点评分和作业分配
//! - [`failure_handler`]: 失效节点上作业的重新调度
//! - [`pending_sweep`]: PENDING作业的周期和事件驱动重新调度
//! - [`autoscaler`]: 按利用率扩缩容
//! - [`cluster_service`]: 对外入口 [`ClusterManager`]

pub mod autoscaler;
pub mod cluster_service;
pub mod failure_handler;
pub mod node_registry;
pub mod pending_sweep;
pub mod scheduler;
pub mod strategies;

pub use autoscaler::{AutoScalerController, NodeProvisioner, TemplateProvisioner};
pub use cluster_service::{ClusterManager, ClusterManagerBuilder, StartupReport};
pub use failure_handler::{NodeFailureHandler, RescheduleManager, RescheduleReport};
pub use node_registry::{Liveness, NodeRegistry};
pub use pending_sweep::{PendingJobSweeper, SweepReport};
pub use scheduler::{JobScheduler, ScheduleOutcome};
pub use strategies::{LeastLoadedStrategy, PlacementStrategy, WeightedScoreStrategy};
