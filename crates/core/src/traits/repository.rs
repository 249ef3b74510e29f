//! 集群状态存储接口定义
//!
//! 集群状态存储是节点、作业、伸缩策略、伸缩事件和指标采样的唯一事实来源。
//! 所有组件都通过这里的仓储接口读写状态，每次操作只涉及一个实体。
//!
//! ## 乐观并发
//!
//! 节点和作业会被多个并发任务修改（调度器、执行器、失效处理器、取消操作），
//! 因此它们的仓储提供 `compare_and_swap`：
//!
//! 1. 读取实体，记下 `version`
//! 2. 在内存中计算新状态
//! 3. 调用 `compare_and_swap(&new_state)`，仅当存储中的版本仍等于
//!    `new_state.version` 时写入，并把版本加一
//! 4. 返回 `false` 时重新读取并重试
//!
//! 重试循环封装在 [`crate::services::CapacityLedger`] 和
//! [`crate::services::JobLedger`] 中，业务代码不直接调用 `compare_and_swap`。
//!
//! ## 实现
//!
//! - 内存实现（测试和单进程部署）
//! - SQLite 实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AutoScaler, ClusterNode, DistributedJob, JobStatus, NodeMetric, NodeStatus, ScalingEvent,
    ScalingOutcome,
};
use crate::ClusterResult;

/// 节点仓储接口
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// 持久化新节点，返回带有存储层id的节点
    async fn create(&self, node: &ClusterNode) -> ClusterResult<ClusterNode>;

    async fn get(&self, node_id: &str) -> ClusterResult<Option<ClusterNode>>;

    /// 注册幂等性依赖 (cluster_id, hostname) 唯一
    async fn find_by_hostname(
        &self,
        cluster_id: &str,
        hostname: &str,
    ) -> ClusterResult<Option<ClusterNode>>;

    /// 按集群列出节点，可选按状态过滤
    async fn list_by_cluster(
        &self,
        cluster_id: &str,
        status: Option<NodeStatus>,
    ) -> ClusterResult<Vec<ClusterNode>>;

    /// 所有集群中处于指定状态的节点
    async fn list_by_status(&self, status: NodeStatus) -> ClusterResult<Vec<ClusterNode>>;

    /// 版本匹配时写入并返回 `true`，`node.version` 为读取时的版本
    async fn compare_and_swap(&self, node: &ClusterNode) -> ClusterResult<bool>;
}

/// 作业仓储接口
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &DistributedJob) -> ClusterResult<DistributedJob>;

    async fn get(&self, job_id: &str) -> ClusterResult<Option<DistributedJob>>;

    async fn list_by_status(&self, status: JobStatus) -> ClusterResult<Vec<DistributedJob>>;

    async fn list_by_cluster(&self, cluster_id: &str) -> ClusterResult<Vec<DistributedJob>>;

    /// 分配到指定节点且处于给定状态之一的作业
    async fn list_by_node(
        &self,
        node_id: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<DistributedJob>>;

    /// 版本匹配时写入并返回 `true`
    async fn compare_and_swap(&self, job: &DistributedJob) -> ClusterResult<bool>;
}

/// 自动伸缩器仓储接口
#[async_trait]
pub trait AutoScalerRepository: Send + Sync {
    async fn create(&self, scaler: &AutoScaler) -> ClusterResult<AutoScaler>;

    async fn get(&self, scaler_id: &str) -> ClusterResult<Option<AutoScaler>>;

    async fn list(&self) -> ClusterResult<Vec<AutoScaler>>;

    async fn list_enabled(&self) -> ClusterResult<Vec<AutoScaler>>;

    /// 返回伸缩器是否存在
    async fn set_enabled(&self, scaler_id: &str, enabled: bool) -> ClusterResult<bool>;

    /// 记录最近一次成功伸缩的时间
    async fn record_scaling_action(&self, scaler_id: &str, at: DateTime<Utc>)
        -> ClusterResult<()>;
}

/// 伸缩事件仓储接口
#[async_trait]
pub trait ScalingEventRepository: Send + Sync {
    async fn create(&self, event: &ScalingEvent) -> ClusterResult<ScalingEvent>;

    /// 写入执行结果和完成时间；已完成的事件不会再被修改
    async fn complete(
        &self,
        event_id: &str,
        outcome: &ScalingOutcome,
        completed_at: DateTime<Utc>,
    ) -> ClusterResult<ScalingEvent>;

    /// 按创建时间升序返回
    async fn list_by_scaler(&self, scaler_id: &str) -> ClusterResult<Vec<ScalingEvent>>;
}

/// 节点指标仓储接口
#[async_trait]
pub trait NodeMetricRepository: Send + Sync {
    async fn append(&self, metric: &NodeMetric) -> ClusterResult<()>;

    /// 最近的 `limit` 条采样，按时间倒序
    async fn recent(&self, node_id: &str, limit: usize) -> ClusterResult<Vec<NodeMetric>>;
}

/// 集群状态存储：各仓储的组合
#[derive(Clone)]
pub struct ClusterStore {
    pub nodes: Arc<dyn NodeRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub scalers: Arc<dyn AutoScalerRepository>,
    pub scaling_events: Arc<dyn ScalingEventRepository>,
    pub metrics: Arc<dyn NodeMetricRepository>,
}

impl ClusterStore {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        jobs: Arc<dyn JobRepository>,
        scalers: Arc<dyn AutoScalerRepository>,
        scaling_events: Arc<dyn ScalingEventRepository>,
        metrics: Arc<dyn NodeMetricRepository>,
    ) -> Self {
        Self {
            nodes,
            jobs,
            scalers,
            scaling_events,
            metrics,
        }
    }
}
