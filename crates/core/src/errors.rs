use thiserror::Error;

/// 集群调度错误类型定义
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("节点未找到: {id}")]
    NodeNotFound { id: String },

    #[error("作业未找到: {id}")]
    JobNotFound { id: String },

    #[error("自动伸缩器未找到: {id}")]
    AutoScalerNotFound { id: String },

    /// 当前没有节点满足作业的资源需求，作业保持PENDING
    #[error("没有可用节点满足作业 {job_id} 的资源需求")]
    ResourceUnavailable { job_id: String },

    /// 并发调度在节点容量上发生冲突，需要重试
    #[error("节点 {node_id} 容量更新冲突")]
    SchedulingConflict { node_id: String },

    #[error("作业执行超时: timed out after {timeout_minutes} minutes")]
    ExecutionTimeout { timeout_minutes: i32 },

    #[error("节点失效: {node_id}")]
    NodeFailure { node_id: String },

    #[error("作业 {job_id} 已超过最大重试次数")]
    RetriesExhausted { job_id: String },

    #[error("无效的状态转换: {0}")]
    InvalidTransition(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("作业执行错误: {0}")]
    JobExecution(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ClusterError {
    /// 调度冲突和资源不足都属于可重试的正常状态
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::SchedulingConflict { .. } | ClusterError::ResourceUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
