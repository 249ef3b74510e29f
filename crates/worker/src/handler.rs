use async_trait::async_trait;
use cluster_core::models::DistributedJob;
use cluster_core::{ClusterError, ClusterResult};
use serde::de::DeserializeOwned;

/// 处理器执行作业时可见的上下文
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub job_type: String,
    pub node_id: String,
    pub attempt: i32,
    pub config: serde_json::Value,
}

impl JobContext {
    pub fn new(job: &DistributedJob, node_id: impl Into<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            job_type: job.job_type.clone(),
            node_id: node_id.into(),
            attempt: job.attempt(),
            config: job.job_config.clone(),
        }
    }

    /// 把作业配置解析为处理器自己的参数类型
    pub fn params<T: DeserializeOwned>(&self) -> ClusterResult<T> {
        serde_json::from_value(self.config.clone()).map_err(|e| {
            ClusterError::JobExecution(format!("解析{}作业参数失败: {e}", self.job_type))
        })
    }
}

/// 按作业类型执行作业负载
///
/// 返回值写入作业的 `outputData`，错误信息写入 `errorMessage`。
/// 超时和取消由执行器处理，处理器只需在长循环中适当让出执行权。
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &str;

    async fn execute(&self, context: &JobContext) -> ClusterResult<serde_json::Value>;
}
