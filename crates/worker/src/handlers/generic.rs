use std::time::Duration;

use async_trait::async_trait;
use cluster_core::ClusterResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::handler::{JobContext, JobHandler};

pub const GENERIC_JOB_TYPE: &str = "generic";

/// 通用作业参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericParams {
    /// 模拟执行耗时
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// 通用处理器：按配置等待后回显作业配置
pub struct GenericHandler;

#[async_trait]
impl JobHandler for GenericHandler {
    fn job_type(&self) -> &str {
        GENERIC_JOB_TYPE
    }

    async fn execute(&self, context: &JobContext) -> ClusterResult<serde_json::Value> {
        let params: GenericParams = context.params()?;
        if let Some(ms) = params.duration_ms {
            debug!("通用作业 {} 模拟执行 {}ms", context.job_id, ms);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        Ok(json!({
            "jobId": context.job_id,
            "jobType": context.job_type,
            "nodeId": context.node_id,
            "attempt": context.attempt,
            "echo": context.config,
        }))
    }
}
