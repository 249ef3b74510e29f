use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::models::{DistributedJob, JobEvent, JobTransition};
use crate::traits::JobRepository;
use crate::{ClusterError, ClusterResult};

/// 作业状态账本：把 [`DistributedJob::apply`] 的结果以版本条件写入存储
#[derive(Clone)]
pub struct JobLedger {
    jobs: Arc<dyn JobRepository>,
    max_attempts: u32,
}

impl JobLedger {
    pub fn new(jobs: Arc<dyn JobRepository>, max_attempts: u32) -> Self {
        Self {
            jobs,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn get(&self, job_id: &str) -> ClusterResult<DistributedJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| ClusterError::JobNotFound {
                id: job_id.to_string(),
            })
    }

    /// 提交一次状态转换
    ///
    /// 返回 `InvalidTransition` 表示事件在当前状态下不合法，
    /// 通常意味着另一个参与者已经赢得了这次转换。
    pub async fn transition(&self, job_id: &str, event: JobEvent) -> ClusterResult<JobTransition> {
        for attempt in 1..=self.max_attempts {
            let current = self.get(job_id).await?;
            let mut transition = current.apply(event.clone(), Utc::now())?;

            if self.jobs.compare_and_swap(&transition.job).await? {
                transition.job.version += 1;
                return Ok(transition);
            }
            debug!(job_id, attempt, "作业版本冲突，重试");
            tokio::task::yield_now().await;
        }

        Err(ClusterError::Internal(format!(
            "作业 {job_id} 状态更新冲突次数超过 {} 次",
            self.max_attempts
        )))
    }
}
