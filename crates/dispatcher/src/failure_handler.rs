use std::sync::Arc;

use async_trait::async_trait;
use cluster_core::models::{ClusterNode, JobEvent, JobStatus, RETRIES_EXHAUSTED_MESSAGE};
use cluster_core::{CapacityLedger, ClusterError, ClusterResult, ClusterStore, JobLedger};
use cluster_infrastructure::MetricsCollector;
use cluster_worker::JobExecutor;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::scheduler::{JobScheduler, ScheduleOutcome};

/// 节点失效处理接口，由节点注册表在心跳超时后调用
#[async_trait]
pub trait NodeFailureHandler: Send + Sync {
    async fn handle_node_failure(&self, node: &ClusterNode) -> ClusterResult<RescheduleReport>;
}

/// 失效节点上作业的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleReport {
    /// 重新进入调度的作业
    pub requeued: Vec<String>,
    /// 重试耗尽而终止的作业
    pub exhausted: Vec<String>,
    /// 已被其他操作处理、无需变更的作业
    pub skipped: Vec<String>,
}

/// 失效与重新调度管理器
///
/// 失效节点上 SCHEDULED/RUNNING 的作业回到 PENDING 并增加重试次数，
/// 超过 `maxRetries` 时终止为 FAILED。节点槽位由这里归还。
pub struct RescheduleManager {
    store: ClusterStore,
    jobs: JobLedger,
    capacity: CapacityLedger,
    scheduler: JobScheduler,
    executor: JobExecutor,
    metrics: MetricsCollector,
    capacity_freed: Arc<Notify>,
}

impl RescheduleManager {
    pub fn new(
        store: ClusterStore,
        jobs: JobLedger,
        capacity: CapacityLedger,
        scheduler: JobScheduler,
        executor: JobExecutor,
        metrics: MetricsCollector,
        capacity_freed: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            jobs,
            capacity,
            scheduler,
            executor,
            metrics,
            capacity_freed,
        }
    }

    /// 把作业从节点上撤下，返回作业的新状态
    ///
    /// `orphaned` 为真时作业只是失去了执行者，不消耗重试次数。
    async fn requeue(
        &self,
        job_id: &str,
        node_id: &str,
        orphaned: bool,
    ) -> ClusterResult<Option<JobStatus>> {
        let node_id_owned = node_id.to_string();
        let event = if orphaned {
            JobEvent::Orphaned {
                node_id: node_id_owned,
            }
        } else {
            JobEvent::NodeLost {
                node_id: node_id_owned,
            }
        };
        let transition = match self.jobs.transition(job_id, event).await {
            Ok(transition) => transition,
            Err(ClusterError::InvalidTransition(reason)) => {
                debug!("作业 {} 已不在节点 {} 上: {}", job_id, node_id, reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.executor.abort(job_id).await;
        let reschedule = self.capacity.apply_effects(&transition.effects).await?;

        if reschedule {
            self.metrics.record_job_rescheduled();
            if orphaned {
                info!("遗留作业 {} 从节点 {} 撤下并重新调度", job_id, node_id);
            } else {
                info!(
                    "作业 {} 因节点 {} 失效重新调度 (重试 {}/{})",
                    job_id, node_id, transition.job.retry_count, transition.job.max_retries
                );
            }
            match self.scheduler.try_schedule(job_id).await {
                Ok(ScheduleOutcome::Scheduled { node_id: target }) => {
                    debug!("作业 {} 已重新分配到节点 {}", job_id, target);
                }
                Ok(outcome) => {
                    debug!("作业 {} 暂未重新分配: {:?}", job_id, outcome);
                }
                Err(e) => warn!("作业 {} 重新调度失败: {}", job_id, e),
            }
        } else {
            warn!(
                "{}: {}",
                ClusterError::RetriesExhausted {
                    job_id: job_id.to_string()
                },
                RETRIES_EXHAUSTED_MESSAGE
            );
        }
        Ok(Some(transition.job.status))
    }

    /// 进程启动时处理上次运行遗留的 SCHEDULED/RUNNING 作业
    ///
    /// 这些作业没有执行者，退回 PENDING 重新调度，不计入重试次数。
    pub async fn recover_orphaned_jobs(&self) -> ClusterResult<RescheduleReport> {
        let mut report = RescheduleReport::default();
        for status in [JobStatus::Scheduled, JobStatus::Running] {
            for job in self.store.jobs.list_by_status(status).await? {
                let Some(node_id) = job.assigned_node_id.clone() else {
                    continue;
                };
                if self.executor.is_running(&job.job_id).await {
                    continue;
                }
                let result = self.requeue(&job.job_id, &node_id, true).await;
                self.record(&mut report, &job.job_id, result);
            }
        }

        if !report.requeued.is_empty() || !report.exhausted.is_empty() {
            info!(
                "恢复遗留作业: {} 个重新调度, {} 个重试耗尽",
                report.requeued.len(),
                report.exhausted.len()
            );
            self.capacity_freed.notify_one();
        }
        Ok(report)
    }

    fn record(
        &self,
        report: &mut RescheduleReport,
        job_id: &str,
        result: ClusterResult<Option<JobStatus>>,
    ) {
        match result {
            Ok(Some(JobStatus::Failed)) => report.exhausted.push(job_id.to_string()),
            Ok(Some(_)) => report.requeued.push(job_id.to_string()),
            Ok(None) => report.skipped.push(job_id.to_string()),
            Err(e) => {
                error!("处理作业 {} 时出错: {}", job_id, e);
                report.skipped.push(job_id.to_string());
            }
        }
    }
}

#[async_trait]
impl NodeFailureHandler for RescheduleManager {
    async fn handle_node_failure(&self, node: &ClusterNode) -> ClusterResult<RescheduleReport> {
        let affected = self
            .store
            .jobs
            .list_by_node(&node.node_id, &[JobStatus::Scheduled, JobStatus::Running])
            .await?;

        info!(
            "处理失效节点 {}: {} 个受影响作业",
            node.node_id,
            affected.len()
        );

        let mut report = RescheduleReport::default();
        for job in affected {
            let result = self.requeue(&job.job_id, &node.node_id, false).await;
            self.record(&mut report, &job.job_id, result);
        }

        self.capacity_freed.notify_one();
        Ok(report)
    }
}
