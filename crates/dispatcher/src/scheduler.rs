use std::sync::Arc;
use std::time::Instant;

use cluster_core::models::{ClusterNode, DistributedJob, JobEffect, JobEvent, JobStatus, NodeStatus};
use cluster_core::{CapacityLedger, ClusterError, ClusterResult, ClusterStore, JobLedger};
use cluster_infrastructure::MetricsCollector;
use cluster_worker::JobExecutor;
use tracing::{debug, error, info, warn};

use crate::strategies::PlacementStrategy;

/// 一次调度尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// 作业已分配并交给执行器
    Scheduled { node_id: String },
    /// 当前没有满足条件的节点，作业保持PENDING
    Unplaceable,
    /// 作业已不是PENDING（已被调度、取消或结束）
    NotPending,
    /// 所有候选节点都在并发竞争中被占满，作业保持PENDING
    Conflicted,
}

/// 作业调度器
///
/// 一次调度尝试是幂等的，可以被提交、重新调度和周期扫描反复触发。
/// 容量占用先于作业状态写入：作业分配失败时归还已占用的槽位。
#[derive(Clone)]
pub struct JobScheduler {
    store: ClusterStore,
    jobs: JobLedger,
    capacity: CapacityLedger,
    strategy: Arc<dyn PlacementStrategy>,
    executor: JobExecutor,
    metrics: MetricsCollector,
}

impl JobScheduler {
    pub fn new(
        store: ClusterStore,
        jobs: JobLedger,
        capacity: CapacityLedger,
        strategy: Arc<dyn PlacementStrategy>,
        executor: JobExecutor,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            jobs,
            capacity,
            strategy,
            executor,
            metrics,
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 作业所在集群中满足资源、槽位和约束的ACTIVE节点
    pub async fn eligible_nodes(&self, job: &DistributedJob) -> ClusterResult<Vec<ClusterNode>> {
        let nodes = self
            .store
            .nodes
            .list_by_cluster(&job.cluster_id, Some(NodeStatus::Active))
            .await?;
        Ok(nodes.into_iter().filter(|node| job.fits_on(node)).collect())
    }

    /// 尝试为PENDING作业选择节点并启动执行
    pub async fn try_schedule(&self, job_id: &str) -> ClusterResult<ScheduleOutcome> {
        let started = Instant::now();
        let job = self.jobs.get(job_id).await?;
        if job.status != JobStatus::Pending {
            return Ok(ScheduleOutcome::NotPending);
        }

        let candidates = self.eligible_nodes(&job).await?;
        if candidates.is_empty() {
            debug!(
                "{}",
                ClusterError::ResourceUnavailable {
                    job_id: job.job_id.clone()
                }
            );
            return Ok(ScheduleOutcome::Unplaceable);
        }

        for node in self.strategy.rank(&job, &candidates) {
            match self.capacity.claim_slot(&node.node_id, &job).await {
                Ok(_) => {}
                Err(ClusterError::SchedulingConflict { node_id }) => {
                    debug!("节点 {} 容量已变化，尝试下一个候选节点", node_id);
                    self.metrics.record_scheduling_conflict();
                    continue;
                }
                Err(e) => return Err(e),
            }

            let assigned = self
                .jobs
                .transition(
                    job_id,
                    JobEvent::Assign {
                        node_id: node.node_id.clone(),
                    },
                )
                .await;

            match assigned {
                Ok(transition) => {
                    self.metrics
                        .record_job_scheduled(started.elapsed().as_secs_f64());
                    info!(
                        "作业 {} 已调度到节点 {} (策略: {})",
                        job_id,
                        node.node_id,
                        self.strategy.name()
                    );
                    self.executor
                        .spawn(transition.job, node.node_id.clone())
                        .await;
                    return Ok(ScheduleOutcome::Scheduled {
                        node_id: node.node_id.clone(),
                    });
                }
                Err(e) => {
                    self.return_claim(&node.node_id).await;
                    return match e {
                        ClusterError::InvalidTransition(reason) => {
                            debug!("作业 {} 分配失败，已被其他操作处理: {}", job_id, reason);
                            Ok(ScheduleOutcome::NotPending)
                        }
                        other => Err(other),
                    };
                }
            }
        }

        debug!("作业 {} 的所有候选节点都已被占用", job_id);
        Ok(ScheduleOutcome::Conflicted)
    }

    /// 归还占用但未能使用的槽位
    async fn return_claim(&self, node_id: &str) {
        let effects = [
            JobEffect::DequeueFromNode {
                node_id: node_id.to_string(),
            },
            JobEffect::ReleaseSlot {
                node_id: node_id.to_string(),
            },
        ];
        if let Err(e) = self.capacity.apply_effects(&effects).await {
            error!("归还节点 {} 的槽位失败: {}", node_id, e);
        }
    }

    /// 在后台执行调度尝试，错误只记录日志
    pub fn schedule_in_background(&self, job_id: String) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            match scheduler.try_schedule(&job_id).await {
                Ok(ScheduleOutcome::Unplaceable) => {
                    debug!("作业 {} 暂无可用节点，等待重新调度", job_id);
                }
                Ok(_) => {}
                Err(e) => warn!("作业 {} 调度失败: {}", job_id, e),
            }
        });
    }
}
