use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::models::{ClusterNode, DistributedJob, JobEffect};
use crate::traits::NodeRepository;
use crate::{ClusterError, ClusterResult};

/// 节点容量账本
///
/// `currentJobCount` 和 `jobQueueSize` 只能通过这里修改，
/// 每次修改都是一次带版本校验的条件写入。
#[derive(Clone)]
pub struct CapacityLedger {
    nodes: Arc<dyn NodeRepository>,
    max_attempts: u32,
}

impl CapacityLedger {
    pub fn new(nodes: Arc<dyn NodeRepository>, max_attempts: u32) -> Self {
        Self {
            nodes,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn get(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.nodes
            .get(node_id)
            .await?
            .ok_or_else(|| ClusterError::NodeNotFound {
                id: node_id.to_string(),
            })
    }

    /// 对节点执行一次读-改-写，版本冲突时重新读取并重试
    ///
    /// `mutate` 返回错误时立即放弃，不写入任何内容。
    pub async fn modify<F>(&self, node_id: &str, mut mutate: F) -> ClusterResult<ClusterNode>
    where
        F: FnMut(&mut ClusterNode) -> ClusterResult<()> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut node = self.get(node_id).await?;
            mutate(&mut node)?;
            node.updated_at = Utc::now();

            if self.nodes.compare_and_swap(&node).await? {
                node.version += 1;
                return Ok(node);
            }
            debug!(node_id, attempt, "节点版本冲突，重试");
            tokio::task::yield_now().await;
        }

        Err(ClusterError::SchedulingConflict {
            node_id: node_id.to_string(),
        })
    }

    /// 为作业占用节点上的一个槽位
    ///
    /// 写入前重新检查节点是否仍然满足作业需求，不满足时返回
    /// `SchedulingConflict`，调用方应尝试下一个候选节点。
    pub async fn claim_slot(
        &self,
        node_id: &str,
        job: &DistributedJob,
    ) -> ClusterResult<ClusterNode> {
        self.modify(node_id, |node| {
            if !job.fits_on(node) {
                return Err(ClusterError::SchedulingConflict {
                    node_id: node.node_id.clone(),
                });
            }
            node.current_job_count += 1;
            node.job_queue_size += 1;
            node.recompute_health_score();
            Ok(())
        })
        .await
    }

    /// 归还一个槽位
    pub async fn release_slot(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.modify(node_id, |node| {
            node.current_job_count = (node.current_job_count - 1).max(0);
            node.recompute_health_score();
            Ok(())
        })
        .await
    }

    /// 作业离开节点的等待队列
    pub async fn dequeue(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.modify(node_id, |node| {
            node.job_queue_size = (node.job_queue_size - 1).max(0);
            Ok(())
        })
        .await
    }

    /// 执行状态转换产生的容量副作用，返回是否需要重新调度
    pub async fn apply_effects(&self, effects: &[JobEffect]) -> ClusterResult<bool> {
        let mut reschedule = false;
        for effect in effects {
            match effect {
                JobEffect::ReleaseSlot { node_id } => {
                    self.release_slot(node_id).await?;
                }
                JobEffect::DequeueFromNode { node_id } => {
                    self.dequeue(node_id).await?;
                }
                JobEffect::Reschedule => reschedule = true,
            }
        }
        Ok(reschedule)
    }
}
