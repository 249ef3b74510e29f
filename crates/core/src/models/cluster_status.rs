use serde::{Deserialize, Serialize};

use super::job::{DistributedJob, JobStatus};
use super::node::{ClusterNode, NodeStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeSummary {
    pub total: usize,
    pub active: usize,
    pub failed: usize,
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub success_rate_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceSummary {
    pub total_cores: f64,
    pub total_memory_gb: f64,
}

/// 集群状态汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatus {
    pub cluster_id: String,
    pub nodes: NodeSummary,
    pub jobs: JobSummary,
    pub resources: ResourceSummary,
}

impl ClusterStatus {
    /// 平均负载和资源总量只统计ACTIVE节点；成功率 = 完成 / (完成 + 失败)
    pub fn summarize(cluster_id: &str, nodes: &[ClusterNode], jobs: &[DistributedJob]) -> Self {
        let active: Vec<&ClusterNode> = nodes.iter().filter(|n| n.is_active()).collect();

        let (avg_cpu_percent, avg_memory_percent) = if active.is_empty() {
            (0.0, 0.0)
        } else {
            let count = active.len() as f64;
            (
                active.iter().map(|n| n.cpu_usage_percent).sum::<f64>() / count,
                active.iter().map(|n| n.memory_usage_percent).sum::<f64>() / count,
            )
        };

        let count_jobs = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        let completed = count_jobs(JobStatus::Completed);
        let failed = count_jobs(JobStatus::Failed);
        let finished = completed + failed;

        Self {
            cluster_id: cluster_id.to_string(),
            nodes: NodeSummary {
                total: nodes.len(),
                active: active.len(),
                failed: nodes
                    .iter()
                    .filter(|n| n.status == NodeStatus::Failed)
                    .count(),
                avg_cpu_percent,
                avg_memory_percent,
            },
            jobs: JobSummary {
                total: jobs.len(),
                pending: count_jobs(JobStatus::Pending),
                running: count_jobs(JobStatus::Running),
                completed,
                failed,
                cancelled: count_jobs(JobStatus::Cancelled),
                success_rate_percent: if finished == 0 {
                    0.0
                } else {
                    completed as f64 / finished as f64 * 100.0
                },
            },
            resources: ResourceSummary {
                total_cores: active.iter().map(|n| n.cpu_cores).sum(),
                total_memory_gb: active.iter().map(|n| n.memory_gb).sum(),
            },
        }
    }
}
