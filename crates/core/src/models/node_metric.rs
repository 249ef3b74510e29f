use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::ClusterNode;

/// 节点指标采样，只追加不修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeMetric {
    pub id: i64,
    pub node_id: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub storage_usage_percent: f64,
    pub network_io_mbps: f64,
    pub active_jobs: i32,
    pub queued_jobs: i32,
    pub recorded_at: DateTime<Utc>,
}

impl NodeMetric {
    /// 以节点当前的仪表值生成一条采样
    pub fn sample(node: &ClusterNode, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            node_id: node.node_id.clone(),
            cpu_usage_percent: node.cpu_usage_percent,
            memory_usage_percent: node.memory_usage_percent,
            storage_usage_percent: node.storage_usage_percent,
            network_io_mbps: node.network_io_mbps,
            active_jobs: node.current_job_count,
            queued_jobs: node.job_queue_size,
            recorded_at,
        }
    }
}
