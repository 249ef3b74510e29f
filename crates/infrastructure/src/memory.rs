//! 内存存储实现
//!
//! 与SQLite实现遵循相同的版本校验语义，用于单进程部署和测试。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use cluster_core::models::{
    AutoScaler, ClusterNode, DistributedJob, JobStatus, NodeMetric, NodeStatus, ScalingEvent,
    ScalingOutcome,
};
use cluster_core::{
    AutoScalerRepository, ClusterError, ClusterResult, ClusterStore, JobRepository,
    NodeMetricRepository, NodeRepository, ScalingEventRepository,
};

#[derive(Debug)]
struct Table<T> {
    rows: HashMap<String, T>,
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 内存节点仓储
#[derive(Debug, Default)]
pub struct InMemoryNodeRepository {
    table: RwLock<Table<ClusterNode>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_id<T, F: Fn(&T) -> i64>(mut items: Vec<T>, key: F) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn create(&self, node: &ClusterNode) -> ClusterResult<ClusterNode> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|existing| {
            existing.cluster_id == node.cluster_id && existing.hostname == node.hostname
        }) {
            return Err(ClusterError::Validation(format!(
                "主机 {} 已在集群 {} 中注册",
                node.hostname, node.cluster_id
            )));
        }

        let mut created = node.clone();
        created.id = table.allocate_id();
        created.version = 1;
        table.rows.insert(created.node_id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, node_id: &str) -> ClusterResult<Option<ClusterNode>> {
        Ok(self.table.read().await.rows.get(node_id).cloned())
    }

    async fn find_by_hostname(
        &self,
        cluster_id: &str,
        hostname: &str,
    ) -> ClusterResult<Option<ClusterNode>> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .values()
            .find(|n| n.cluster_id == cluster_id && n.hostname == hostname)
            .cloned())
    }

    async fn list_by_cluster(
        &self,
        cluster_id: &str,
        status: Option<NodeStatus>,
    ) -> ClusterResult<Vec<ClusterNode>> {
        let table = self.table.read().await;
        let nodes = table
            .rows
            .values()
            .filter(|n| n.cluster_id == cluster_id)
            .filter(|n| status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();
        Ok(sorted_by_id(nodes, |n: &ClusterNode| n.id))
    }

    async fn list_by_status(&self, status: NodeStatus) -> ClusterResult<Vec<ClusterNode>> {
        let table = self.table.read().await;
        let nodes = table
            .rows
            .values()
            .filter(|n| n.status == status)
            .cloned()
            .collect();
        Ok(sorted_by_id(nodes, |n: &ClusterNode| n.id))
    }

    async fn compare_and_swap(&self, node: &ClusterNode) -> ClusterResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&node.node_id) {
            Some(stored) if stored.version == node.version => {
                let mut updated = node.clone();
                updated.id = stored.id;
                updated.version = node.version + 1;
                *stored = updated;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ClusterError::NodeNotFound {
                id: node.node_id.clone(),
            }),
        }
    }
}

/// 内存作业仓储
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    table: RwLock<Table<DistributedJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filter<P>(&self, predicate: P) -> Vec<DistributedJob>
    where
        P: Fn(&DistributedJob) -> bool,
    {
        let table = self.table.read().await;
        let jobs = table
            .rows
            .values()
            .filter(|j| predicate(j))
            .cloned()
            .collect();
        sorted_by_id(jobs, |j: &DistributedJob| j.id)
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &DistributedJob) -> ClusterResult<DistributedJob> {
        let mut table = self.table.write().await;
        let mut created = job.clone();
        created.id = table.allocate_id();
        created.version = 1;
        table.rows.insert(created.job_id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, job_id: &str) -> ClusterResult<Option<DistributedJob>> {
        Ok(self.table.read().await.rows.get(job_id).cloned())
    }

    async fn list_by_status(&self, status: JobStatus) -> ClusterResult<Vec<DistributedJob>> {
        Ok(self.filter(|j| j.status == status).await)
    }

    async fn list_by_cluster(&self, cluster_id: &str) -> ClusterResult<Vec<DistributedJob>> {
        Ok(self.filter(|j| j.cluster_id == cluster_id).await)
    }

    async fn list_by_node(
        &self,
        node_id: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<DistributedJob>> {
        Ok(self
            .filter(|j| j.is_assigned_to(node_id) && statuses.contains(&j.status))
            .await)
    }

    async fn compare_and_swap(&self, job: &DistributedJob) -> ClusterResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&job.job_id) {
            Some(stored) if stored.version == job.version => {
                let mut updated = job.clone();
                updated.id = stored.id;
                updated.version = job.version + 1;
                *stored = updated;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ClusterError::JobNotFound {
                id: job.job_id.clone(),
            }),
        }
    }
}

/// 内存自动伸缩器仓储
#[derive(Debug, Default)]
pub struct InMemoryAutoScalerRepository {
    table: RwLock<Table<AutoScaler>>,
}

impl InMemoryAutoScalerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AutoScalerRepository for InMemoryAutoScalerRepository {
    async fn create(&self, scaler: &AutoScaler) -> ClusterResult<AutoScaler> {
        let mut table = self.table.write().await;
        let mut created = scaler.clone();
        created.id = table.allocate_id();
        table.rows.insert(created.scaler_id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, scaler_id: &str) -> ClusterResult<Option<AutoScaler>> {
        Ok(self.table.read().await.rows.get(scaler_id).cloned())
    }

    async fn list(&self) -> ClusterResult<Vec<AutoScaler>> {
        let table = self.table.read().await;
        let scalers = table.rows.values().cloned().collect();
        Ok(sorted_by_id(scalers, |s: &AutoScaler| s.id))
    }

    async fn list_enabled(&self) -> ClusterResult<Vec<AutoScaler>> {
        Ok(self.list().await?.into_iter().filter(|s| s.enabled).collect())
    }

    async fn set_enabled(&self, scaler_id: &str, enabled: bool) -> ClusterResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(scaler_id) {
            Some(scaler) => {
                scaler.enabled = enabled;
                scaler.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_scaling_action(
        &self,
        scaler_id: &str,
        at: DateTime<Utc>,
    ) -> ClusterResult<()> {
        let mut table = self.table.write().await;
        let scaler = table
            .rows
            .get_mut(scaler_id)
            .ok_or_else(|| ClusterError::AutoScalerNotFound {
                id: scaler_id.to_string(),
            })?;
        scaler.last_scaling_action = Some(at);
        scaler.updated_at = at;
        Ok(())
    }
}

/// 内存伸缩事件仓储
#[derive(Debug, Default)]
pub struct InMemoryScalingEventRepository {
    table: RwLock<Table<ScalingEvent>>,
}

impl InMemoryScalingEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScalingEventRepository for InMemoryScalingEventRepository {
    async fn create(&self, event: &ScalingEvent) -> ClusterResult<ScalingEvent> {
        let mut table = self.table.write().await;
        let mut created = event.clone();
        created.id = table.allocate_id();
        table.rows.insert(created.event_id.clone(), created.clone());
        Ok(created)
    }

    async fn complete(
        &self,
        event_id: &str,
        outcome: &ScalingOutcome,
        completed_at: DateTime<Utc>,
    ) -> ClusterResult<ScalingEvent> {
        let mut table = self.table.write().await;
        let event = table.rows.get_mut(event_id).ok_or_else(|| {
            ClusterError::Internal(format!("伸缩事件不存在: {event_id}"))
        })?;
        if event.is_completed() {
            return Err(ClusterError::InvalidTransition(format!(
                "伸缩事件 {event_id} 已完成，不能再次修改"
            )));
        }

        event.nodes_added = outcome.nodes_added.clone();
        event.nodes_removed = outcome.nodes_removed.clone();
        event.success = Some(outcome.success);
        event.error_message = outcome.error_message.clone();
        event.completed_at = Some(completed_at);
        Ok(event.clone())
    }

    async fn list_by_scaler(&self, scaler_id: &str) -> ClusterResult<Vec<ScalingEvent>> {
        let table = self.table.read().await;
        let events = table
            .rows
            .values()
            .filter(|e| e.scaler_id == scaler_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(events, |e: &ScalingEvent| e.id))
    }
}

/// 每个节点保留的指标采样数
pub const DEFAULT_METRIC_RETENTION: usize = 1_000;

/// 内存指标仓储，每个节点只保留最近的采样
#[derive(Debug)]
pub struct InMemoryNodeMetricRepository {
    samples: RwLock<HashMap<String, Vec<NodeMetric>>>,
    next_id: RwLock<i64>,
    retention: usize,
}

impl Default for InMemoryNodeMetricRepository {
    fn default() -> Self {
        Self::with_retention(DEFAULT_METRIC_RETENTION)
    }
}

impl InMemoryNodeMetricRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            next_id: RwLock::new(0),
            retention: retention.max(1),
        }
    }
}

#[async_trait]
impl NodeMetricRepository for InMemoryNodeMetricRepository {
    async fn append(&self, metric: &NodeMetric) -> ClusterResult<()> {
        let id = {
            let mut next_id = self.next_id.write().await;
            *next_id += 1;
            *next_id
        };
        let mut sample = metric.clone();
        sample.id = id;
        let mut samples = self.samples.write().await;
        let series = samples.entry(sample.node_id.clone()).or_default();
        series.push(sample);
        if series.len() > self.retention {
            let excess = series.len() - self.retention;
            series.drain(..excess);
        }
        Ok(())
    }

    async fn recent(&self, node_id: &str, limit: usize) -> ClusterResult<Vec<NodeMetric>> {
        let samples = self.samples.read().await;
        Ok(samples
            .get(node_id)
            .map(|series| series.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// 创建全部使用内存仓储的集群状态存储
pub fn in_memory_store() -> ClusterStore {
    ClusterStore::new(
        Arc::new(InMemoryNodeRepository::new()),
        Arc::new(InMemoryJobRepository::new()),
        Arc::new(InMemoryAutoScalerRepository::new()),
        Arc::new(InMemoryScalingEventRepository::new()),
        Arc::new(InMemoryNodeMetricRepository::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_core::models::NodeRegistration;

    fn test_node(host: &str) -> ClusterNode {
        let registration = NodeRegistration::new(host, host, "c1", 4.0, 8.0);
        ClusterNode::from_registration(&registration, 30_000)
    }

    #[tokio::test]
    async fn test_default_store_assigns_ids_and_rejects_duplicate_hosts() {
        let store = in_memory_store();
        let first = store.nodes.create(&test_node("host-1")).await.unwrap();
        let second = store.nodes.create(&test_node("host-2")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let duplicate = store.nodes.create(&test_node("host-1")).await;
        assert!(matches!(duplicate, Err(ClusterError::Validation(_))));
    }

    #[tokio::test]
    async fn test_metric_samples_are_capped_per_node() {
        let repo = InMemoryNodeMetricRepository::with_retention(3);
        let node = test_node("host-1");
        for usage in 1..=5 {
            let mut sampled = node.clone();
            sampled.cpu_usage_percent = usage as f64;
            repo.append(&NodeMetric::sample(&sampled, Utc::now()))
                .await
                .unwrap();
        }

        let recent = repo.recent(&node.node_id, 10).await.unwrap();
        let usages: Vec<f64> = recent.iter().map(|m| m.cpu_usage_percent).collect();
        assert_eq!(usages, vec![5.0, 4.0, 3.0]);
    }
}
