use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cluster_core::config::RegistryConfig;
use cluster_core::models::{
    ClusterNode, NodeMetric, NodeMetricsUpdate, NodeRegistration, NodeStatus,
};
use cluster_core::{CapacityLedger, ClusterError, ClusterResult, ClusterStore};
use cluster_infrastructure::MetricsCollector;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::failure_handler::NodeFailureHandler;

/// 一次心跳检查的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// 本次检查把节点标记为FAILED
    Failed,
    /// 节点已不是ACTIVE，不再需要监控
    Unmonitored,
}

struct MonitorHandle {
    generation: u64,
    stop: oneshot::Sender<()>,
}

/// 节点注册表
///
/// 负责注册、心跳、指标上报和下线。每个ACTIVE节点有一个心跳监控任务，
/// 监控在注册时启动，在节点失效、下线或关闭时停止。
/// 重新注册会替换旧的监控任务，旧任务通过代数判断不会误删新任务。
pub struct NodeRegistry {
    store: ClusterStore,
    capacity: CapacityLedger,
    config: RegistryConfig,
    metrics: MetricsCollector,
    failure_handler: Arc<dyn NodeFailureHandler>,
    capacity_freed: Arc<Notify>,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    next_generation: AtomicU64,
}

impl NodeRegistry {
    pub fn new(
        store: ClusterStore,
        capacity: CapacityLedger,
        config: RegistryConfig,
        metrics: MetricsCollector,
        failure_handler: Arc<dyn NodeFailureHandler>,
        capacity_freed: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            capacity,
            config,
            metrics,
            failure_handler,
            capacity_freed,
            monitors: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// 注册节点
    ///
    /// 同一集群中主机名相同的节点只会存在一个：已存在时刷新容量、标签和心跳，
    /// 状态重置为ACTIVE。
    pub async fn register_node(
        self: &Arc<Self>,
        registration: NodeRegistration,
    ) -> ClusterResult<ClusterNode> {
        registration.validate()?;

        let existing = self
            .store
            .nodes
            .find_by_hostname(&registration.cluster_id, &registration.hostname)
            .await?;

        let node = match existing {
            Some(existing) => self.refresh(&existing.node_id, &registration).await?,
            None => {
                let mut node = ClusterNode::from_registration(
                    &registration,
                    self.config.heartbeat_interval_ms as i64,
                );
                if registration.max_concurrent_jobs.is_none() {
                    node.max_concurrent_jobs = self.config.default_max_concurrent_jobs;
                }

                match self.store.nodes.create(&node).await {
                    Ok(created) => {
                        info!(
                            "注册新节点: node_id={}, hostname={}, cluster_id={}, cpu={}, memory={}GB",
                            created.node_id,
                            created.hostname,
                            created.cluster_id,
                            created.cpu_cores,
                            created.memory_gb
                        );
                        created
                    }
                    Err(create_err) => {
                        // 并发注册同一主机时由另一方创建
                        let raced = self
                            .store
                            .nodes
                            .find_by_hostname(&registration.cluster_id, &registration.hostname)
                            .await?;
                        match raced {
                            Some(existing) => {
                                self.refresh(&existing.node_id, &registration).await?
                            }
                            None => return Err(create_err),
                        }
                    }
                }
            }
        };

        self.start_monitor(&node).await;
        self.refresh_active_gauge().await;
        self.capacity_freed.notify_one();
        Ok(node)
    }

    async fn refresh(
        &self,
        node_id: &str,
        registration: &NodeRegistration,
    ) -> ClusterResult<ClusterNode> {
        let node = self
            .capacity
            .modify(node_id, |node| {
                node.refresh_from_registration(registration);
                Ok(())
            })
            .await?;
        info!(
            "节点重新注册: node_id={}, hostname={}",
            node.node_id, node.hostname
        );
        Ok(node)
    }

    /// 记录节点心跳，FAILED节点必须重新注册
    pub async fn heartbeat(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.capacity
            .modify(node_id, |node| {
                if node.status == NodeStatus::Failed {
                    return Err(ClusterError::NodeFailure {
                        node_id: node.node_id.clone(),
                    });
                }
                node.last_heartbeat = Utc::now();
                Ok(())
            })
            .await
    }

    /// 写入节点实时负载，同时视为一次心跳并追加指标采样
    pub async fn update_node_metrics(
        &self,
        node_id: &str,
        update: NodeMetricsUpdate,
    ) -> ClusterResult<ClusterNode> {
        update.validate()?;

        let now = Utc::now();
        let node = self
            .capacity
            .modify(node_id, |node| {
                if node.status == NodeStatus::Failed {
                    return Err(ClusterError::NodeFailure {
                        node_id: node.node_id.clone(),
                    });
                }
                node.apply_metrics(&update, now);
                Ok(())
            })
            .await?;

        self.store
            .metrics
            .append(&NodeMetric::sample(&node, now))
            .await?;
        debug!(
            "节点 {} 指标更新: cpu={:.1}%, memory={:.1}%, health={:.0}",
            node_id, node.cpu_usage_percent, node.memory_usage_percent, node.health_score
        );

        self.capacity_freed.notify_one();
        Ok(node)
    }

    /// 检查节点心跳，超时则标记FAILED并触发失效处理
    pub async fn check_liveness(&self, node_id: &str) -> ClusterResult<Liveness> {
        self.check_liveness_at(node_id, Utc::now()).await
    }

    pub async fn check_liveness_at(
        &self,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> ClusterResult<Liveness> {
        let node = self.capacity.get(node_id).await?;
        if node.status != NodeStatus::Active {
            return Ok(Liveness::Unmonitored);
        }
        let multiplier = self.config.failure_multiplier;
        if !node.is_heartbeat_expired(now, multiplier) {
            return Ok(Liveness::Alive);
        }

        let marked = self
            .capacity
            .modify(node_id, |node| {
                if node.status != NodeStatus::Active || !node.is_heartbeat_expired(now, multiplier)
                {
                    return Err(ClusterError::InvalidTransition(format!(
                        "节点 {} 状态已变化",
                        node.node_id
                    )));
                }
                node.status = NodeStatus::Failed;
                node.health_score = 0.0;
                Ok(())
            })
            .await;

        let failed = match marked {
            Ok(node) => node,
            Err(ClusterError::InvalidTransition(_)) => {
                // 标记前收到了心跳或节点被其他操作修改
                let node = self.capacity.get(node_id).await?;
                return Ok(if node.is_active() {
                    Liveness::Alive
                } else {
                    Liveness::Unmonitored
                });
            }
            Err(e) => return Err(e),
        };

        warn!(
            "{}: 最后心跳 {}，超过 {}ms 未收到心跳",
            ClusterError::NodeFailure {
                node_id: failed.node_id.clone()
            },
            failed.last_heartbeat,
            failed.heartbeat_timeout(multiplier).num_milliseconds()
        );
        self.metrics.record_node_failure(&failed.cluster_id);
        self.stop_monitor(node_id).await;
        self.refresh_active_gauge().await;

        match self.failure_handler.handle_node_failure(&failed).await {
            Ok(report) => info!(
                "节点 {} 失效处理完成: {} 个作业重新调度, {} 个重试耗尽",
                node_id,
                report.requeued.len(),
                report.exhausted.len()
            ),
            Err(e) => error!("节点 {} 失效处理出错: {}", node_id, e),
        }
        Ok(Liveness::Failed)
    }

    /// 下线空闲节点：ACTIVE → DRAINING → INACTIVE
    ///
    /// 仍有作业的节点返回 `SchedulingConflict`。
    pub async fn decommission_node(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.capacity
            .modify(node_id, |node| {
                if node.status != NodeStatus::Active {
                    return Err(ClusterError::InvalidTransition(format!(
                        "节点 {} 处于 {} 状态，无法下线",
                        node.node_id, node.status
                    )));
                }
                if node.current_job_count > 0 {
                    return Err(ClusterError::SchedulingConflict {
                        node_id: node.node_id.clone(),
                    });
                }
                node.status = NodeStatus::Draining;
                Ok(())
            })
            .await?;
        self.stop_monitor(node_id).await;

        let node = self
            .capacity
            .modify(node_id, |node| {
                if node.status != NodeStatus::Draining {
                    return Err(ClusterError::InvalidTransition(format!(
                        "节点 {} 处于 {} 状态，无法停用",
                        node.node_id, node.status
                    )));
                }
                node.status = NodeStatus::Inactive;
                Ok(())
            })
            .await?;

        info!("节点 {} 已下线", node_id);
        self.refresh_active_gauge().await;
        Ok(node)
    }

    pub async fn get_node(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.capacity.get(node_id).await
    }

    pub async fn list_nodes(&self, cluster_id: &str) -> ClusterResult<Vec<ClusterNode>> {
        self.store.nodes.list_by_cluster(cluster_id, None).await
    }

    pub async fn active_nodes(&self, cluster_id: &str) -> ClusterResult<Vec<ClusterNode>> {
        self.store
            .nodes
            .list_by_cluster(cluster_id, Some(NodeStatus::Active))
            .await
    }

    /// 最近的指标采样，最新的在前
    pub async fn recent_metrics(
        &self,
        node_id: &str,
        limit: usize,
    ) -> ClusterResult<Vec<NodeMetric>> {
        self.store.metrics.recent(node_id, limit).await
    }

    async fn start_monitor(self: &Arc<Self>, node: &ClusterNode) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let interval = Duration::from_millis(node.heartbeat_interval_ms.max(1) as u64);
        let node_id = node.node_id.clone();

        {
            let mut monitors = self.monitors.lock().await;
            if let Some(previous) = monitors.insert(
                node_id.clone(),
                MonitorHandle {
                    generation,
                    stop: stop_tx,
                },
            ) {
                let _ = previous.stop.send(());
            }
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            debug!("启动节点 {} 的心跳监控 (间隔 {:?})", node_id, interval);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("节点 {} 的心跳监控已停止", node_id);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                match registry.check_liveness(&node_id).await {
                    Ok(Liveness::Alive) => {}
                    Ok(Liveness::Failed) | Ok(Liveness::Unmonitored) => break,
                    Err(e) => warn!("检查节点 {} 心跳时出错: {}", node_id, e),
                }
            }
            registry.forget_monitor(&node_id, generation).await;
        });
    }

    async fn forget_monitor(&self, node_id: &str, generation: u64) {
        let mut monitors = self.monitors.lock().await;
        if monitors
            .get(node_id)
            .is_some_and(|handle| handle.generation == generation)
        {
            monitors.remove(node_id);
        }
    }

    pub async fn stop_monitor(&self, node_id: &str) -> bool {
        let handle = self.monitors.lock().await.remove(node_id);
        match handle {
            Some(handle) => {
                let _ = handle.stop.send(());
                true
            }
            None => false,
        }
    }

    pub async fn is_monitored(&self, node_id: &str) -> bool {
        self.monitors.lock().await.contains_key(node_id)
    }

    pub async fn monitor_count(&self) -> usize {
        self.monitors.lock().await.len()
    }

    /// 为存储中所有ACTIVE节点启动监控，用于进程重启后恢复
    pub async fn restore_monitors(self: &Arc<Self>) -> ClusterResult<usize> {
        let nodes = self.store.nodes.list_by_status(NodeStatus::Active).await?;
        for node in &nodes {
            self.start_monitor(node).await;
        }
        self.refresh_active_gauge().await;
        Ok(nodes.len())
    }

    /// 停止全部心跳监控
    pub async fn shutdown(&self) {
        let handles: Vec<MonitorHandle> = {
            let mut monitors = self.monitors.lock().await;
            monitors.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        for handle in handles {
            let _ = handle.stop.send(());
        }
        info!("已停止 {} 个节点心跳监控", count);
    }

    async fn refresh_active_gauge(&self) {
        match self.store.nodes.list_by_status(NodeStatus::Active).await {
            Ok(nodes) => self.metrics.update_active_nodes(nodes.len()),
            Err(e) => debug!("统计活跃节点失败: {}", e),
        }
    }
}
