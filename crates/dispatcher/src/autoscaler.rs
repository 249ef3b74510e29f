use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cluster_core::config::AutoScalerConfig;
use cluster_core::models::{
    AutoScaler, ClusterNode, NodeRegistration, NodeStatus, ScalingDirection, ScalingEvent,
    ScalingOutcome,
};
use cluster_core::{ClusterError, ClusterResult, ClusterStore};
use cluster_infrastructure::MetricsCollector;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::node_registry::NodeRegistry;

/// 节点供给接口，扩容创建节点，缩容下线节点
#[async_trait]
pub trait NodeProvisioner: Send + Sync {
    async fn provision(&self, scaler: &AutoScaler, count: usize)
        -> ClusterResult<Vec<ClusterNode>>;

    /// 返回实际下线的节点
    async fn decommission(&self, nodes: &[ClusterNode]) -> ClusterResult<Vec<ClusterNode>>;
}

/// 按伸缩器的节点模板在注册表中创建节点
pub struct TemplateProvisioner {
    registry: Arc<NodeRegistry>,
}

impl TemplateProvisioner {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    fn registration(scaler: &AutoScaler) -> NodeRegistration {
        let template = &scaler.node_template;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", template.name_prefix, &suffix[..8]);

        let mut registration = NodeRegistration::new(
            name.clone(),
            name,
            scaler.cluster_id.clone(),
            template.cpu_cores,
            template.memory_gb,
        );
        registration.node_type = template.node_type.clone();
        registration.storage_gb = Some(template.storage_gb);
        registration.gpu_count = Some(template.gpu_count);
        registration.labels = Some(template.labels.clone());
        registration.max_concurrent_jobs = template.max_concurrent_jobs;
        registration.region = template.region.clone();
        registration.availability_zone = template.availability_zone.clone();
        registration
    }
}

#[async_trait]
impl NodeProvisioner for TemplateProvisioner {
    async fn provision(
        &self,
        scaler: &AutoScaler,
        count: usize,
    ) -> ClusterResult<Vec<ClusterNode>> {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let node = self
                .registry
                .register_node(Self::registration(scaler))
                .await?;
            created.push(node);
        }
        Ok(created)
    }

    async fn decommission(&self, nodes: &[ClusterNode]) -> ClusterResult<Vec<ClusterNode>> {
        let mut removed = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.registry.decommission_node(&node.node_id).await {
                Ok(node) => removed.push(node),
                // 选中后被分配了作业的节点跳过
                Err(e) => warn!("下线节点 {} 失败: {}", node.node_id, e),
            }
        }
        Ok(removed)
    }
}

/// 一次伸缩决策
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    pub direction: ScalingDirection,
    pub trigger_metric: String,
    pub trigger_value: f64,
    pub threshold: f64,
    pub current_node_count: i32,
    pub target_node_count: i32,
}

/// 评估结果
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// 集群没有ACTIVE节点
    NoNodes,
    /// 利用率在目标范围内
    Hold,
    /// 已达到节点数上限或下限
    AtLimit(ScalingDirection),
    CoolingDown(ScalingDirection),
    Scale(ScalingDecision),
}

/// 根据ACTIVE节点的平均利用率做出伸缩决策
///
/// 节点数超出 [minNodes, maxNodes] 时优先回到范围内；
/// 否则平均CPU或内存超过目标时扩容，两者都低于 目标 × `scale_down_ratio` 时缩容。
pub fn evaluate(
    scaler: &AutoScaler,
    active_nodes: &[ClusterNode],
    now: DateTime<Utc>,
    scale_down_ratio: f64,
) -> Evaluation {
    if active_nodes.is_empty() {
        return Evaluation::NoNodes;
    }

    let count = active_nodes.len() as f64;
    let avg_cpu = active_nodes.iter().map(|n| n.cpu_usage_percent).sum::<f64>() / count;
    let avg_memory = active_nodes
        .iter()
        .map(|n| n.memory_usage_percent)
        .sum::<f64>()
        / count;
    let current = active_nodes.len() as i32;

    let trigger = if current < scaler.min_nodes {
        Some((
            ScalingDirection::Up,
            "node_count",
            current as f64,
            scaler.min_nodes as f64,
        ))
    } else if current > scaler.max_nodes {
        Some((
            ScalingDirection::Down,
            "node_count",
            current as f64,
            scaler.max_nodes as f64,
        ))
    } else if avg_cpu > scaler.target_cpu_utilization {
        Some((
            ScalingDirection::Up,
            "cpu_utilization",
            avg_cpu,
            scaler.target_cpu_utilization,
        ))
    } else if avg_memory > scaler.target_memory_utilization {
        Some((
            ScalingDirection::Up,
            "memory_utilization",
            avg_memory,
            scaler.target_memory_utilization,
        ))
    } else if avg_cpu < scaler.target_cpu_utilization * scale_down_ratio
        && avg_memory < scaler.target_memory_utilization * scale_down_ratio
    {
        Some((
            ScalingDirection::Down,
            "cpu_utilization",
            avg_cpu,
            scaler.target_cpu_utilization * scale_down_ratio,
        ))
    } else {
        None
    };

    let Some((direction, metric, value, threshold)) = trigger else {
        return Evaluation::Hold;
    };

    let at_limit = match direction {
        ScalingDirection::Up => current >= scaler.max_nodes,
        ScalingDirection::Down => current <= scaler.min_nodes,
    };
    if at_limit {
        return Evaluation::AtLimit(direction);
    }
    if scaler.in_cooldown(direction, now) {
        return Evaluation::CoolingDown(direction);
    }

    Evaluation::Scale(ScalingDecision {
        direction,
        trigger_metric: metric.to_string(),
        trigger_value: value,
        threshold,
        current_node_count: current,
        target_node_count: scaler.target_node_count(direction, current),
    })
}

/// 缩容候选：空闲的ACTIVE节点，CPU使用率低的优先，其次内存
pub fn select_nodes_for_removal(nodes: &[ClusterNode], count: usize) -> Vec<ClusterNode> {
    let mut idle: Vec<&ClusterNode> = nodes
        .iter()
        .filter(|n| n.status == NodeStatus::Active && n.current_job_count == 0)
        .collect();
    idle.sort_by(|a, b| {
        a.cpu_usage_percent
            .total_cmp(&b.cpu_usage_percent)
            .then(a.memory_usage_percent.total_cmp(&b.memory_usage_percent))
    });
    idle.into_iter().take(count).cloned().collect()
}

/// 同一伸缩器的评估不重叠，释放时移除标记
struct InProgressGuard {
    scaler_id: String,
    in_progress: Arc<StdMutex<HashSet<String>>>,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_progress.lock() {
            set.remove(&self.scaler_id);
        }
    }
}

/// 自动伸缩控制器：每个启用的伸缩器一个评估循环
pub struct AutoScalerController {
    store: ClusterStore,
    provisioner: Arc<dyn NodeProvisioner>,
    config: AutoScalerConfig,
    metrics: MetricsCollector,
    loops: Mutex<HashMap<String, oneshot::Sender<()>>>,
    in_progress: Arc<StdMutex<HashSet<String>>>,
}

impl AutoScalerController {
    pub fn new(
        store: ClusterStore,
        provisioner: Arc<dyn NodeProvisioner>,
        config: AutoScalerConfig,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            provisioner,
            config,
            metrics,
            loops: Mutex::new(HashMap::new()),
            in_progress: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    fn try_begin(&self, scaler_id: &str) -> Option<InProgressGuard> {
        let mut set = self.in_progress.lock().ok()?;
        if !set.insert(scaler_id.to_string()) {
            return None;
        }
        Some(InProgressGuard {
            scaler_id: scaler_id.to_string(),
            in_progress: Arc::clone(&self.in_progress),
        })
    }

    /// 执行一次评估，发生伸缩时返回完成的伸缩事件
    pub async fn evaluate_scaler(&self, scaler_id: &str) -> ClusterResult<Option<ScalingEvent>> {
        let Some(_guard) = self.try_begin(scaler_id) else {
            debug!("伸缩器 {} 正在伸缩中，跳过本次评估", scaler_id);
            return Ok(None);
        };

        let scaler = self
            .store
            .scalers
            .get(scaler_id)
            .await?
            .ok_or_else(|| ClusterError::AutoScalerNotFound {
                id: scaler_id.to_string(),
            })?;
        if !scaler.enabled {
            return Ok(None);
        }

        let nodes = self
            .store
            .nodes
            .list_by_cluster(&scaler.cluster_id, Some(NodeStatus::Active))
            .await?;

        match evaluate(&scaler, &nodes, Utc::now(), self.config.scale_down_ratio) {
            Evaluation::Scale(decision) => self.execute(&scaler, decision, &nodes).await.map(Some),
            Evaluation::NoNodes => {
                debug!("集群 {} 没有活跃节点，跳过伸缩评估", scaler.cluster_id);
                Ok(None)
            }
            Evaluation::Hold => Ok(None),
            Evaluation::AtLimit(direction) => {
                debug!(
                    "伸缩器 {} 已达到节点数限制，拒绝 {} 方向伸缩",
                    scaler_id, direction
                );
                Ok(None)
            }
            Evaluation::CoolingDown(direction) => {
                debug!("伸缩器 {} 处于 {} 方向冷却期", scaler_id, direction);
                Ok(None)
            }
        }
    }

    async fn execute(
        &self,
        scaler: &AutoScaler,
        decision: ScalingDecision,
        active_nodes: &[ClusterNode],
    ) -> ClusterResult<ScalingEvent> {
        let event = ScalingEvent::begin(
            &scaler.scaler_id,
            &scaler.cluster_id,
            decision.direction,
            &decision.trigger_metric,
            decision.trigger_value,
            decision.threshold,
            decision.current_node_count,
            decision.target_node_count,
        );
        let event = self.store.scaling_events.create(&event).await?;

        info!(
            "伸缩器 {} 触发{}: {}={:.1} (阈值 {:.1}), 节点数 {} → {}",
            scaler.scaler_id,
            match decision.direction {
                ScalingDirection::Up => "扩容",
                ScalingDirection::Down => "缩容",
            },
            decision.trigger_metric,
            decision.trigger_value,
            decision.threshold,
            decision.current_node_count,
            decision.target_node_count
        );

        let outcome = match decision.direction {
            ScalingDirection::Up => {
                let wanted = (decision.target_node_count - decision.current_node_count).max(0);
                self.scale_up(scaler, wanted as usize).await
            }
            ScalingDirection::Down => {
                let wanted = (decision.current_node_count - decision.target_node_count).max(0);
                self.scale_down(active_nodes, wanted as usize).await
            }
        };

        let now = Utc::now();
        let completed = self
            .store
            .scaling_events
            .complete(&event.event_id, &outcome, now)
            .await?;
        if outcome.success {
            self.store
                .scalers
                .record_scaling_action(&scaler.scaler_id, now)
                .await?;
        } else {
            warn!(
                "伸缩器 {} 伸缩失败: {}",
                scaler.scaler_id,
                outcome.error_message.as_deref().unwrap_or("未知错误")
            );
        }
        self.metrics
            .record_scaling_event(decision.direction.as_str(), outcome.success);
        Ok(completed)
    }

    async fn scale_up(&self, scaler: &AutoScaler, count: usize) -> ScalingOutcome {
        match self.provisioner.provision(scaler, count).await {
            Ok(nodes) => ScalingOutcome {
                success: !nodes.is_empty(),
                error_message: (nodes.len() < count)
                    .then(|| format!("仅创建了 {}/{} 个节点", nodes.len(), count)),
                nodes_added: nodes.into_iter().map(|n| n.node_id).collect(),
                nodes_removed: Vec::new(),
            },
            Err(e) => ScalingOutcome {
                success: false,
                error_message: Some(e.to_string()),
                ..Default::default()
            },
        }
    }

    async fn scale_down(&self, active_nodes: &[ClusterNode], count: usize) -> ScalingOutcome {
        let candidates = select_nodes_for_removal(active_nodes, count);
        if candidates.is_empty() {
            return ScalingOutcome {
                success: false,
                error_message: Some("没有可移除的空闲节点".to_string()),
                ..Default::default()
            };
        }

        match self.provisioner.decommission(&candidates).await {
            Ok(removed) => ScalingOutcome {
                success: !removed.is_empty(),
                error_message: (removed.len() < count)
                    .then(|| format!("仅移除了 {}/{} 个节点", removed.len(), count)),
                nodes_added: Vec::new(),
                nodes_removed: removed.into_iter().map(|n| n.node_id).collect(),
            },
            Err(e) => ScalingOutcome {
                success: false,
                error_message: Some(e.to_string()),
                ..Default::default()
            },
        }
    }

    /// 启动伸缩器的评估循环，已在运行时替换旧循环
    pub async fn start_scaler(self: &Arc<Self>, scaler_id: &str) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        if let Some(previous) = self
            .loops
            .lock()
            .await
            .insert(scaler_id.to_string(), stop_tx)
        {
            let _ = previous.send(());
        }

        let controller = Arc::clone(self);
        let scaler_id = scaler_id.to_string();
        let period = Duration::from_secs(self.config.evaluation_interval_seconds);
        tokio::spawn(async move {
            info!("启动伸缩器 {} 的评估循环 (间隔 {:?})", scaler_id, period);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                match controller.evaluate_scaler(&scaler_id).await {
                    Ok(_) => {}
                    Err(ClusterError::AutoScalerNotFound { .. }) => {
                        warn!("伸缩器 {} 不存在，停止评估循环", scaler_id);
                        break;
                    }
                    Err(e) => error!("伸缩器 {} 评估出错: {}", scaler_id, e),
                }
            }
            info!("伸缩器 {} 的评估循环已停止", scaler_id);
        });
    }

    pub async fn stop_scaler(&self, scaler_id: &str) -> bool {
        match self.loops.lock().await.remove(scaler_id) {
            Some(stop) => {
                let _ = stop.send(());
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, scaler_id: &str) -> bool {
        self.loops.lock().await.contains_key(scaler_id)
    }

    /// 为所有启用的伸缩器启动评估循环
    pub async fn start_all(self: &Arc<Self>) -> ClusterResult<usize> {
        if !self.config.enabled {
            info!("自动伸缩已禁用");
            return Ok(0);
        }
        let scalers = self.store.scalers.list_enabled().await?;
        for scaler in &scalers {
            self.start_scaler(&scaler.scaler_id).await;
        }
        Ok(scalers.len())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn shutdown(&self) {
        let loops: Vec<oneshot::Sender<()>> = {
            let mut loops = self.loops.lock().await;
            loops.drain().map(|(_, stop)| stop).collect()
        };
        for stop in loops {
            let _ = stop.send(());
        }
    }
}
