use std::sync::Arc;
use std::time::Duration;

use cluster_core::config::AppConfig;
use cluster_core::models::{
    AutoScaler, AutoScalerSpec, ClusterNode, ClusterStatus, DistributedJob, JobEvent,
    JobSubmission, NodeMetric, NodeMetricsUpdate, NodeRegistration, ScalingEvent,
};
use cluster_core::{CapacityLedger, ClusterError, ClusterResult, ClusterStore, JobLedger};
use cluster_infrastructure::MetricsCollector;
use cluster_worker::{HandlerRegistry, JobExecutor};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::autoscaler::{AutoScalerController, NodeProvisioner, TemplateProvisioner};
use crate::failure_handler::{RescheduleManager, RescheduleReport};
use crate::node_registry::{Liveness, NodeRegistry};
use crate::pending_sweep::{PendingJobSweeper, SweepReport};
use crate::scheduler::{JobScheduler, ScheduleOutcome};
use crate::strategies::strategy_from_name;

/// 启动时的恢复统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupReport {
    pub monitored_nodes: usize,
    pub recovered_jobs: RescheduleReport,
    pub auto_scalers: usize,
}

/// ClusterManager 构建器
pub struct ClusterManagerBuilder {
    store: ClusterStore,
    config: AppConfig,
    handlers: Option<HandlerRegistry>,
    provisioner: Option<Arc<dyn NodeProvisioner>>,
    metrics: Option<MetricsCollector>,
}

impl ClusterManagerBuilder {
    pub fn new(store: ClusterStore, config: AppConfig) -> Self {
        Self {
            store,
            config,
            handlers: None,
            provisioner: None,
            metrics: None,
        }
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// 替换默认的按模板创建节点的供给方式
    pub fn provisioner(mut self, provisioner: Arc<dyn NodeProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ClusterResult<ClusterManager> {
        let config = self.config;
        let store = self.store;
        let metrics = self.metrics.unwrap_or_default();
        let max_attempts = config.scheduler.max_cas_attempts;

        let jobs = JobLedger::new(store.jobs.clone(), max_attempts);
        let capacity = CapacityLedger::new(store.nodes.clone(), max_attempts);
        let capacity_freed = Arc::new(Notify::new());

        let executor = JobExecutor::new(
            jobs.clone(),
            capacity.clone(),
            Arc::new(self.handlers.unwrap_or_default()),
            metrics.clone(),
            config.executor.max_timeout_minutes,
        )
        .with_capacity_notify(capacity_freed.clone());

        let scheduler = JobScheduler::new(
            store.clone(),
            jobs.clone(),
            capacity.clone(),
            strategy_from_name(&config.scheduler.placement_strategy)?,
            executor.clone(),
            metrics.clone(),
        );

        let reschedule = Arc::new(RescheduleManager::new(
            store.clone(),
            jobs.clone(),
            capacity.clone(),
            scheduler.clone(),
            executor.clone(),
            metrics.clone(),
            capacity_freed.clone(),
        ));

        let registry = Arc::new(NodeRegistry::new(
            store.clone(),
            capacity.clone(),
            config.registry.clone(),
            metrics.clone(),
            reschedule.clone(),
            capacity_freed.clone(),
        ));

        let provisioner = self
            .provisioner
            .unwrap_or_else(|| Arc::new(TemplateProvisioner::new(registry.clone())));
        let autoscaler = Arc::new(AutoScalerController::new(
            store.clone(),
            provisioner,
            config.autoscaler.clone(),
            metrics.clone(),
        ));

        let sweeper = Arc::new(PendingJobSweeper::new(
            store.clone(),
            scheduler.clone(),
            Duration::from_millis(config.scheduler.sweep_interval_ms),
            capacity_freed.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(ClusterManager {
            store,
            jobs,
            capacity,
            executor,
            scheduler,
            reschedule,
            registry,
            autoscaler,
            sweeper,
            metrics,
            capacity_freed,
            shutdown_tx,
            background: Mutex::new(Vec::new()),
            max_timeout_minutes: config.executor.max_timeout_minutes,
        })
    }
}

/// 集群调度子系统的入口
///
/// 对外提供节点注册、作业提交和取消、集群状态查询以及自动伸缩器管理。
/// `start` 启动后台循环，`shutdown` 停止全部监控和循环。
pub struct ClusterManager {
    store: ClusterStore,
    jobs: JobLedger,
    capacity: CapacityLedger,
    executor: JobExecutor,
    scheduler: JobScheduler,
    reschedule: Arc<RescheduleManager>,
    registry: Arc<NodeRegistry>,
    autoscaler: Arc<AutoScalerController>,
    sweeper: Arc<PendingJobSweeper>,
    metrics: MetricsCollector,
    capacity_freed: Arc<Notify>,
    shutdown_tx: broadcast::Sender<()>,
    background: Mutex<Vec<JoinHandle<()>>>,
    max_timeout_minutes: i32,
}

impl ClusterManager {
    pub fn builder(store: ClusterStore, config: AppConfig) -> ClusterManagerBuilder {
        ClusterManagerBuilder::new(store, config)
    }

    pub fn new(store: ClusterStore, config: AppConfig) -> ClusterResult<Self> {
        Self::builder(store, config).build()
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    // ---- 节点 ----

    pub async fn register_node(&self, registration: NodeRegistration) -> ClusterResult<ClusterNode> {
        self.registry.register_node(registration).await
    }

    pub async fn heartbeat(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.registry.heartbeat(node_id).await
    }

    pub async fn update_node_metrics(
        &self,
        node_id: &str,
        update: NodeMetricsUpdate,
    ) -> ClusterResult<ClusterNode> {
        self.registry.update_node_metrics(node_id, update).await
    }

    pub async fn check_node_liveness(&self, node_id: &str) -> ClusterResult<Liveness> {
        self.registry.check_liveness(node_id).await
    }

    pub async fn decommission_node(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.registry.decommission_node(node_id).await
    }

    pub async fn get_node(&self, node_id: &str) -> ClusterResult<ClusterNode> {
        self.registry.get_node(node_id).await
    }

    pub async fn list_nodes(&self, cluster_id: &str) -> ClusterResult<Vec<ClusterNode>> {
        self.registry.list_nodes(cluster_id).await
    }

    pub async fn node_metrics(&self, node_id: &str, limit: usize) -> ClusterResult<Vec<NodeMetric>> {
        self.registry.recent_metrics(node_id, limit).await
    }

    // ---- 作业 ----

    /// 校验并持久化PENDING作业，随后在后台尝试调度
    pub async fn submit_job(&self, submission: JobSubmission) -> ClusterResult<DistributedJob> {
        submission.validate()?;
        if submission.timeout_minutes > self.max_timeout_minutes {
            return Err(ClusterError::Validation(format!(
                "timeoutMinutes不能超过 {}: {}",
                self.max_timeout_minutes, submission.timeout_minutes
            )));
        }

        let job = self
            .store
            .jobs
            .create(&DistributedJob::from_submission(submission))
            .await?;
        self.metrics.record_job_submitted(&job.job_type);
        info!(
            "提交作业: job_id={}, job_type={}, cluster_id={}, priority={}",
            job.job_id, job.job_type, job.cluster_id, job.priority
        );

        self.scheduler.schedule_in_background(job.job_id.clone());
        Ok(job)
    }

    /// 立即对作业执行一次调度尝试
    pub async fn schedule_job(&self, job_id: &str) -> ClusterResult<ScheduleOutcome> {
        self.scheduler.try_schedule(job_id).await
    }

    /// 取消作业，终态作业返回 false 且不做任何修改
    pub async fn cancel_job(&self, job_id: &str) -> ClusterResult<bool> {
        let transition = match self.jobs.transition(job_id, JobEvent::Cancel).await {
            Ok(transition) => transition,
            Err(ClusterError::InvalidTransition(reason)) => {
                debug!("作业 {} 无法取消: {}", job_id, reason);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.executor.abort(job_id).await;
        self.capacity.apply_effects(&transition.effects).await?;
        if !transition.effects.is_empty() {
            self.capacity_freed.notify_one();
        }
        self.metrics.record_job_cancelled();
        info!("作业 {} 已取消", job_id);
        Ok(true)
    }

    pub async fn get_job(&self, job_id: &str) -> ClusterResult<DistributedJob> {
        self.jobs.get(job_id).await
    }

    pub async fn list_jobs(&self, cluster_id: &str) -> ClusterResult<Vec<DistributedJob>> {
        self.store.jobs.list_by_cluster(cluster_id).await
    }

    pub async fn sweep_pending_jobs(&self) -> ClusterResult<SweepReport> {
        self.sweeper.sweep_once().await
    }

    pub async fn get_cluster_status(&self, cluster_id: &str) -> ClusterResult<ClusterStatus> {
        let nodes = self.store.nodes.list_by_cluster(cluster_id, None).await?;
        let jobs = self.store.jobs.list_by_cluster(cluster_id).await?;
        Ok(ClusterStatus::summarize(cluster_id, &nodes, &jobs))
    }

    // ---- 自动伸缩 ----

    pub async fn create_auto_scaler(&self, spec: AutoScalerSpec) -> ClusterResult<AutoScaler> {
        spec.validate()?;
        let scaler = self
            .store
            .scalers
            .create(&AutoScaler::from_spec(spec))
            .await?;
        info!(
            "创建自动伸缩器: scaler_id={}, cluster_id={}, nodes=[{}, {}]",
            scaler.scaler_id, scaler.cluster_id, scaler.min_nodes, scaler.max_nodes
        );

        if scaler.enabled && self.autoscaler.is_enabled() {
            self.autoscaler.start_scaler(&scaler.scaler_id).await;
        }
        Ok(scaler)
    }

    /// 启用或停用伸缩器，同时启动或停止它的评估循环
    pub async fn set_auto_scaler_enabled(
        &self,
        scaler_id: &str,
        enabled: bool,
    ) -> ClusterResult<AutoScaler> {
        if !self.store.scalers.set_enabled(scaler_id, enabled).await? {
            return Err(ClusterError::AutoScalerNotFound {
                id: scaler_id.to_string(),
            });
        }

        if enabled && self.autoscaler.is_enabled() {
            self.autoscaler.start_scaler(scaler_id).await;
        } else {
            self.autoscaler.stop_scaler(scaler_id).await;
        }

        self.get_auto_scaler(scaler_id).await
    }

    pub async fn get_auto_scaler(&self, scaler_id: &str) -> ClusterResult<AutoScaler> {
        self.store
            .scalers
            .get(scaler_id)
            .await?
            .ok_or_else(|| ClusterError::AutoScalerNotFound {
                id: scaler_id.to_string(),
            })
    }

    pub async fn list_auto_scalers(&self) -> ClusterResult<Vec<AutoScaler>> {
        self.store.scalers.list().await
    }

    /// 立即评估一次伸缩器
    pub async fn evaluate_auto_scaler(&self, scaler_id: &str) -> ClusterResult<Option<ScalingEvent>> {
        self.autoscaler.evaluate_scaler(scaler_id).await
    }

    pub async fn is_auto_scaler_running(&self, scaler_id: &str) -> bool {
        self.autoscaler.is_running(scaler_id).await
    }

    pub async fn list_scaling_events(&self, scaler_id: &str) -> ClusterResult<Vec<ScalingEvent>> {
        self.store.scaling_events.list_by_scaler(scaler_id).await
    }

    // ---- 生命周期 ----

    /// 恢复监控和遗留作业，启动PENDING扫描和伸缩循环
    pub async fn start(&self) -> ClusterResult<StartupReport> {
        let monitored_nodes = self.registry.restore_monitors().await?;
        let recovered_jobs = self.reschedule.recover_orphaned_jobs().await?;

        let sweeper = self
            .sweeper
            .clone()
            .start(self.shutdown_tx.subscribe());
        self.background.lock().await.push(sweeper);

        let auto_scalers = self.autoscaler.start_all().await?;

        info!(
            "集群调度服务已启动: {} 个节点监控, {} 个伸缩器",
            monitored_nodes, auto_scalers
        );
        Ok(StartupReport {
            monitored_nodes,
            recovered_jobs,
            auto_scalers,
        })
    }

    pub async fn shutdown(&self) {
        info!("正在关闭集群调度服务");
        let _ = self.shutdown_tx.send(());

        self.registry.shutdown().await;
        self.autoscaler.shutdown().await;
        self.executor.abort_all().await;

        let handles: Vec<JoinHandle<()>> = self.background.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("集群调度服务已关闭");
    }
}
