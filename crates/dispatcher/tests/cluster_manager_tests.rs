use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use cluster_core::config::AppConfig;
use cluster_core::models::{
    AutoScalerSpec, ClusterNode, DistributedJob, JobStatus, JobSubmission, NodeMetricsUpdate,
    NodeRegistration, NodeStatus, ResourceRequirements, RETRIES_EXHAUSTED_MESSAGE,
};
use cluster_core::ClusterError;
use cluster_dispatcher::{ClusterManager, Liveness, ScheduleOutcome};
use cluster_infrastructure::in_memory_store;
use serde_json::json;

const CLUSTER: &str = "cluster-1";

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.sweep_interval_ms = 50;
    config.autoscaler.evaluation_interval_seconds = 3600;
    config
}

fn manager() -> ClusterManager {
    ClusterManager::new(in_memory_store(), test_config()).unwrap()
}

fn registration(host: &str, cores: f64, memory: f64) -> NodeRegistration {
    NodeRegistration::new(host, host, CLUSTER, cores, memory)
}

fn submission(cores: f64, memory: f64, config: serde_json::Value) -> JobSubmission {
    let mut submission = JobSubmission::new(
        "job",
        "generic",
        CLUSTER,
        ResourceRequirements {
            cpu_cores: cores,
            memory_gb: memory,
            ..Default::default()
        },
    );
    submission.job_config = config;
    submission.timeout_minutes = 5;
    submission
}

fn long_running() -> serde_json::Value {
    json!({"duration_ms": 600_000})
}

async fn wait_for_job<F>(manager: &ClusterManager, job_id: &str, pred: F) -> Result<DistributedJob>
where
    F: Fn(&DistributedJob) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = manager.get_job(job_id).await?;
        if pred(&job) {
            return Ok(job);
        }
        if tokio::time::Instant::now() > deadline {
            bail!("job {job_id} stuck in {}", job.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_status(
    manager: &ClusterManager,
    job_id: &str,
    status: JobStatus,
) -> Result<DistributedJob> {
    wait_for_job(manager, job_id, |job| job.status == status).await
}

async fn wait_for_node<F>(manager: &ClusterManager, node_id: &str, pred: F) -> Result<ClusterNode>
where
    F: Fn(&ClusterNode) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let node = manager.get_node(node_id).await?;
        if pred(&node) {
            return Ok(node);
        }
        if tokio::time::Instant::now() > deadline {
            bail!(
                "node {node_id} stuck at {} running / {} queued",
                node.current_job_count,
                node.job_queue_size
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 把节点的心跳判定时间推到很久之后，触发失效
async fn fail_node(manager: &ClusterManager, node_id: &str) -> Result<()> {
    let later = Utc::now() + chrono::Duration::hours(1);
    let liveness = manager.registry().check_liveness_at(node_id, later).await?;
    assert_eq!(liveness, Liveness::Failed);
    Ok(())
}

#[tokio::test]
async fn test_end_to_end_generic_job() -> Result<()> {
    let manager = manager();
    let mut reg = registration("host-1", 4.0, 8.0);
    reg.max_concurrent_jobs = Some(10);
    let node = manager.register_node(reg).await?;

    let job = manager
        .submit_job(submission(1.0, 1.0, json!({"duration_ms": 500})))
        .await?;
    assert_eq!(job.status, JobStatus::Pending);

    let running = wait_for_status(&manager, &job.job_id, JobStatus::Running).await?;
    assert_eq!(running.assigned_node_id.as_deref(), Some(node.node_id.as_str()));
    // 出队在RUNNING提交之后执行
    let during = wait_for_node(&manager, &node.node_id, |n| n.job_queue_size == 0).await?;
    assert_eq!(during.current_job_count, 1);

    let done = wait_for_status(&manager, &job.job_id, JobStatus::Completed).await?;
    assert!(done.duration_seconds.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.assigned_node_id.is_none());

    let after = manager.get_node(&node.node_id).await?;
    assert_eq!(after.current_job_count, 0);
    assert_eq!(after.job_queue_size, 0);

    let status = manager.get_cluster_status(CLUSTER).await?;
    assert_eq!(status.nodes.total, 1);
    assert_eq!(status.nodes.active, 1);
    assert_eq!(status.jobs.completed, 1);
    assert_eq!(status.jobs.success_rate_percent, 100.0);
    assert_eq!(status.resources.total_cores, 4.0);
    Ok(())
}

#[tokio::test]
async fn test_oversized_job_stays_pending() -> Result<()> {
    let manager = manager();
    manager.register_node(registration("small", 2.0, 4.0)).await?;

    let job = manager.submit_job(submission(8.0, 1.0, json!({}))).await?;
    assert_eq!(
        manager.schedule_job(&job.job_id).await?,
        ScheduleOutcome::Unplaceable
    );

    let report = manager.sweep_pending_jobs().await?;
    assert_eq!(report.visited, 1);
    assert_eq!(report.scheduled, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stored = manager.get_job(&job.job_id).await?;
    assert_eq!(stored.status, JobStatus::Pending);
    assert!(stored.assigned_node_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_job_placed_on_least_loaded_node() -> Result<()> {
    let manager = manager();
    let node_a = manager.register_node(registration("node-a", 4.0, 8.0)).await?;
    let node_b = manager.register_node(registration("node-b", 2.0, 4.0)).await?;
    let metrics = |usage: f64| NodeMetricsUpdate {
        cpu_usage: usage,
        memory_usage: usage,
        ..Default::default()
    };
    manager
        .update_node_metrics(&node_a.node_id, metrics(10.0))
        .await?;
    manager
        .update_node_metrics(&node_b.node_id, metrics(50.0))
        .await?;

    let job = manager
        .submit_job(submission(1.0, 1.0, long_running()))
        .await?;
    let running = wait_for_status(&manager, &job.job_id, JobStatus::Running).await?;
    assert_eq!(running.assigned_node_id, Some(node_a.node_id.clone()));

    assert!(manager.cancel_job(&job.job_id).await?);
    Ok(())
}

#[tokio::test]
async fn test_node_failure_requeues_running_job() -> Result<()> {
    let manager = manager();
    let node = manager.register_node(registration("host-1", 4.0, 8.0)).await?;
    assert_eq!(node.heartbeat_interval_ms, 30_000);

    let job = manager
        .submit_job(submission(1.0, 1.0, long_running()))
        .await?;
    wait_for_status(&manager, &job.job_id, JobStatus::Running).await?;
    wait_for_node(&manager, &node.node_id, |n| n.job_queue_size == 0).await?;

    // 3 × 30s 的边界上仍然存活，超过即失效
    let registry = manager.registry();
    let boundary = node.last_heartbeat + chrono::Duration::seconds(90);
    assert_eq!(
        registry.check_liveness_at(&node.node_id, boundary).await?,
        Liveness::Alive
    );
    let past = boundary + chrono::Duration::milliseconds(1);
    assert_eq!(
        registry.check_liveness_at(&node.node_id, past).await?,
        Liveness::Failed
    );

    let failed_node = manager.get_node(&node.node_id).await?;
    assert_eq!(failed_node.status, NodeStatus::Failed);
    assert_eq!(failed_node.health_score, 0.0);
    assert_eq!(failed_node.current_job_count, 0);
    assert_eq!(failed_node.job_queue_size, 0);
    assert!(!registry.is_monitored(&node.node_id).await);

    let requeued = manager.get_job(&job.job_id).await?;
    assert_eq!(requeued.status, JobStatus::Pending);
    assert_eq!(requeued.retry_count, 1);
    assert!(requeued.assigned_node_id.is_none());
    assert!(requeued.last_retry_at.is_some());
    assert!(!manager.executor().is_running(&job.job_id).await);

    // 失效节点必须重新注册
    assert!(matches!(
        manager.heartbeat(&node.node_id).await,
        Err(ClusterError::NodeFailure { .. })
    ));
    let idle = NodeMetricsUpdate {
        cpu_usage: 5.0,
        memory_usage: 5.0,
        ..Default::default()
    };
    assert!(matches!(
        manager.update_node_metrics(&node.node_id, idle).await,
        Err(ClusterError::NodeFailure { .. })
    ));
    let still_failed = manager.get_node(&node.node_id).await?;
    assert_eq!(still_failed.status, NodeStatus::Failed);
    assert_eq!(still_failed.health_score, 0.0);

    let back = manager.register_node(registration("host-1", 4.0, 8.0)).await?;
    assert_eq!(back.node_id, node.node_id);
    assert_eq!(back.status, NodeStatus::Active);
    assert!(back.health_score > 0.0);
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_monitor_marks_silent_node_failed() -> Result<()> {
    let manager = manager();
    let mut reg = registration("flaky", 4.0, 8.0);
    reg.heartbeat_interval_ms = Some(50);
    let node = manager.register_node(reg).await?;
    assert!(manager.registry().is_monitored(&node.node_id).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        manager.get_node(&node.node_id).await?.status,
        NodeStatus::Active
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        manager.get_node(&node.node_id).await?.status,
        NodeStatus::Failed
    );
    assert!(!manager.registry().is_monitored(&node.node_id).await);
    Ok(())
}

#[tokio::test]
async fn test_heartbeats_keep_node_alive() -> Result<()> {
    let manager = manager();
    let mut reg = registration("steady", 4.0, 8.0);
    reg.heartbeat_interval_ms = Some(50);
    let node = manager.register_node(reg).await?;

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(40)).await;
        manager.heartbeat(&node.node_id).await?;
    }
    assert_eq!(
        manager.get_node(&node.node_id).await?.status,
        NodeStatus::Active
    );
    manager.registry().shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_retries_exhausted_after_repeated_node_failures() -> Result<()> {
    let manager = manager();
    let mut sub = submission(1.0, 1.0, long_running());
    sub.max_retries = 2;
    let job = manager.submit_job(sub).await?;

    for round in 0..3 {
        let node = manager
            .register_node(registration(&format!("host-{round}"), 4.0, 8.0))
            .await?;
        let outcome = manager.schedule_job(&job.job_id).await?;
        assert!(
            matches!(outcome, ScheduleOutcome::Scheduled { .. } | ScheduleOutcome::NotPending),
            "round {round}: {outcome:?}"
        );
        let running = wait_for_status(&manager, &job.job_id, JobStatus::Running).await?;
        assert_eq!(running.assigned_node_id, Some(node.node_id.clone()));
        fail_node(&manager, &node.node_id).await?;
    }

    let failed = manager.get_job(&job.job_id).await?;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.retry_count, 3);
    assert_eq!(failed.error_message.as_deref(), Some(RETRIES_EXHAUSTED_MESSAGE));

    // 之后有新节点也不会再调度
    manager
        .register_node(registration("fresh", 4.0, 8.0))
        .await?;
    assert_eq!(
        manager.schedule_job(&job.job_id).await?,
        ScheduleOutcome::NotPending
    );
    manager.sweep_pending_jobs().await?;
    assert_eq!(
        manager.get_job(&job.job_id).await?.status,
        JobStatus::Failed
    );
    Ok(())
}

#[tokio::test]
async fn test_cancel_semantics() -> Result<()> {
    let manager = manager();
    let node = manager.register_node(registration("host-1", 4.0, 8.0)).await?;

    // PENDING
    let pending = manager.submit_job(submission(64.0, 1.0, json!({}))).await?;
    assert!(manager.cancel_job(&pending.job_id).await?);
    assert_eq!(
        manager.get_job(&pending.job_id).await?.status,
        JobStatus::Cancelled
    );
    assert!(!manager.cancel_job(&pending.job_id).await?);

    // RUNNING
    let running = manager
        .submit_job(submission(1.0, 1.0, long_running()))
        .await?;
    wait_for_status(&manager, &running.job_id, JobStatus::Running).await?;
    let busy = wait_for_node(&manager, &node.node_id, |n| n.job_queue_size == 0).await?;
    assert_eq!(busy.current_job_count, 1);

    assert!(manager.cancel_job(&running.job_id).await?);
    let cancelled = manager.get_job(&running.job_id).await?;
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.assigned_node_id.is_none());
    let node_after = manager.get_node(&node.node_id).await?;
    assert_eq!(node_after.current_job_count, 0);
    assert_eq!(node_after.job_queue_size, 0);
    assert!(!manager.executor().is_running(&running.job_id).await);

    // COMPLETED
    let quick = manager.submit_job(submission(1.0, 1.0, json!({}))).await?;
    let done = wait_for_status(&manager, &quick.job_id, JobStatus::Completed).await?;
    assert!(!manager.cancel_job(&quick.job_id).await?);
    let unchanged = manager.get_job(&quick.job_id).await?;
    assert_eq!(unchanged.status, JobStatus::Completed);
    assert_eq!(unchanged.version, done.version);

    assert!(matches!(
        manager.cancel_job("job-missing").await,
        Err(ClusterError::JobNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_submissions_respect_slot_limit() -> Result<()> {
    let manager = manager();
    let mut reg = registration("host-1", 16.0, 32.0);
    reg.max_concurrent_jobs = Some(3);
    let node = manager.register_node(reg).await?;

    let mut job_ids = Vec::new();
    for _ in 0..10 {
        let job = manager
            .submit_job(submission(1.0, 1.0, long_running()))
            .await?;
        job_ids.push(job.job_id);
    }
    for _ in 0..3 {
        manager.sweep_pending_jobs().await?;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut holding = 0;
    for job_id in &job_ids {
        if manager.get_job(job_id).await?.status.holds_node_slot() {
            holding += 1;
        }
    }
    assert_eq!(holding, 3);
    assert_eq!(manager.get_node(&node.node_id).await?.current_job_count, 3);
    Ok(())
}

#[tokio::test]
async fn test_sweeper_schedules_job_when_capacity_frees() -> Result<()> {
    let manager = manager();
    manager.start().await?;
    let mut reg = registration("host-1", 4.0, 8.0);
    reg.max_concurrent_jobs = Some(1);
    let node = manager.register_node(reg).await?;

    let first = manager
        .submit_job(submission(1.0, 1.0, long_running()))
        .await?;
    wait_for_status(&manager, &first.job_id, JobStatus::Running).await?;

    let second = manager.submit_job(submission(1.0, 1.0, json!({}))).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        manager.get_job(&second.job_id).await?.status,
        JobStatus::Pending
    );

    assert!(manager.cancel_job(&first.job_id).await?);
    let done = wait_for_status(&manager, &second.job_id, JobStatus::Completed).await?;
    assert_eq!(done.output_data.unwrap()["nodeId"], json!(node.node_id));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_submission_validation_persists_nothing() -> Result<()> {
    let manager = manager();

    let mut empty_type = submission(1.0, 1.0, json!({}));
    empty_type.job_type = String::new();
    assert!(matches!(
        manager.submit_job(empty_type).await,
        Err(ClusterError::Validation(_))
    ));

    let mut too_long = submission(1.0, 1.0, json!({}));
    too_long.timeout_minutes = 10_000;
    assert!(matches!(
        manager.submit_job(too_long).await,
        Err(ClusterError::Validation(_))
    ));

    assert!(matches!(
        manager.submit_job(submission(1.0, 1.0, json!([1, 2]))).await,
        Err(ClusterError::Validation(_))
    ));
    assert!(manager.list_jobs(CLUSTER).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_registration_is_idempotent() -> Result<()> {
    let manager = manager();
    let first = manager.register_node(registration("host-1", 4.0, 8.0)).await?;

    let mut again = registration("host-1", 8.0, 16.0);
    again.labels = Some([("zone".to_string(), "a".to_string())].into_iter().collect());
    let second = manager.register_node(again).await?;

    assert_eq!(first.node_id, second.node_id);
    assert_eq!(second.cpu_cores, 8.0);
    assert_eq!(second.labels.get("zone").map(String::as_str), Some("a"));
    assert_eq!(manager.list_nodes(CLUSTER).await?.len(), 1);
    assert_eq!(manager.registry().monitor_count().await, 1);

    let invalid = registration("host-2", 0.0, 8.0);
    assert!(matches!(
        manager.register_node(invalid).await,
        Err(ClusterError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_metrics_update_records_sample_and_health() -> Result<()> {
    let manager = manager();
    let node = manager.register_node(registration("host-1", 4.0, 8.0)).await?;

    let updated = manager
        .update_node_metrics(
            &node.node_id,
            NodeMetricsUpdate {
                cpu_usage: 95.0,
                memory_usage: 85.0,
                storage_usage: Some(10.0),
                network_io: Some(12.5),
            },
        )
        .await?;
    assert_eq!(updated.health_score, 70.0);
    assert!(updated.last_heartbeat >= node.last_heartbeat);

    let samples = manager.node_metrics(&node.node_id, 10).await?;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].cpu_usage_percent, 95.0);

    assert!(matches!(
        manager
            .update_node_metrics(
                &node.node_id,
                NodeMetricsUpdate {
                    cpu_usage: 120.0,
                    memory_usage: 10.0,
                    ..Default::default()
                },
            )
            .await,
        Err(ClusterError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_startup_recovers_orphaned_running_job() -> Result<()> {
    let store = in_memory_store();

    // 上一个进程留下的RUNNING作业
    let previous = ClusterManager::new(store.clone(), test_config())?;
    previous.register_node(registration("host-1", 4.0, 8.0)).await?;
    // 没有重试预算的作业也必须在重启后继续执行
    let mut no_retries = submission(1.0, 1.0, long_running());
    no_retries.max_retries = 0;
    let job = previous.submit_job(no_retries).await?;
    wait_for_status(&previous, &job.job_id, JobStatus::Running).await?;
    previous.registry().shutdown().await;
    previous.executor().abort_all().await;

    let manager = ClusterManager::new(store, test_config())?;
    let report = manager.start().await?;
    assert_eq!(report.monitored_nodes, 1);
    assert_eq!(report.recovered_jobs.requeued, vec![job.job_id.clone()]);
    assert!(report.recovered_jobs.exhausted.is_empty());

    let resumed = wait_for_status(&manager, &job.job_id, JobStatus::Running).await?;
    assert_eq!(resumed.retry_count, 0);
    assert!(resumed.error_message.is_none());
    let node = manager.get_node(resumed.assigned_node_id.as_deref().unwrap()).await?;
    assert_eq!(node.current_job_count, 1);

    manager.shutdown().await;
    assert_eq!(manager.registry().monitor_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_auto_scaler_stays_within_bounds() -> Result<()> {
    let manager = manager();
    let seed = manager.register_node(registration("seed", 4.0, 8.0)).await?;

    let mut spec = AutoScalerSpec::new(CLUSTER, 1, 3);
    spec.scale_up_cooldown = 0;
    spec.scale_down_cooldown = 0;
    let scaler = manager.create_auto_scaler(spec).await?;
    assert!(manager.is_auto_scaler_running(&scaler.scaler_id).await);

    let set_load = |usage: f64| {
        let manager = &manager;
        async move {
            for node in manager.list_nodes(CLUSTER).await? {
                if node.status == NodeStatus::Active {
                    manager
                        .update_node_metrics(
                            &node.node_id,
                            NodeMetricsUpdate {
                                cpu_usage: usage,
                                memory_usage: usage,
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
            anyhow::Ok(())
        }
    };
    let active_count = || async {
        anyhow::Ok(
            manager
                .list_nodes(CLUSTER)
                .await?
                .iter()
                .filter(|n| n.status == NodeStatus::Active)
                .count(),
        )
    };

    for _ in 0..5 {
        set_load(95.0).await?;
        manager.evaluate_auto_scaler(&scaler.scaler_id).await?;
        let count = active_count().await?;
        assert!((1..=3).contains(&count), "scaled to {count}");
    }
    assert_eq!(active_count().await?, 3);

    for _ in 0..5 {
        set_load(1.0).await?;
        manager.evaluate_auto_scaler(&scaler.scaler_id).await?;
        let count = active_count().await?;
        assert!((1..=3).contains(&count), "scaled to {count}");
    }
    assert_eq!(active_count().await?, 1);

    let events = manager.list_scaling_events(&scaler.scaler_id).await?;
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.success == Some(true) && e.completed_at.is_some()));

    // 下线的节点经过 DRAINING 后变为 INACTIVE，不会被硬删除
    let nodes = manager.list_nodes(CLUSTER).await?;
    assert_eq!(nodes.len(), 3);
    assert_eq!(
        nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Inactive)
            .count(),
        2
    );
    assert!(nodes.iter().any(|n| n.node_id == seed.node_id));

    let disabled = manager
        .set_auto_scaler_enabled(&scaler.scaler_id, false)
        .await?;
    assert!(!disabled.enabled);
    assert!(!manager.is_auto_scaler_running(&scaler.scaler_id).await);
    Ok(())
}

#[tokio::test]
async fn test_scale_up_cooldown_blocks_repeat() -> Result<()> {
    let manager = manager();
    let node = manager.register_node(registration("seed", 4.0, 8.0)).await?;
    manager
        .update_node_metrics(
            &node.node_id,
            NodeMetricsUpdate {
                cpu_usage: 99.0,
                memory_usage: 99.0,
                ..Default::default()
            },
        )
        .await?;

    let mut spec = AutoScalerSpec::new(CLUSTER, 1, 10);
    spec.scale_up_cooldown = 3600;
    spec.node_template.labels.insert("pool".to_string(), "auto".to_string());
    let scaler = manager.create_auto_scaler(spec).await?;

    let first = manager
        .evaluate_auto_scaler(&scaler.scaler_id)
        .await?
        .expect("first evaluation scales up");
    assert_eq!(first.nodes_added.len(), 1);
    assert_eq!(first.current_node_count, 1);
    assert_eq!(first.target_node_count, 2);
    assert_eq!(first.trigger_metric, "cpu_utilization");

    let added = manager.get_node(&first.nodes_added[0]).await?;
    assert_eq!(added.labels.get("pool").map(String::as_str), Some("auto"));
    assert!(manager.registry().is_monitored(&added.node_id).await);

    // 新节点空闲，平均负载仍高于目标，但处于冷却期
    manager
        .update_node_metrics(
            &added.node_id,
            NodeMetricsUpdate {
                cpu_usage: 99.0,
                memory_usage: 99.0,
                ..Default::default()
            },
        )
        .await?;
    assert!(manager
        .evaluate_auto_scaler(&scaler.scaler_id)
        .await?
        .is_none());
    assert_eq!(manager.list_scaling_events(&scaler.scaler_id).await?.len(), 1);

    let stored = manager.get_auto_scaler(&scaler.scaler_id).await?;
    assert!(stored.last_scaling_action.is_some());
    Ok(())
}

#[tokio::test]
async fn test_auto_scaler_validation() -> Result<()> {
    let manager = manager();
    assert!(matches!(
        manager
            .create_auto_scaler(AutoScalerSpec::new(CLUSTER, 5, 2))
            .await,
        Err(ClusterError::Validation(_))
    ));
    assert!(manager.list_auto_scalers().await?.is_empty());
    assert!(matches!(
        manager.set_auto_scaler_enabled("scaler-missing", true).await,
        Err(ClusterError::AutoScalerNotFound { .. })
    ));
    Ok(())
}
