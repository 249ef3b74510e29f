use std::sync::Arc;
use std::time::Duration;

use cluster_core::models::{DistributedJob, JobStatus};
use cluster_core::{ClusterResult, ClusterStore};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::scheduler::{JobScheduler, ScheduleOutcome};

/// 一次扫描的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub visited: usize,
    pub scheduled: usize,
}

/// PENDING作业重新调度扫描
///
/// 周期触发，也会在容量释放（作业结束、取消、节点注册、指标更新）时被唤醒。
pub struct PendingJobSweeper {
    store: ClusterStore,
    scheduler: JobScheduler,
    interval: Duration,
    wakeup: Arc<Notify>,
}

/// 高优先级在前，同优先级先提交的在前
pub fn sweep_order(jobs: &mut [DistributedJob]) {
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

impl PendingJobSweeper {
    pub fn new(
        store: ClusterStore,
        scheduler: JobScheduler,
        interval: Duration,
        wakeup: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            scheduler,
            interval,
            wakeup,
        }
    }

    pub async fn sweep_once(&self) -> ClusterResult<SweepReport> {
        let mut pending = self.store.jobs.list_by_status(JobStatus::Pending).await?;
        sweep_order(&mut pending);

        let mut report = SweepReport {
            visited: pending.len(),
            scheduled: 0,
        };
        for job in &pending {
            match self.scheduler.try_schedule(&job.job_id).await {
                Ok(ScheduleOutcome::Scheduled { .. }) => report.scheduled += 1,
                Ok(_) => {}
                Err(e) => warn!("重新调度作业 {} 失败: {}", job.job_id, e),
            }
        }

        if report.scheduled > 0 {
            info!(
                "PENDING作业扫描: {} 个作业中 {} 个已调度",
                report.visited, report.scheduled
            );
        }
        Ok(report)
    }

    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("启动PENDING作业扫描 (间隔 {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("PENDING作业扫描收到关闭信号");
                        break;
                    }
                    _ = ticker.tick() => {}
                    _ = self.wakeup.notified() => {
                        debug!("容量变化，触发PENDING作业扫描");
                    }
                }
                if let Err(e) = self.sweep_once().await {
                    warn!("PENDING作业扫描出错: {}", e);
                }
            }
        })
    }
}
