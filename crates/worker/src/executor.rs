use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cluster_core::models::{DistributedJob, JobEvent, JobStatus, JobTransition};
use cluster_core::{CapacityLedger, ClusterError, ClusterResult, JobLedger};
use cluster_infrastructure::MetricsCollector;
use tokio::sync::{oneshot, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handler::JobContext;
use crate::registry::HandlerRegistry;

/// 提交执行结果失败时的退避区间
const COMMIT_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);
const COMMIT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

struct RunningJob {
    run_id: u64,
    node_id: String,
    attempt: i32,
    cancel: oneshot::Sender<()>,
}

enum RunOutcome {
    Completed(serde_json::Value),
    Failed(String),
    TimedOut(i32),
    Aborted,
}

/// 作业执行器
///
/// 每个被调度的作业在独立任务中执行：先把作业置为 RUNNING，
/// 再在超时限制内运行处理器，最后提交 COMPLETED 或 FAILED。
/// 作业在执行期间被取消或重新调度时，迟到的结果会被状态机拒绝。
#[derive(Clone)]
pub struct JobExecutor {
    jobs: JobLedger,
    capacity: CapacityLedger,
    handlers: Arc<HandlerRegistry>,
    metrics: MetricsCollector,
    max_timeout_minutes: i32,
    running_jobs: Arc<RwLock<HashMap<String, RunningJob>>>,
    next_run_id: Arc<AtomicU64>,
    capacity_freed: Arc<Notify>,
}

impl JobExecutor {
    pub fn new(
        jobs: JobLedger,
        capacity: CapacityLedger,
        handlers: Arc<HandlerRegistry>,
        metrics: MetricsCollector,
        max_timeout_minutes: i32,
    ) -> Self {
        Self {
            jobs,
            capacity,
            handlers,
            metrics,
            max_timeout_minutes: max_timeout_minutes.max(1),
            running_jobs: Arc::new(RwLock::new(HashMap::new())),
            next_run_id: Arc::new(AtomicU64::new(1)),
            capacity_freed: Arc::new(Notify::new()),
        }
    }

    /// 作业结束并归还槽位后通知该信号
    pub fn with_capacity_notify(mut self, notify: Arc<Notify>) -> Self {
        self.capacity_freed = notify;
        self
    }

    pub fn capacity_notify(&self) -> Arc<Notify> {
        self.capacity_freed.clone()
    }

    fn effective_timeout_minutes(&self, job: &DistributedJob) -> i32 {
        job.timeout_minutes.clamp(1, self.max_timeout_minutes)
    }

    /// 在节点上异步执行已调度的作业
    ///
    /// 返回前作业已登记为运行中，之后的 [`abort`](Self::abort) 一定能找到它。
    pub async fn spawn(&self, job: DistributedJob, node_id: String) -> JoinHandle<()> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut running_jobs = self.running_jobs.write().await;
            // 同一作业的旧执行被替换时，丢弃的发送端会让旧执行退出
            running_jobs.insert(
                job.job_id.clone(),
                RunningJob {
                    run_id,
                    node_id: node_id.clone(),
                    attempt: job.attempt(),
                    cancel: cancel_tx,
                },
            );
        }

        let executor = self.clone();
        tokio::spawn(async move {
            let job_id = job.job_id.clone();
            if let Err(e) = executor.run(job, node_id, run_id, cancel_rx).await {
                error!("作业 {} 执行流程出错: {}", job_id, e);
            }
            executor.unregister(&job_id, run_id).await;
        })
    }

    async fn unregister(&self, job_id: &str, run_id: u64) {
        let mut running_jobs = self.running_jobs.write().await;
        if running_jobs
            .get(job_id)
            .is_some_and(|running| running.run_id == run_id)
        {
            running_jobs.remove(job_id);
        }
    }

    async fn run(
        &self,
        job: DistributedJob,
        node_id: String,
        run_id: u64,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> ClusterResult<()> {
        let attempt = job.attempt();
        let started = match self
            .jobs
            .transition(
                &job.job_id,
                JobEvent::Start {
                    node_id: node_id.clone(),
                    attempt,
                },
            )
            .await
        {
            Ok(transition) => transition,
            Err(ClusterError::InvalidTransition(reason)) => {
                debug!("作业 {} 已不在待执行状态，放弃执行: {}", job.job_id, reason);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = self.capacity.apply_effects(&started.effects).await {
            warn!("作业 {} 出队时更新节点 {} 失败: {}", job.job_id, node_id, e);
        }

        let timeout_minutes = self.effective_timeout_minutes(&started.job);
        let timeout = Duration::from_secs(timeout_minutes as u64 * 60);
        let handler = self.handlers.resolve(&started.job.job_type);
        let context = JobContext::new(&started.job, node_id.clone());

        info!(
            "开始执行作业: job_id={}, job_type={}, node_id={}, attempt={}, run_id={}, timeout={}min",
            job.job_id, job.job_type, node_id, attempt, run_id, timeout_minutes
        );

        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, handler.execute(&context)) => match result {
                Ok(Ok(output)) => RunOutcome::Completed(output),
                Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
                Err(_) => RunOutcome::TimedOut(timeout_minutes),
            },
            _ = &mut cancel_rx => RunOutcome::Aborted,
        };

        let event = match outcome {
            RunOutcome::Completed(output) => JobEvent::Complete {
                node_id: node_id.clone(),
                attempt,
                output,
            },
            RunOutcome::Failed(error) => {
                warn!("作业 {} 执行失败: {}", job.job_id, error);
                JobEvent::Fail {
                    node_id: node_id.clone(),
                    attempt,
                    error,
                }
            }
            RunOutcome::TimedOut(timeout_minutes) => {
                warn!("作业 {} 执行超时 ({} 分钟)", job.job_id, timeout_minutes);
                JobEvent::Fail {
                    node_id: node_id.clone(),
                    attempt,
                    error: ClusterError::ExecutionTimeout { timeout_minutes }.to_string(),
                }
            }
            RunOutcome::Aborted => {
                // 中止方已经完成状态转换并负责归还槽位
                info!("作业 {} 的执行已中止", job.job_id);
                return Ok(());
            }
        };

        let Some(finished) = self.commit_result(&job.job_id, event, &mut cancel_rx).await else {
            return Ok(());
        };
        self.capacity.apply_effects(&finished.effects).await?;
        self.capacity_freed.notify_one();

        let duration = finished.job.duration_seconds.unwrap_or_default();
        self.metrics
            .record_job_finished(&finished.job.job_type, finished.job.status.as_str(), duration);
        if finished.job.status == JobStatus::Completed {
            info!("作业 {} 执行完成，耗时 {:.3}s", job.job_id, duration);
        }
        Ok(())
    }

    /// 提交执行结果
    ///
    /// 存储错误时退避重试，直到提交成功、结果过期或执行被中止。
    /// 返回 `None` 表示结果已被丢弃，槽位由赢得转换的一方归还。
    async fn commit_result(
        &self,
        job_id: &str,
        event: JobEvent,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> Option<JobTransition> {
        let mut delay = COMMIT_RETRY_BASE_DELAY;
        loop {
            match self.jobs.transition(job_id, event.clone()).await {
                Ok(finished) => return Some(finished),
                Err(ClusterError::InvalidTransition(reason)) => {
                    debug!("作业 {} 的执行结果已过期，丢弃: {}", job_id, reason);
                    return None;
                }
                Err(ClusterError::JobNotFound { .. }) => {
                    warn!("作业 {} 已不存在，丢弃执行结果", job_id);
                    return None;
                }
                Err(e) => {
                    error!(
                        "提交作业 {} 的执行结果失败，{}ms 后重试: {}",
                        job_id,
                        delay.as_millis(),
                        e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut *cancel_rx => {
                            info!("作业 {} 在提交结果前被中止", job_id);
                            return None;
                        }
                    }
                    delay = (delay * 2).min(COMMIT_RETRY_MAX_DELAY);
                }
            }
        }
    }

    /// 中止作业的本地执行，返回作业是否正在执行
    ///
    /// 只停止处理器，不修改作业状态和节点容量。
    pub async fn abort(&self, job_id: &str) -> bool {
        let running = {
            let mut running_jobs = self.running_jobs.write().await;
            running_jobs.remove(job_id)
        };
        match running {
            Some(running) => {
                debug!(
                    "中止作业 {} (node_id={}, attempt={})",
                    job_id, running.node_id, running.attempt
                );
                let _ = running.cancel.send(());
                true
            }
            None => false,
        }
    }

    /// 中止节点上的全部执行，返回中止的作业ID
    pub async fn abort_on_node(&self, node_id: &str) -> Vec<String> {
        let aborted: Vec<(String, RunningJob)> = {
            let mut running_jobs = self.running_jobs.write().await;
            let job_ids: Vec<String> = running_jobs
                .iter()
                .filter(|(_, running)| running.node_id == node_id)
                .map(|(job_id, _)| job_id.clone())
                .collect();
            job_ids
                .into_iter()
                .filter_map(|job_id| {
                    let running = running_jobs.remove(&job_id)?;
                    Some((job_id, running))
                })
                .collect()
        };
        aborted
            .into_iter()
            .map(|(job_id, running)| {
                let _ = running.cancel.send(());
                job_id
            })
            .collect()
    }

    pub async fn abort_all(&self) -> usize {
        let drained: Vec<(String, RunningJob)> = {
            let mut running_jobs = self.running_jobs.write().await;
            running_jobs.drain().collect()
        };
        let count = drained.len();
        for (_, running) in drained {
            let _ = running.cancel.send(());
        }
        if count > 0 {
            info!("已中止 {} 个正在执行的作业", count);
        }
        count
    }

    pub async fn running_count(&self) -> usize {
        self.running_jobs.read().await.len()
    }

    pub async fn is_running(&self, job_id: &str) -> bool {
        self.running_jobs.read().await.contains_key(job_id)
    }
}
