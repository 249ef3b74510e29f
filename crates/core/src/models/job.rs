use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::ClusterNode;
use crate::{ClusterError, ClusterResult};

/// 节点失效导致重试耗尽时写入的错误信息
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "exceeded max retries due to node failures";

/// 作业状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "RETRYING")]
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Retrying => "RETRYING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// 是否占用节点的作业槽位
    pub fn holds_node_slot(&self) -> bool {
        matches!(self, JobStatus::Scheduled | JobStatus::Running)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "SCHEDULED" => Ok(JobStatus::Scheduled),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            "RETRYING" => Ok(JobStatus::Retrying),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl_sqlite_text_enum!(JobStatus);

/// 作业优先级，排序时 Critical 最高
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobPriority {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "LOW",
            JobPriority::Normal => "NORMAL",
            JobPriority::High => "HIGH",
            JobPriority::Critical => "CRITICAL",
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(JobPriority::Low),
            "NORMAL" => Ok(JobPriority::Normal),
            "HIGH" => Ok(JobPriority::High),
            "CRITICAL" => Ok(JobPriority::Critical),
            _ => Err(format!("Invalid job priority: {s}")),
        }
    }
}

impl_sqlite_text_enum!(JobPriority);

/// 作业资源需求
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceRequirements {
    pub cpu_cores: f64,
    pub memory_gb: f64,
    /// 0 表示不要求存储
    pub storage_gb: f64,
    pub gpu_required: bool,
}

/// 作业放置约束，所有条件都必须满足
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SchedulingConstraints {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub node_type: Option<String>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
}

impl SchedulingConstraints {
    pub fn is_satisfied_by(&self, node: &ClusterNode) -> bool {
        let labels_match = self
            .labels
            .iter()
            .all(|(key, value)| node.labels.get(key) == Some(value));

        let type_match = self
            .node_type
            .as_ref()
            .is_none_or(|node_type| &node.node_type == node_type);
        let region_match = self
            .region
            .as_ref()
            .is_none_or(|region| node.region.as_ref() == Some(region));
        let zone_match = self
            .availability_zone
            .as_ref()
            .is_none_or(|zone| node.availability_zone.as_ref() == Some(zone));

        labels_match && type_match && region_match && zone_match
    }
}

/// 分布式作业
///
/// `assigned_node_id` 当且仅当状态为 SCHEDULED 或 RUNNING 时非空。
/// 状态变化只能通过 [`DistributedJob::apply`] 计算，见 [`JobEvent`]。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributedJob {
    pub id: i64,
    pub job_id: String,
    pub cluster_id: String,
    pub name: String,
    pub job_type: String,
    pub job_config: serde_json::Value,
    pub requirements: ResourceRequirements,
    pub priority: JobPriority,
    pub constraints: SchedulingConstraints,
    pub preferred_nodes: Vec<String>,
    pub status: JobStatus,
    pub assigned_node_id: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_minutes: i32,
    pub submitted_by: Option<String>,
    pub org_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub output_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub version: i64,
}

/// 作业提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub name: String,
    pub job_type: String,
    pub cluster_id: String,
    pub job_config: serde_json::Value,
    pub requirements: ResourceRequirements,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub constraints: SchedulingConstraints,
    #[serde(default)]
    pub preferred_nodes: Vec<String>,
    pub max_retries: i32,
    pub timeout_minutes: i32,
    pub submitted_by: Option<String>,
    pub org_id: Option<String>,
}

impl JobSubmission {
    pub fn new(
        name: impl Into<String>,
        job_type: impl Into<String>,
        cluster_id: impl Into<String>,
        requirements: ResourceRequirements,
    ) -> Self {
        Self {
            name: name.into(),
            job_type: job_type.into(),
            cluster_id: cluster_id.into(),
            job_config: serde_json::json!({}),
            requirements,
            priority: JobPriority::Normal,
            constraints: SchedulingConstraints::default(),
            preferred_nodes: Vec::new(),
            max_retries: 3,
            timeout_minutes: 60,
            submitted_by: None,
            org_id: None,
        }
    }

    /// 校验提交参数，不合法的作业不会被持久化
    pub fn validate(&self) -> ClusterResult<()> {
        if self.job_type.trim().is_empty() {
            return Err(ClusterError::Validation("jobType不能为空".to_string()));
        }
        if self.cluster_id.trim().is_empty() {
            return Err(ClusterError::Validation("clusterID不能为空".to_string()));
        }
        if !self.job_config.is_object() {
            return Err(ClusterError::Validation(
                "jobConfig必须是JSON对象".to_string(),
            ));
        }
        let req = &self.requirements;
        if req.cpu_cores < 0.0 || req.memory_gb < 0.0 || req.storage_gb < 0.0 {
            return Err(ClusterError::Validation("资源需求不能为负数".to_string()));
        }
        if !req.cpu_cores.is_finite() || !req.memory_gb.is_finite() || !req.storage_gb.is_finite()
        {
            return Err(ClusterError::Validation("资源需求必须是有限数值".to_string()));
        }
        if self.timeout_minutes <= 0 {
            return Err(ClusterError::Validation(format!(
                "timeoutMinutes必须大于0: {}",
                self.timeout_minutes
            )));
        }
        if self.max_retries < 0 {
            return Err(ClusterError::Validation(format!(
                "maxRetries不能为负数: {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}

/// 驱动作业状态机的事件
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// 调度器为作业选定节点 (PENDING → SCHEDULED)
    Assign { node_id: String },
    /// 执行器开始执行 (SCHEDULED → RUNNING)
    Start { node_id: String, attempt: i32 },
    /// 处理器成功返回 (RUNNING → COMPLETED)
    Complete {
        node_id: String,
        attempt: i32,
        output: serde_json::Value,
    },
    /// 处理器失败或超时 (RUNNING → FAILED)
    Fail {
        node_id: String,
        attempt: i32,
        error: String,
    },
    /// 调用方取消 (PENDING/SCHEDULED/RUNNING → CANCELLED)
    Cancel,
    /// 所在节点失效 (SCHEDULED/RUNNING → PENDING 或 FAILED)
    NodeLost { node_id: String },
    /// 进程重启后作业失去执行者 (SCHEDULED/RUNNING → PENDING)，不消耗重试次数
    Orphaned { node_id: String },
}

/// 状态转换附带的副作用，由调用方在提交成功后执行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEffect {
    /// 归还节点上的一个作业槽位 (currentJobCount - 1)
    ReleaseSlot { node_id: String },
    /// 作业离开节点等待队列 (jobQueueSize - 1)
    DequeueFromNode { node_id: String },
    /// 作业重新进入调度
    Reschedule,
}

/// 一次状态转换的结果
#[derive(Debug, Clone)]
pub struct JobTransition {
    pub job: DistributedJob,
    pub effects: Vec<JobEffect>,
}

impl DistributedJob {
    /// 根据提交请求创建PENDING作业
    pub fn from_submission(submission: JobSubmission) -> Self {
        Self {
            id: 0, // 将由存储层生成
            job_id: format!("job-{}", uuid::Uuid::new_v4()),
            cluster_id: submission.cluster_id,
            name: submission.name,
            job_type: submission.job_type,
            job_config: submission.job_config,
            requirements: submission.requirements,
            priority: submission.priority,
            constraints: submission.constraints,
            preferred_nodes: submission.preferred_nodes,
            status: JobStatus::Pending,
            assigned_node_id: None,
            retry_count: 0,
            max_retries: submission.max_retries,
            timeout_minutes: submission.timeout_minutes,
            submitted_by: submission.submitted_by,
            org_id: submission.org_id,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            last_retry_at: None,
            duration_seconds: None,
            output_data: None,
            error_message: None,
            version: 0,
        }
    }

    /// 当前执行轮次，每次因节点失效重新调度后递增
    pub fn attempt(&self) -> i32 {
        self.retry_count
    }

    pub fn is_assigned_to(&self, node_id: &str) -> bool {
        self.assigned_node_id.as_deref() == Some(node_id)
    }

    /// 节点是否满足作业的资源需求、槽位和放置约束
    pub fn fits_on(&self, node: &ClusterNode) -> bool {
        let req = &self.requirements;
        node.is_active()
            && node.cluster_id == self.cluster_id
            && node.has_free_slot()
            && node.free_cpu_cores() >= req.cpu_cores
            && node.free_memory_gb() >= req.memory_gb
            && (!req.gpu_required || node.gpu_count > 0)
            && (req.storage_gb <= 0.0 || node.free_storage_gb() >= req.storage_gb)
            && self.constraints.is_satisfied_by(node)
    }

    fn reject(&self, event: &JobEvent) -> ClusterError {
        ClusterError::InvalidTransition(format!(
            "作业 {} 处于 {} 状态，无法处理事件 {:?}",
            self.job_id, self.status, event
        ))
    }

    /// 纯函数状态转换：返回新状态和需要执行的副作用，不修改自身
    pub fn apply(&self, event: JobEvent, now: DateTime<Utc>) -> ClusterResult<JobTransition> {
        let mut job = self.clone();
        let mut effects = Vec::new();

        match (&event, self.status) {
            (JobEvent::Assign { node_id }, JobStatus::Pending) => {
                job.status = JobStatus::Scheduled;
                job.assigned_node_id = Some(node_id.clone());
                job.scheduled_at = Some(now);
                job.error_message = None;
            }
            (JobEvent::Start { node_id, attempt }, JobStatus::Scheduled)
                if self.is_assigned_to(node_id) && *attempt == self.attempt() =>
            {
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                effects.push(JobEffect::DequeueFromNode {
                    node_id: node_id.clone(),
                });
            }
            (
                JobEvent::Complete {
                    node_id,
                    attempt,
                    output,
                },
                JobStatus::Running,
            ) if self.is_assigned_to(node_id) && *attempt == self.attempt() => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);
                job.duration_seconds = self
                    .started_at
                    .map(|started| (now - started).num_milliseconds() as f64 / 1000.0);
                job.output_data = Some(output.clone());
                job.assigned_node_id = None;
                effects.push(JobEffect::ReleaseSlot {
                    node_id: node_id.clone(),
                });
            }
            (
                JobEvent::Fail {
                    node_id,
                    attempt,
                    error,
                },
                JobStatus::Running,
            ) if self.is_assigned_to(node_id) && *attempt == self.attempt() => {
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                job.duration_seconds = self
                    .started_at
                    .map(|started| (now - started).num_milliseconds() as f64 / 1000.0);
                job.error_message = Some(error.clone());
                job.assigned_node_id = None;
                effects.push(JobEffect::ReleaseSlot {
                    node_id: node_id.clone(),
                });
            }
            (JobEvent::Cancel, JobStatus::Pending | JobStatus::Retrying) => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
            }
            (JobEvent::Cancel, JobStatus::Scheduled | JobStatus::Running) => {
                let node_id = self
                    .assigned_node_id
                    .clone()
                    .ok_or_else(|| self.reject(&event))?;
                if self.status == JobStatus::Scheduled {
                    effects.push(JobEffect::DequeueFromNode {
                        node_id: node_id.clone(),
                    });
                }
                effects.push(JobEffect::ReleaseSlot { node_id });
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                job.assigned_node_id = None;
            }
            (
                JobEvent::NodeLost { node_id } | JobEvent::Orphaned { node_id },
                JobStatus::Scheduled | JobStatus::Running,
            ) if self.is_assigned_to(node_id) => {
                if self.status == JobStatus::Scheduled {
                    effects.push(JobEffect::DequeueFromNode {
                        node_id: node_id.clone(),
                    });
                }
                effects.push(JobEffect::ReleaseSlot {
                    node_id: node_id.clone(),
                });

                job.assigned_node_id = None;
                job.started_at = None;
                job.scheduled_at = None;

                if matches!(event, JobEvent::Orphaned { .. }) {
                    job.status = JobStatus::Pending;
                    effects.push(JobEffect::Reschedule);
                    return Ok(JobTransition { job, effects });
                }

                job.retry_count += 1;
                job.last_retry_at = Some(now);
                if job.retry_count <= job.max_retries {
                    job.status = JobStatus::Pending;
                    effects.push(JobEffect::Reschedule);
                } else {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(now);
                    job.error_message = Some(RETRIES_EXHAUSTED_MESSAGE.to_string());
                }
            }
            _ => return Err(self.reject(&event)),
        }

        Ok(JobTransition { job, effects })
    }
}
