use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClusterError, ClusterResult};

/// 节点默认最大并发作业数
pub const DEFAULT_MAX_CONCURRENT_JOBS: i32 = 10;

/// 节点状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "INACTIVE")]
    Inactive,
    #[serde(rename = "DRAINING")]
    Draining,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "MAINTENANCE")]
    Maintenance,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "ACTIVE",
            NodeStatus::Inactive => "INACTIVE",
            NodeStatus::Draining => "DRAINING",
            NodeStatus::Failed => "FAILED",
            NodeStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(NodeStatus::Active),
            "INACTIVE" => Ok(NodeStatus::Inactive),
            "DRAINING" => Ok(NodeStatus::Draining),
            "FAILED" => Ok(NodeStatus::Failed),
            "MAINTENANCE" => Ok(NodeStatus::Maintenance),
            _ => Err(format!("Invalid node status: {s}")),
        }
    }
}

impl_sqlite_text_enum!(NodeStatus);

/// 集群计算节点
///
/// `current_job_count` 必须始终等于分配到该节点且处于 SCHEDULED 或 RUNNING
/// 状态的作业数。所有对容量计数器的修改都通过带 `version` 校验的
/// compare-and-swap 完成，见 [`crate::services::CapacityLedger`]。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterNode {
    pub id: i64,
    pub node_id: String,
    pub cluster_id: String,
    pub name: String,
    pub node_type: String,
    pub hostname: String,
    pub ip_address: String,
    pub port: i32,
    pub region: Option<String>,
    pub availability_zone: Option<String>,

    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub gpu_count: i32,

    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub storage_usage_percent: f64,
    pub network_io_mbps: f64,

    pub status: NodeStatus,
    pub health_score: f64,
    pub current_job_count: i32,
    pub max_concurrent_jobs: i32,
    pub job_queue_size: i32,
    pub labels: BTreeMap<String, String>,

    /// 心跳间隔（毫秒）
    pub heartbeat_interval_ms: i64,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// 乐观并发版本号，每次写入递增
    pub version: i64,
}

/// 节点注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub name: String,
    pub node_type: String,
    pub hostname: String,
    pub ip_address: String,
    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub cluster_id: String,
    pub port: i32,
    pub storage_gb: Option<f64>,
    pub gpu_count: Option<i32>,
    pub labels: Option<BTreeMap<String, String>>,
    pub max_concurrent_jobs: Option<i32>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
    pub heartbeat_interval_ms: Option<i64>,
}

impl NodeRegistration {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        cluster_id: impl Into<String>,
        cpu_cores: f64,
        memory_gb: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: "compute".to_string(),
            hostname: hostname.into(),
            ip_address: "127.0.0.1".to_string(),
            cpu_cores,
            memory_gb,
            cluster_id: cluster_id.into(),
            port: 8080,
            storage_gb: None,
            gpu_count: None,
            labels: None,
            max_concurrent_jobs: None,
            region: None,
            availability_zone: None,
            heartbeat_interval_ms: None,
        }
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.name.trim().is_empty() || self.hostname.trim().is_empty() {
            return Err(ClusterError::Validation("节点名称和主机名不能为空".to_string()));
        }
        if self.cluster_id.trim().is_empty() {
            return Err(ClusterError::Validation("clusterID不能为空".to_string()));
        }
        if !(self.cpu_cores > 0.0 && self.cpu_cores.is_finite())
            || !(self.memory_gb > 0.0 && self.memory_gb.is_finite())
        {
            return Err(ClusterError::Validation(format!(
                "节点资源必须大于0: cpu={}, memory={}",
                self.cpu_cores, self.memory_gb
            )));
        }
        if self.storage_gb.is_some_and(|s| s < 0.0) || self.gpu_count.is_some_and(|g| g < 0) {
            return Err(ClusterError::Validation("存储和GPU数量不能为负数".to_string()));
        }
        if self.max_concurrent_jobs.is_some_and(|m| m <= 0) {
            return Err(ClusterError::Validation("最大并发作业数必须大于0".to_string()));
        }
        if self.heartbeat_interval_ms.is_some_and(|i| i <= 0) {
            return Err(ClusterError::Validation("心跳间隔必须大于0".to_string()));
        }
        if !(0..=65535).contains(&self.port) {
            return Err(ClusterError::Validation(format!("无效的端口: {}", self.port)));
        }
        Ok(())
    }
}

impl NodeMetricsUpdate {
    /// 使用率必须在 0-100 之间
    pub fn validate(&self) -> ClusterResult<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.cpu_usage)
            || !in_range(self.memory_usage)
            || self.storage_usage.is_some_and(|v| !in_range(v))
        {
            return Err(ClusterError::Validation(format!(
                "使用率必须在0-100之间: cpu={}, memory={}, storage={:?}",
                self.cpu_usage, self.memory_usage, self.storage_usage
            )));
        }
        if self.network_io.is_some_and(|v| v < 0.0 || !v.is_finite()) {
            return Err(ClusterError::Validation("网络IO不能为负数".to_string()));
        }
        Ok(())
    }
}

/// 节点指标上报
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct NodeMetricsUpdate {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub storage_usage: Option<f64>,
    pub network_io: Option<f64>,
}

/// 根据CPU、内存和作业槽位利用率计算健康分
///
/// 从100开始扣分：CPU和内存超过90%各扣20，超过80%各扣10；
/// 槽位利用率超过0.9扣15，超过0.8扣10；最低为0。
pub fn compute_health_score(cpu_usage: f64, memory_usage: f64, slot_utilization: f64) -> f64 {
    let mut score = 100.0;

    if cpu_usage > 90.0 {
        score -= 20.0;
    } else if cpu_usage > 80.0 {
        score -= 10.0;
    }

    if memory_usage > 90.0 {
        score -= 20.0;
    } else if memory_usage > 80.0 {
        score -= 10.0;
    }

    if slot_utilization > 0.9 {
        score -= 15.0;
    } else if slot_utilization > 0.8 {
        score -= 10.0;
    }

    f64::max(score, 0.0)
}

impl ClusterNode {
    /// 根据注册请求创建新节点
    pub fn from_registration(
        registration: &NodeRegistration,
        default_heartbeat_interval_ms: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由存储层生成
            node_id: format!("node-{}", uuid::Uuid::new_v4()),
            cluster_id: registration.cluster_id.clone(),
            name: registration.name.clone(),
            node_type: registration.node_type.clone(),
            hostname: registration.hostname.clone(),
            ip_address: registration.ip_address.clone(),
            port: registration.port,
            region: registration.region.clone(),
            availability_zone: registration.availability_zone.clone(),
            cpu_cores: registration.cpu_cores,
            memory_gb: registration.memory_gb,
            storage_gb: registration.storage_gb.unwrap_or(0.0),
            gpu_count: registration.gpu_count.unwrap_or(0),
            cpu_usage_percent: 0.0,
            memory_usage_percent: 0.0,
            storage_usage_percent: 0.0,
            network_io_mbps: 0.0,
            status: NodeStatus::Active,
            health_score: 100.0,
            current_job_count: 0,
            max_concurrent_jobs: registration
                .max_concurrent_jobs
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
            job_queue_size: 0,
            labels: registration.labels.clone().unwrap_or_default(),
            heartbeat_interval_ms: registration
                .heartbeat_interval_ms
                .unwrap_or(default_heartbeat_interval_ms),
            last_heartbeat: now,
            registered_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// 用重新注册的请求刷新节点，状态重置为ACTIVE
    pub fn refresh_from_registration(&mut self, registration: &NodeRegistration) {
        let now = Utc::now();
        self.name = registration.name.clone();
        self.node_type = registration.node_type.clone();
        self.ip_address = registration.ip_address.clone();
        self.port = registration.port;
        self.cpu_cores = registration.cpu_cores;
        self.memory_gb = registration.memory_gb;
        if let Some(storage) = registration.storage_gb {
            self.storage_gb = storage;
        }
        if let Some(gpus) = registration.gpu_count {
            self.gpu_count = gpus;
        }
        if let Some(labels) = &registration.labels {
            self.labels = labels.clone();
        }
        if let Some(max_jobs) = registration.max_concurrent_jobs {
            self.max_concurrent_jobs = max_jobs;
        }
        if let Some(interval) = registration.heartbeat_interval_ms {
            self.heartbeat_interval_ms = interval;
        }
        if registration.region.is_some() {
            self.region = registration.region.clone();
        }
        if registration.availability_zone.is_some() {
            self.availability_zone = registration.availability_zone.clone();
        }
        self.status = NodeStatus::Active;
        self.last_heartbeat = now;
        self.updated_at = now;
        self.recompute_health_score();
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, NodeStatus::Active)
    }

    /// 可用CPU核数（按当前CPU使用率折算）
    pub fn free_cpu_cores(&self) -> f64 {
        self.cpu_cores * (100.0 - self.cpu_usage_percent).max(0.0) / 100.0
    }

    /// 可用内存（GB）
    pub fn free_memory_gb(&self) -> f64 {
        self.memory_gb * (100.0 - self.memory_usage_percent).max(0.0) / 100.0
    }

    /// 可用存储（GB）
    pub fn free_storage_gb(&self) -> f64 {
        self.storage_gb * (100.0 - self.storage_usage_percent).max(0.0) / 100.0
    }

    pub fn has_free_slot(&self) -> bool {
        self.current_job_count < self.max_concurrent_jobs
    }

    /// 作业槽位利用率 (0.0 - 1.0+)
    pub fn slot_utilization(&self) -> f64 {
        if self.max_concurrent_jobs <= 0 {
            1.0
        } else {
            self.current_job_count as f64 / self.max_concurrent_jobs as f64
        }
    }

    /// FAILED节点的健康分固定为0，重新注册后才会恢复
    pub fn recompute_health_score(&mut self) {
        if self.status == NodeStatus::Failed {
            self.health_score = 0.0;
            return;
        }
        self.health_score = compute_health_score(
            self.cpu_usage_percent,
            self.memory_usage_percent,
            self.slot_utilization(),
        );
    }

    /// 写入实时负载并重新计算健康分
    pub fn apply_metrics(&mut self, update: &NodeMetricsUpdate, at: DateTime<Utc>) {
        self.cpu_usage_percent = update.cpu_usage;
        self.memory_usage_percent = update.memory_usage;
        if let Some(storage) = update.storage_usage {
            self.storage_usage_percent = storage;
        }
        if let Some(network) = update.network_io {
            self.network_io_mbps = network;
        }
        self.last_heartbeat = at;
        self.updated_at = at;
        self.recompute_health_score();
    }

    /// 失效判定窗口：心跳间隔 × 倍数
    pub fn heartbeat_timeout(&self, multiplier: u32) -> Duration {
        Duration::milliseconds(self.heartbeat_interval_ms.saturating_mul(multiplier as i64))
    }

    /// 检查心跳是否超时
    pub fn is_heartbeat_expired(&self, now: DateTime<Utc>, multiplier: u32) -> bool {
        now - self.last_heartbeat > self.heartbeat_timeout(multiplier)
    }
}
