use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClusterError, ClusterResult};

/// 伸缩方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScalingDirection {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
}

impl ScalingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingDirection::Up => "UP",
            ScalingDirection::Down => "DOWN",
        }
    }
}

impl FromStr for ScalingDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(ScalingDirection::Up),
            "DOWN" => Ok(ScalingDirection::Down),
            _ => Err(format!("Invalid scaling direction: {s}")),
        }
    }
}

impl_sqlite_text_enum!(ScalingDirection);

/// 扩容时新节点的规格
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeTemplate {
    pub name_prefix: String,
    pub node_type: String,
    pub cpu_cores: f64,
    pub memory_gb: f64,
    #[serde(default)]
    pub storage_gb: f64,
    #[serde(default)]
    pub gpu_count: i32,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub max_concurrent_jobs: Option<i32>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
}

impl Default for NodeTemplate {
    fn default() -> Self {
        Self {
            name_prefix: "auto".to_string(),
            node_type: "compute".to_string(),
            cpu_cores: 4.0,
            memory_gb: 8.0,
            storage_gb: 0.0,
            gpu_count: 0,
            labels: BTreeMap::new(),
            max_concurrent_jobs: None,
            region: None,
            availability_zone: None,
        }
    }
}

/// 创建自动伸缩器的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoScalerSpec {
    pub name: String,
    pub cluster_id: String,
    pub min_nodes: i32,
    pub max_nodes: i32,
    pub target_cpu_utilization: f64,
    pub target_memory_utilization: f64,
    /// 秒
    pub scale_up_cooldown: i64,
    /// 秒
    pub scale_down_cooldown: i64,
    pub scale_up_step_size: i32,
    pub scale_down_step_size: i32,
    pub node_template: NodeTemplate,
    pub enabled: bool,
}

impl AutoScalerSpec {
    pub fn new(cluster_id: impl Into<String>, min_nodes: i32, max_nodes: i32) -> Self {
        Self {
            name: "default".to_string(),
            cluster_id: cluster_id.into(),
            min_nodes,
            max_nodes,
            target_cpu_utilization: 70.0,
            target_memory_utilization: 80.0,
            scale_up_cooldown: 300,
            scale_down_cooldown: 600,
            scale_up_step_size: 1,
            scale_down_step_size: 1,
            node_template: NodeTemplate::default(),
            enabled: true,
        }
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.cluster_id.trim().is_empty() {
            return Err(ClusterError::Validation("clusterID不能为空".to_string()));
        }
        if self.min_nodes < 0 {
            return Err(ClusterError::Validation(format!(
                "minNodes不能为负数: {}",
                self.min_nodes
            )));
        }
        if self.min_nodes > self.max_nodes {
            return Err(ClusterError::Validation(format!(
                "minNodes ({}) 不能大于 maxNodes ({})",
                self.min_nodes, self.max_nodes
            )));
        }
        for (name, target) in [
            ("targetCPUUtilization", self.target_cpu_utilization),
            ("targetMemoryUtilization", self.target_memory_utilization),
        ] {
            if !(target > 0.0 && target <= 100.0) {
                return Err(ClusterError::Validation(format!(
                    "{name} 必须在 (0, 100] 范围内: {target}"
                )));
            }
        }
        if self.scale_up_step_size <= 0 || self.scale_down_step_size <= 0 {
            return Err(ClusterError::Validation("伸缩步长必须大于0".to_string()));
        }
        if self.scale_up_cooldown < 0 || self.scale_down_cooldown < 0 {
            return Err(ClusterError::Validation("冷却时间不能为负数".to_string()));
        }
        if self.node_template.cpu_cores <= 0.0 || self.node_template.memory_gb <= 0.0 {
            return Err(ClusterError::Validation(
                "节点模板的CPU和内存必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 绑定到单个集群的伸缩策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoScaler {
    pub id: i64,
    pub scaler_id: String,
    pub name: String,
    pub cluster_id: String,
    pub min_nodes: i32,
    pub max_nodes: i32,
    pub target_cpu_utilization: f64,
    pub target_memory_utilization: f64,
    pub scale_up_cooldown: i64,
    pub scale_down_cooldown: i64,
    pub scale_up_step_size: i32,
    pub scale_down_step_size: i32,
    pub node_template: NodeTemplate,
    pub enabled: bool,
    pub last_scaling_action: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutoScaler {
    pub fn from_spec(spec: AutoScalerSpec) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            scaler_id: format!("scaler-{}", uuid::Uuid::new_v4()),
            name: spec.name,
            cluster_id: spec.cluster_id,
            min_nodes: spec.min_nodes,
            max_nodes: spec.max_nodes,
            target_cpu_utilization: spec.target_cpu_utilization,
            target_memory_utilization: spec.target_memory_utilization,
            scale_up_cooldown: spec.scale_up_cooldown,
            scale_down_cooldown: spec.scale_down_cooldown,
            scale_up_step_size: spec.scale_up_step_size,
            scale_down_step_size: spec.scale_down_step_size,
            node_template: spec.node_template,
            enabled: spec.enabled,
            last_scaling_action: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cooldown(&self, direction: ScalingDirection) -> chrono::Duration {
        let seconds = match direction {
            ScalingDirection::Up => self.scale_up_cooldown,
            ScalingDirection::Down => self.scale_down_cooldown,
        };
        chrono::Duration::seconds(seconds)
    }

    /// 距上次伸缩不足冷却时间时返回true
    pub fn in_cooldown(&self, direction: ScalingDirection, now: DateTime<Utc>) -> bool {
        match self.last_scaling_action {
            Some(last) => now - last < self.cooldown(direction),
            None => false,
        }
    }

    pub fn step_size(&self, direction: ScalingDirection) -> i32 {
        match direction {
            ScalingDirection::Up => self.scale_up_step_size,
            ScalingDirection::Down => self.scale_down_step_size,
        }
    }

    /// 目标节点数 = 当前 ± 步长，限定在 [minNodes, maxNodes]
    pub fn target_node_count(&self, direction: ScalingDirection, current: i32) -> i32 {
        let target = match direction {
            ScalingDirection::Up => current + self.scale_up_step_size,
            ScalingDirection::Down => current - self.scale_down_step_size,
        };
        target.clamp(self.min_nodes, self.max_nodes)
    }
}
