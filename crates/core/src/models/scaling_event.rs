use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::autoscaler::ScalingDirection;

/// 一次伸缩决策的审计记录，完成时更新一次，此后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingEvent {
    pub id: i64,
    pub event_id: String,
    pub scaler_id: String,
    pub cluster_id: String,
    pub direction: ScalingDirection,
    pub trigger_metric: String,
    pub trigger_value: f64,
    pub threshold: f64,
    pub current_node_count: i32,
    pub target_node_count: i32,
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 伸缩动作的执行结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingOutcome {
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ScalingEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        scaler_id: impl Into<String>,
        cluster_id: impl Into<String>,
        direction: ScalingDirection,
        trigger_metric: impl Into<String>,
        trigger_value: f64,
        threshold: f64,
        current_node_count: i32,
        target_node_count: i32,
    ) -> Self {
        Self {
            id: 0,
            event_id: format!("scale-{}", uuid::Uuid::new_v4()),
            scaler_id: scaler_id.into(),
            cluster_id: cluster_id.into(),
            direction,
            trigger_metric: trigger_metric.into(),
            trigger_value,
            threshold,
            current_node_count,
            target_node_count,
            nodes_added: Vec::new(),
            nodes_removed: Vec::new(),
            success: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}
