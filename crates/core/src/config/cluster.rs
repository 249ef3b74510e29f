use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_MAX_CONCURRENT_JOBS;
use crate::services::DEFAULT_MAX_CAS_ATTEMPTS;

pub const PLACEMENT_STRATEGIES: [&str; 2] = ["weighted_score", "least_loaded"];

/// 节点注册表配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 节点未指定时使用的心跳间隔
    pub heartbeat_interval_ms: u64,
    /// 超过 间隔 × 倍数 未收到心跳即判定失效
    pub failure_multiplier: u32,
    pub default_max_concurrent_jobs: i32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            failure_multiplier: 3,
            default_max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        if self.failure_multiplier == 0 {
            return Err(anyhow::anyhow!("失效判定倍数必须大于0"));
        }
        if self.default_max_concurrent_jobs <= 0 {
            return Err(anyhow::anyhow!("节点默认最大并发作业数必须大于0"));
        }
        Ok(())
    }
}

/// 作业调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub placement_strategy: String,
    /// PENDING作业的周期性重新调度间隔
    pub sweep_interval_ms: u64,
    /// 乐观并发写入的最大尝试次数
    pub max_cas_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            placement_strategy: "weighted_score".to_string(),
            sweep_interval_ms: 5_000,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !PLACEMENT_STRATEGIES.contains(&self.placement_strategy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的放置策略: {}，支持的策略: {:?}",
                self.placement_strategy,
                PLACEMENT_STRATEGIES
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(anyhow::anyhow!("重新调度间隔必须大于0"));
        }
        if self.max_cas_attempts == 0 {
            return Err(anyhow::anyhow!("最大重试次数必须大于0"));
        }
        Ok(())
    }
}

/// 作业执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 作业允许设置的最大超时时间
    pub max_timeout_minutes: i32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_timeout_minutes: 24 * 60,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_timeout_minutes <= 0 {
            return Err(anyhow::anyhow!("最大超时时间必须大于0"));
        }
        Ok(())
    }
}

/// 自动伸缩配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoScalerConfig {
    pub enabled: bool,
    pub evaluation_interval_seconds: u64,
    /// 平均负载低于 目标 × 该比例 时缩容
    pub scale_down_ratio: f64,
}

impl Default for AutoScalerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluation_interval_seconds: 60,
            scale_down_ratio: 0.5,
        }
    }
}

impl AutoScalerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.evaluation_interval_seconds == 0 {
            return Err(anyhow::anyhow!("伸缩评估间隔必须大于0"));
        }
        if !(self.scale_down_ratio > 0.0 && self.scale_down_ratio < 1.0) {
            return Err(anyhow::anyhow!(
                "缩容比例必须在 (0, 1) 范围内: {}",
                self.scale_down_ratio
            ));
        }
        Ok(())
    }
}
