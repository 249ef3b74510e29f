//! # 数据模型
//!
//! 定义集群调度子系统的核心数据结构：计算节点、分布式作业、自动伸缩策略、
//! 伸缩事件以及节点指标采样。
//!
//! ## 核心模型
//!
//! - [`ClusterNode`] - 注册到集群的计算单元，包含资源容量、实时负载和健康分
//! - [`DistributedJob`] - 带资源需求、优先级和重试预算的作业
//! - [`AutoScaler`] - 绑定到单个集群的伸缩策略
//! - [`ScalingEvent`] - 一次伸缩决策的审计记录
//! - [`NodeMetric`] - 只追加的节点指标时间序列
//!
//! ## 状态流转
//!
//! ### 作业
//! ```text
//! PENDING → SCHEDULED → RUNNING → COMPLETED
//!    ↑          │          │   ↘ FAILED
//!    └──────────┴──────────┘   ↘ CANCELLED
//!   (节点失效重试次数+1，重启遗留不计)
//! ```
//!
//! ### 节点
//! ```text
//! ACTIVE → DRAINING → INACTIVE
//!   ↓
//! FAILED (必须重新注册才能回到 ACTIVE)
//! ```
//!
//! ## 数据库映射
//!
//! 每个模型都有自增的 `id` 和稳定的外部标识（`node_id`、`job_id`、`scaler_id`、
//! `event_id`）。节点和作业额外携带 `version` 字段，用于乐观并发控制。

/// 为以大写字符串存储的状态枚举实现SQLite编解码
macro_rules! impl_sqlite_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $ty {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                s.parse::<$ty>().map_err(Into::into)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod autoscaler;
pub mod cluster_status;
pub mod job;
pub mod node;
pub mod node_metric;
pub mod scaling_event;

pub use autoscaler::*;
pub use cluster_status::*;
pub use job::*;
pub use node::*;
pub use node_metric::*;
pub use scaling_event::*;
