//! 乐观并发账本
//!
//! 节点容量计数和作业状态都会被多个并发任务修改。这里的账本把
//! "读取 → 计算 → 按版本条件写入 → 冲突时重试" 的循环集中在一处。

pub mod capacity_ledger;
pub mod job_ledger;

pub use capacity_ledger::*;
pub use job_ledger::*;

/// 默认的乐观并发最大尝试次数
pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 16;
