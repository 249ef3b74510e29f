use async_trait::async_trait;
use cluster_core::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::handler::{JobContext, JobHandler};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    #[default]
    Sum,
    SumOfSquares,
    CountPrimes,
}

fn default_chunk_size() -> i64 {
    10_000
}

/// 单块长度上限，保证两次让出之间的计算量有界
const MAX_CHUNK_SIZE: i64 = 100_000;

/// 批量计算参数，区间为 [start, end)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchParams {
    pub start: i64,
    pub end: i64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,
    #[serde(default)]
    pub operation: BatchOperation,
}

/// 批量计算处理器：把整数区间切块归约，每块之间让出执行权
pub struct BatchComputationHandler;

/// 对 64 位整数确定性成立的 Miller-Rabin 底数
const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

/// 单次判定为 O(log n)，区间靠近 i64::MAX 时也不会阻塞执行器
fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    let n = n as u64;
    for p in MILLER_RABIN_BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in MILLER_RABIN_BASES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

impl BatchComputationHandler {
    fn reduce_chunk(operation: BatchOperation, from: i64, to: i64) -> Option<i64> {
        let mut acc: i64 = 0;
        for n in from..to {
            let value = match operation {
                BatchOperation::Sum => n,
                BatchOperation::SumOfSquares => n.checked_mul(n)?,
                BatchOperation::CountPrimes => i64::from(is_prime(n)),
            };
            acc = acc.checked_add(value)?;
        }
        Some(acc)
    }

    pub async fn compute(params: &BatchParams) -> ClusterResult<Value> {
        if params.end < params.start {
            return Err(ClusterError::JobExecution(format!(
                "区间无效: [{}, {})",
                params.start, params.end
            )));
        }
        if params.chunk_size <= 0 {
            return Err(ClusterError::JobExecution(format!(
                "chunk_size必须大于0: {}",
                params.chunk_size
            )));
        }

        let overflow = || ClusterError::JobExecution("计算结果溢出".to_string());
        let mut result: i64 = 0;
        let mut chunks = 0u64;
        let chunk_size = params.chunk_size.min(MAX_CHUNK_SIZE);
        let mut from = params.start;
        while from < params.end {
            let to = from.saturating_add(chunk_size).min(params.end);
            let partial = Self::reduce_chunk(params.operation, from, to).ok_or_else(overflow)?;
            result = result.checked_add(partial).ok_or_else(overflow)?;
            chunks += 1;
            from = to;
            tokio::task::yield_now().await;
        }

        debug!("批量计算完成，共 {} 块", chunks);
        Ok(json!({
            "operation": params.operation,
            "start": params.start,
            "end": params.end,
            "chunks": chunks,
            "result": result,
        }))
    }
}

#[async_trait]
impl JobHandler for BatchComputationHandler {
    fn job_type(&self) -> &str {
        "batch_computation"
    }

    async fn execute(&self, context: &JobContext) -> ClusterResult<Value> {
        let params: BatchParams = context.params()?;
        Self::compute(&params).await
    }
}
