use std::cmp::Ordering;
use std::sync::Arc;

use cluster_core::models::{ClusterNode, DistributedJob};
use cluster_core::{ClusterError, ClusterResult};
use tracing::debug;

/// 节点在作业首选列表中时的额外加分
pub const PREFERRED_NODE_BONUS: f64 = 10.0;

/// 作业放置策略
///
/// 输入是已经满足资源和约束的候选节点，输出按优先级从高到低排列。
/// 调度器依次尝试占用槽位，失败时退回下一个候选。
pub trait PlacementStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn rank<'a>(&self, job: &DistributedJob, candidates: &'a [ClusterNode])
        -> Vec<&'a ClusterNode>;
}

/// 加权评分
///
/// `0.30×CPU空闲 + 0.30×内存空闲 + 0.20×槽位空闲 + 0.10×健康分 (+10 首选节点)`
pub fn weighted_score(job: &DistributedJob, node: &ClusterNode) -> f64 {
    let slot_term = if node.max_concurrent_jobs > 0 {
        (node.max_concurrent_jobs - node.current_job_count) as f64
            / node.max_concurrent_jobs as f64
    } else {
        0.0
    };

    let mut score = 0.30 * (100.0 - node.cpu_usage_percent) / 100.0
        + 0.30 * (100.0 - node.memory_usage_percent) / 100.0
        + 0.20 * slot_term
        + 0.10 * node.health_score / 100.0;

    if job.preferred_nodes.iter().any(|id| id == &node.node_id) {
        score += PREFERRED_NODE_BONUS;
    }
    score
}

/// 按加权评分选择节点，同分时保持候选顺序
pub struct WeightedScoreStrategy;

impl PlacementStrategy for WeightedScoreStrategy {
    fn name(&self) -> &str {
        "weighted_score"
    }

    fn rank<'a>(
        &self,
        job: &DistributedJob,
        candidates: &'a [ClusterNode],
    ) -> Vec<&'a ClusterNode> {
        let mut scored: Vec<(f64, &ClusterNode)> = candidates
            .iter()
            .map(|node| (weighted_score(job, node), node))
            .collect();
        // 稳定排序，同分节点保持先出现的在前
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        if let Some((score, best)) = scored.first() {
            debug!(
                "加权评分策略为作业 {} 选择节点: {} (评分: {:.4})",
                job.job_id, best.node_id, score
            );
        }
        scored.into_iter().map(|(_, node)| node).collect()
    }
}

/// 优先选择槽位利用率最低的节点，其次CPU使用率
pub struct LeastLoadedStrategy;

impl PlacementStrategy for LeastLoadedStrategy {
    fn name(&self) -> &str {
        "least_loaded"
    }

    fn rank<'a>(
        &self,
        job: &DistributedJob,
        candidates: &'a [ClusterNode],
    ) -> Vec<&'a ClusterNode> {
        let mut ranked: Vec<&ClusterNode> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            a.slot_utilization()
                .partial_cmp(&b.slot_utilization())
                .unwrap_or(Ordering::Equal)
                .then(
                    a.cpu_usage_percent
                        .partial_cmp(&b.cpu_usage_percent)
                        .unwrap_or(Ordering::Equal),
                )
        });

        if let Some(best) = ranked.first() {
            debug!(
                "最小负载策略为作业 {} 选择节点: {} (槽位利用率: {:.2})",
                job.job_id,
                best.node_id,
                best.slot_utilization()
            );
        }
        ranked
    }
}

/// 根据配置名称创建放置策略
pub fn strategy_from_name(name: &str) -> ClusterResult<Arc<dyn PlacementStrategy>> {
    match name {
        "weighted_score" => Ok(Arc::new(WeightedScoreStrategy)),
        "least_loaded" => Ok(Arc::new(LeastLoadedStrategy)),
        other => Err(ClusterError::Configuration(format!(
            "未知的放置策略: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_core::models::{JobSubmission, NodeRegistration, ResourceRequirements};

    fn node(name: &str, cores: f64, mem: f64, cpu: f64, memory: f64) -> ClusterNode {
        let mut node = ClusterNode::from_registration(
            &NodeRegistration::new(name, name, "c1", cores, mem),
            30_000,
        );
        node.node_id = name.to_string();
        node.cpu_usage_percent = cpu;
        node.memory_usage_percent = memory;
        node.recompute_health_score();
        node
    }

    fn job() -> DistributedJob {
        DistributedJob::from_submission(JobSubmission::new(
            "job",
            "generic",
            "c1",
            ResourceRequirements {
                cpu_cores: 1.0,
                memory_gb: 1.0,
                ..Default::default()
            },
        ))
    }

    #[test]
    fn test_lightly_loaded_node_scores_higher() {
        let node_a = node("node-a", 4.0, 8.0, 10.0, 10.0);
        let node_b = node("node-b", 2.0, 4.0, 50.0, 50.0);
        let job = job();

        let a = weighted_score(&job, &node_a);
        let b = weighted_score(&job, &node_b);
        assert!((a - 0.84).abs() < 1e-9);
        assert!((b - 0.60).abs() < 1e-9);

        let candidates = vec![node_b, node_a];
        let ranked = WeightedScoreStrategy.rank(&job, &candidates);
        assert_eq!(ranked[0].node_id, "node-a");
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let candidates = vec![
            node("first", 4.0, 8.0, 20.0, 20.0),
            node("second", 4.0, 8.0, 20.0, 20.0),
        ];
        let ranked = WeightedScoreStrategy.rank(&job(), &candidates);
        assert_eq!(ranked[0].node_id, "first");
        assert_eq!(ranked[1].node_id, "second");
    }

    #[test]
    fn test_preferred_node_bonus_dominates() {
        let busy = node("busy", 4.0, 8.0, 70.0, 70.0);
        let idle = node("idle", 4.0, 8.0, 0.0, 0.0);
        let mut job = job();
        job.preferred_nodes = vec!["busy".to_string()];

        assert!(weighted_score(&job, &busy) > PREFERRED_NODE_BONUS);
        let candidates = vec![idle, busy];
        assert_eq!(WeightedScoreStrategy.rank(&job, &candidates)[0].node_id, "busy");
    }

    #[test]
    fn test_least_loaded_prefers_free_slots() {
        let mut loaded = node("loaded", 4.0, 8.0, 5.0, 5.0);
        loaded.current_job_count = 5;
        let quiet = node("quiet", 4.0, 8.0, 60.0, 60.0);

        let candidates = vec![loaded, quiet];
        let ranked = LeastLoadedStrategy.rank(&job(), &candidates);
        assert_eq!(ranked[0].node_id, "quiet");
    }

    #[test]
    fn test_strategy_from_name() {
        assert_eq!(strategy_from_name("least_loaded").unwrap().name(), "least_loaded");
        assert!(strategy_from_name("random").is_err());
    }
}
