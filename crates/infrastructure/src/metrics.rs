use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

/// Metrics collector for the cluster scheduling subsystem
///
/// 未安装记录器时所有操作都是空操作，测试中可以直接使用。
#[derive(Clone)]
pub struct MetricsCollector {
    // Job lifecycle metrics
    jobs_submitted_total: Counter,
    jobs_scheduled_total: Counter,
    jobs_rescheduled_total: Counter,
    jobs_cancelled_total: Counter,
    job_duration: Histogram,
    scheduling_conflicts_total: Counter,

    // Node metrics
    node_failures_total: Counter,
    active_nodes: Gauge,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_submitted_total: counter!("cluster_jobs_submitted_total"),
            jobs_scheduled_total: counter!("cluster_jobs_scheduled_total"),
            jobs_rescheduled_total: counter!("cluster_jobs_rescheduled_total"),
            jobs_cancelled_total: counter!("cluster_jobs_cancelled_total"),
            job_duration: histogram!("cluster_job_duration_seconds"),
            scheduling_conflicts_total: counter!("cluster_scheduling_conflicts_total"),
            node_failures_total: counter!("cluster_node_failures_total"),
            active_nodes: gauge!("cluster_active_nodes"),
        }
    }

    pub fn record_job_submitted(&self, job_type: &str) {
        self.jobs_submitted_total.increment(1);
        debug!(job_type = job_type, "Job submitted");
    }

    pub fn record_job_scheduled(&self, scheduling_seconds: f64) {
        self.jobs_scheduled_total.increment(1);
        histogram!("cluster_scheduling_duration_seconds").record(scheduling_seconds);
    }

    /// Record a terminal job outcome (completed / failed)
    pub fn record_job_finished(&self, job_type: &str, status: &str, duration_seconds: f64) {
        counter!(
            "cluster_jobs_finished_total",
            "job_type" => job_type.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        self.job_duration.record(duration_seconds);
    }

    pub fn record_job_rescheduled(&self) {
        self.jobs_rescheduled_total.increment(1);
    }

    pub fn record_job_cancelled(&self) {
        self.jobs_cancelled_total.increment(1);
    }

    pub fn record_scheduling_conflict(&self) {
        self.scheduling_conflicts_total.increment(1);
    }

    pub fn record_node_failure(&self, cluster_id: &str) {
        self.node_failures_total.increment(1);
        debug!(cluster_id = cluster_id, "Node failure recorded");
    }

    pub fn update_active_nodes(&self, count: usize) {
        self.active_nodes.set(count as f64);
    }

    pub fn record_scaling_event(&self, direction: &str, success: bool) {
        counter!(
            "cluster_scaling_events_total",
            "direction" => direction.to_string(),
            "success" => success.to_string()
        )
        .increment(1);
    }
}
