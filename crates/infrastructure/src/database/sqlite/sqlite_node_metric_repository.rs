use async_trait::async_trait;
use cluster_core::models::NodeMetric;
use cluster_core::{ClusterResult, NodeMetricRepository};
use sqlx::{Row, SqlitePool};

pub struct SqliteNodeMetricRepository {
    pool: SqlitePool,
}

impl SqliteNodeMetricRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_metric(row: &sqlx::sqlite::SqliteRow) -> ClusterResult<NodeMetric> {
        Ok(NodeMetric {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            cpu_usage_percent: row.try_get("cpu_usage_percent")?,
            memory_usage_percent: row.try_get("memory_usage_percent")?,
            storage_usage_percent: row.try_get("storage_usage_percent")?,
            network_io_mbps: row.try_get("network_io_mbps")?,
            active_jobs: row.try_get("active_jobs")?,
            queued_jobs: row.try_get("queued_jobs")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[async_trait]
impl NodeMetricRepository for SqliteNodeMetricRepository {
    async fn append(&self, metric: &NodeMetric) -> ClusterResult<()> {
        sqlx::query(
            r#"
            INSERT INTO node_metrics (
                node_id, cpu_usage_percent, memory_usage_percent, storage_usage_percent,
                network_io_mbps, active_jobs, queued_jobs, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&metric.node_id)
        .bind(metric.cpu_usage_percent)
        .bind(metric.memory_usage_percent)
        .bind(metric.storage_usage_percent)
        .bind(metric.network_io_mbps)
        .bind(metric.active_jobs)
        .bind(metric.queued_jobs)
        .bind(metric.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, node_id: &str, limit: usize) -> ClusterResult<Vec<NodeMetric>> {
        let rows = sqlx::query(
            r#"
            SELECT id, node_id, cpu_usage_percent, memory_usage_percent, storage_usage_percent,
                   network_io_mbps, active_jobs, queued_jobs, recorded_at
            FROM node_metrics
            WHERE node_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_metric).collect()
    }
}
