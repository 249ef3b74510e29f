use async_trait::async_trait;
use cluster_core::models::{ClusterNode, NodeStatus};
use cluster_core::{ClusterError, ClusterResult, NodeRepository};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

const NODE_COLUMNS: &str = "id, node_id, cluster_id, name, node_type, hostname, ip_address, port, \
    region, availability_zone, cpu_cores, memory_gb, storage_gb, gpu_count, cpu_usage_percent, \
    memory_usage_percent, storage_usage_percent, network_io_mbps, status, health_score, \
    current_job_count, max_concurrent_jobs, job_queue_size, labels, heartbeat_interval_ms, \
    last_heartbeat, registered_at, updated_at, version";

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> ClusterResult<ClusterNode> {
        Ok(ClusterNode {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            cluster_id: row.try_get("cluster_id")?,
            name: row.try_get("name")?,
            node_type: row.try_get("node_type")?,
            hostname: row.try_get("hostname")?,
            ip_address: row.try_get("ip_address")?,
            port: row.try_get("port")?,
            region: row.try_get("region")?,
            availability_zone: row.try_get("availability_zone")?,
            cpu_cores: row.try_get("cpu_cores")?,
            memory_gb: row.try_get("memory_gb")?,
            storage_gb: row.try_get("storage_gb")?,
            gpu_count: row.try_get("gpu_count")?,
            cpu_usage_percent: row.try_get("cpu_usage_percent")?,
            memory_usage_percent: row.try_get("memory_usage_percent")?,
            storage_usage_percent: row.try_get("storage_usage_percent")?,
            network_io_mbps: row.try_get("network_io_mbps")?,
            status: row.try_get("status")?,
            health_score: row.try_get("health_score")?,
            current_job_count: row.try_get("current_job_count")?,
            max_concurrent_jobs: row.try_get("max_concurrent_jobs")?,
            job_queue_size: row.try_get("job_queue_size")?,
            labels: MappingHelpers::parse_json(row, "labels")?,
            heartbeat_interval_ms: row.try_get("heartbeat_interval_ms")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            registered_at: row.try_get("registered_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn create(&self, node: &ClusterNode) -> ClusterResult<ClusterNode> {
        let labels_json = MappingHelpers::to_json(&node.labels, "labels")?;

        let result = sqlx::query(
            r#"
            INSERT INTO cluster_nodes (
                node_id, cluster_id, name, node_type, hostname, ip_address, port,
                region, availability_zone, cpu_cores, memory_gb, storage_gb, gpu_count,
                cpu_usage_percent, memory_usage_percent, storage_usage_percent, network_io_mbps,
                status, health_score, current_job_count, max_concurrent_jobs, job_queue_size,
                labels, heartbeat_interval_ms, last_heartbeat, registered_at, updated_at, version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&node.node_id)
        .bind(&node.cluster_id)
        .bind(&node.name)
        .bind(&node.node_type)
        .bind(&node.hostname)
        .bind(&node.ip_address)
        .bind(node.port)
        .bind(&node.region)
        .bind(&node.availability_zone)
        .bind(node.cpu_cores)
        .bind(node.memory_gb)
        .bind(node.storage_gb)
        .bind(node.gpu_count)
        .bind(node.cpu_usage_percent)
        .bind(node.memory_usage_percent)
        .bind(node.storage_usage_percent)
        .bind(node.network_io_mbps)
        .bind(node.status)
        .bind(node.health_score)
        .bind(node.current_job_count)
        .bind(node.max_concurrent_jobs)
        .bind(node.job_queue_size)
        .bind(labels_json)
        .bind(node.heartbeat_interval_ms)
        .bind(node.last_heartbeat)
        .bind(node.registered_at)
        .bind(node.updated_at)
        .execute(&self.pool)
        .await?;

        let mut created = node.clone();
        created.id = result.last_insert_rowid();
        created.version = 1;

        debug!("创建节点成功: {} ({})", created.node_id, created.hostname);
        Ok(created)
    }

    async fn get(&self, node_id: &str) -> ClusterResult<Option<ClusterNode>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM cluster_nodes WHERE node_id = $1"
        ))
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn find_by_hostname(
        &self,
        cluster_id: &str,
        hostname: &str,
    ) -> ClusterResult<Option<ClusterNode>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM cluster_nodes WHERE cluster_id = $1 AND hostname = $2"
        ))
        .bind(cluster_id)
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn list_by_cluster(
        &self,
        cluster_id: &str,
        status: Option<NodeStatus>,
    ) -> ClusterResult<Vec<ClusterNode>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {NODE_COLUMNS} FROM cluster_nodes WHERE cluster_id = $1 AND status = $2 ORDER BY id"
                ))
                .bind(cluster_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {NODE_COLUMNS} FROM cluster_nodes WHERE cluster_id = $1 ORDER BY id"
                ))
                .bind(cluster_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn list_by_status(&self, status: NodeStatus) -> ClusterResult<Vec<ClusterNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM cluster_nodes WHERE status = $1 ORDER BY id"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn compare_and_swap(&self, node: &ClusterNode) -> ClusterResult<bool> {
        let labels_json = MappingHelpers::to_json(&node.labels, "labels")?;

        let result = sqlx::query(
            r#"
            UPDATE cluster_nodes SET
                name = ?, node_type = ?, ip_address = ?, port = ?, region = ?,
                availability_zone = ?, cpu_cores = ?, memory_gb = ?, storage_gb = ?, gpu_count = ?,
                cpu_usage_percent = ?, memory_usage_percent = ?, storage_usage_percent = ?,
                network_io_mbps = ?, status = ?, health_score = ?, current_job_count = ?,
                max_concurrent_jobs = ?, job_queue_size = ?, labels = ?, heartbeat_interval_ms = ?,
                last_heartbeat = ?, updated_at = ?, version = version + 1
            WHERE node_id = ? AND version = ?
            "#,
        )
        .bind(&node.name)
        .bind(&node.node_type)
        .bind(&node.ip_address)
        .bind(node.port)
        .bind(&node.region)
        .bind(&node.availability_zone)
        .bind(node.cpu_cores)
        .bind(node.memory_gb)
        .bind(node.storage_gb)
        .bind(node.gpu_count)
        .bind(node.cpu_usage_percent)
        .bind(node.memory_usage_percent)
        .bind(node.storage_usage_percent)
        .bind(node.network_io_mbps)
        .bind(node.status)
        .bind(node.health_score)
        .bind(node.current_job_count)
        .bind(node.max_concurrent_jobs)
        .bind(node.job_queue_size)
        .bind(labels_json)
        .bind(node.heartbeat_interval_ms)
        .bind(node.last_heartbeat)
        .bind(node.updated_at)
        .bind(&node.node_id)
        .bind(node.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM cluster_nodes WHERE node_id = $1")
            .bind(&node.node_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if !exists {
            return Err(ClusterError::NodeNotFound {
                id: node.node_id.clone(),
            });
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::run_migrations;
    use cluster_core::models::NodeRegistration;
    use std::collections::BTreeMap;

    async fn setup_test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn test_node(hostname: &str) -> ClusterNode {
        let mut registration = NodeRegistration::new("node", hostname, "cluster-1", 4.0, 8.0);
        registration.labels = Some(BTreeMap::from([("zone".to_string(), "a".to_string())]));
        ClusterNode::from_registration(&registration, 30_000)
    }

    #[tokio::test]
    async fn test_create_and_get_node() {
        let repo = SqliteNodeRepository::new(setup_test_db().await);
        let created = repo.create(&test_node("host-1")).await.unwrap();
        assert!(created.id > 0);

        let loaded = repo.get(&created.node_id).await.unwrap().unwrap();
        assert_eq!(loaded.hostname, "host-1");
        assert_eq!(loaded.status, NodeStatus::Active);
        assert_eq!(loaded.labels.get("zone").map(String::as_str), Some("a"));
        assert_eq!(loaded.version, 1);

        let by_host = repo
            .find_by_hostname("cluster-1", "host-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_host.node_id, created.node_id);
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_version() {
        let repo = SqliteNodeRepository::new(setup_test_db().await);
        let created = repo.create(&test_node("host-1")).await.unwrap();

        let mut first = created.clone();
        first.current_job_count = 1;
        assert!(repo.compare_and_swap(&first).await.unwrap());

        let mut stale = created.clone();
        stale.current_job_count = 5;
        assert!(!repo.compare_and_swap(&stale).await.unwrap());

        let loaded = repo.get(&created.node_id).await.unwrap().unwrap();
        assert_eq!(loaded.current_job_count, 1);
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn test_list_by_cluster_with_status_filter() {
        let repo = SqliteNodeRepository::new(setup_test_db().await);
        let a = repo.create(&test_node("host-a")).await.unwrap();
        repo.create(&test_node("host-b")).await.unwrap();

        let mut failed = a.clone();
        failed.status = NodeStatus::Failed;
        assert!(repo.compare_and_swap(&failed).await.unwrap());

        let all = repo.list_by_cluster("cluster-1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        let active = repo
            .list_by_cluster("cluster-1", Some(NodeStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].hostname, "host-b");
        assert_eq!(repo.list_by_status(NodeStatus::Failed).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_hostname_is_rejected() {
        let repo = SqliteNodeRepository::new(setup_test_db().await);
        repo.create(&test_node("host-1")).await.unwrap();
        assert!(repo.create(&test_node("host-1")).await.is_err());
    }
}
