use async_trait::async_trait;
use cluster_core::models::{DistributedJob, JobStatus, ResourceRequirements};
use cluster_core::{ClusterError, ClusterResult, JobRepository};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

const JOB_COLUMNS: &str = "id, job_id, cluster_id, name, job_type, job_config, cpu_cores_required, \
    memory_gb_required, storage_gb_required, gpu_required, priority, scheduling_constraints, \
    preferred_nodes, status, assigned_node_id, retry_count, max_retries, timeout_minutes, \
    submitted_by, org_id, created_at, scheduled_at, started_at, completed_at, last_retry_at, \
    duration_seconds, output_data, error_message, version";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> ClusterResult<DistributedJob> {
        Ok(DistributedJob {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            cluster_id: row.try_get("cluster_id")?,
            name: row.try_get("name")?,
            job_type: row.try_get("job_type")?,
            job_config: MappingHelpers::parse_json(row, "job_config")?,
            requirements: ResourceRequirements {
                cpu_cores: row.try_get("cpu_cores_required")?,
                memory_gb: row.try_get("memory_gb_required")?,
                storage_gb: row.try_get("storage_gb_required")?,
                gpu_required: row.try_get("gpu_required")?,
            },
            priority: row.try_get("priority")?,
            constraints: MappingHelpers::parse_json(row, "scheduling_constraints")?,
            preferred_nodes: MappingHelpers::parse_json(row, "preferred_nodes")?,
            status: row.try_get("status")?,
            assigned_node_id: row.try_get("assigned_node_id")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            timeout_minutes: row.try_get("timeout_minutes")?,
            submitted_by: row.try_get("submitted_by")?,
            org_id: row.try_get("org_id")?,
            created_at: row.try_get("created_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            last_retry_at: row.try_get("last_retry_at")?,
            duration_seconds: row.try_get("duration_seconds")?,
            output_data: MappingHelpers::parse_optional_json(row, "output_data")?,
            error_message: row.try_get("error_message")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &DistributedJob) -> ClusterResult<DistributedJob> {
        let result = sqlx::query(
            r#"
            INSERT INTO distributed_jobs (
                job_id, cluster_id, name, job_type, job_config, cpu_cores_required,
                memory_gb_required, storage_gb_required, gpu_required, priority,
                scheduling_constraints, preferred_nodes, status, assigned_node_id, retry_count,
                max_retries, timeout_minutes, submitted_by, org_id, created_at, scheduled_at,
                started_at, completed_at, last_retry_at, duration_seconds, output_data,
                error_message, version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.cluster_id)
        .bind(&job.name)
        .bind(&job.job_type)
        .bind(MappingHelpers::to_json(&job.job_config, "job_config")?)
        .bind(job.requirements.cpu_cores)
        .bind(job.requirements.memory_gb)
        .bind(job.requirements.storage_gb)
        .bind(job.requirements.gpu_required)
        .bind(job.priority)
        .bind(MappingHelpers::to_json(&job.constraints, "scheduling_constraints")?)
        .bind(MappingHelpers::to_json(&job.preferred_nodes, "preferred_nodes")?)
        .bind(job.status)
        .bind(&job.assigned_node_id)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.timeout_minutes)
        .bind(&job.submitted_by)
        .bind(&job.org_id)
        .bind(job.created_at)
        .bind(job.scheduled_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_retry_at)
        .bind(job.duration_seconds)
        .bind(MappingHelpers::to_optional_json(job.output_data.as_ref(), "output_data")?)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;

        let mut created = job.clone();
        created.id = result.last_insert_rowid();
        created.version = 1;

        debug!("创建作业成功: {} ({})", created.job_id, created.job_type);
        Ok(created)
    }

    async fn get(&self, job_id: &str) -> ClusterResult<Option<DistributedJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM distributed_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list_by_status(&self, status: JobStatus) -> ClusterResult<Vec<DistributedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM distributed_jobs WHERE status = $1 ORDER BY id"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list_by_cluster(&self, cluster_id: &str) -> ClusterResult<Vec<DistributedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM distributed_jobs WHERE cluster_id = $1 ORDER BY id"
        ))
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list_by_node(
        &self,
        node_id: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<DistributedJob>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM distributed_jobs WHERE assigned_node_id = ? AND status IN ({}) ORDER BY id",
            MappingHelpers::placeholders(statuses.len())
        );
        let mut query = sqlx::query(&sql).bind(node_id);
        for status in statuses {
            query = query.bind(*status);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn compare_and_swap(&self, job: &DistributedJob) -> ClusterResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE distributed_jobs SET
                priority = ?, status = ?, assigned_node_id = ?, retry_count = ?,
                scheduled_at = ?, started_at = ?, completed_at = ?, last_retry_at = ?,
                duration_seconds = ?, output_data = ?, error_message = ?,
                version = version + 1
            WHERE job_id = ? AND version = ?
            "#,
        )
        .bind(job.priority)
        .bind(job.status)
        .bind(&job.assigned_node_id)
        .bind(job.retry_count)
        .bind(job.scheduled_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_retry_at)
        .bind(job.duration_seconds)
        .bind(MappingHelpers::to_optional_json(job.output_data.as_ref(), "output_data")?)
        .bind(&job.error_message)
        .bind(&job.job_id)
        .bind(job.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM distributed_jobs WHERE job_id = $1")
            .bind(&job.job_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if !exists {
            return Err(ClusterError::JobNotFound {
                id: job.job_id.clone(),
            });
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::run_migrations;
    use chrono::Utc;
    use cluster_core::models::{JobEvent, JobPriority, JobSubmission};

    async fn setup_test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn test_job() -> DistributedJob {
        let mut submission = JobSubmission::new(
            "report",
            "data_processing",
            "cluster-1",
            ResourceRequirements {
                cpu_cores: 1.5,
                memory_gb: 2.0,
                storage_gb: 0.0,
                gpu_required: false,
            },
        );
        submission.priority = JobPriority::High;
        submission.preferred_nodes = vec!["node-a".to_string()];
        submission.job_config = serde_json::json!({"records": [1, 2, 3]});
        DistributedJob::from_submission(submission)
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let repo = SqliteJobRepository::new(setup_test_db().await);
        let created = repo.create(&test_job()).await.unwrap();

        let loaded = repo.get(&created.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.priority, JobPriority::High);
        assert_eq!(loaded.requirements.cpu_cores, 1.5);
        assert_eq!(loaded.preferred_nodes, vec!["node-a".to_string()]);
        assert_eq!(loaded.job_config["records"][2], 3);
        assert!(loaded.assigned_node_id.is_none());
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_transition_persisted_through_compare_and_swap() {
        let repo = SqliteJobRepository::new(setup_test_db().await);
        let created = repo.create(&test_job()).await.unwrap();

        let scheduled = created
            .apply(
                JobEvent::Assign {
                    node_id: "node-a".to_string(),
                },
                Utc::now(),
            )
            .unwrap()
            .job;
        assert!(repo.compare_and_swap(&scheduled).await.unwrap());
        // 同一版本的第二次写入失败
        assert!(!repo.compare_and_swap(&scheduled).await.unwrap());

        let on_node = repo
            .list_by_node("node-a", &[JobStatus::Scheduled, JobStatus::Running])
            .await
            .unwrap();
        assert_eq!(on_node.len(), 1);
        assert_eq!(on_node[0].version, 2);
        assert!(on_node[0].scheduled_at.is_some());

        assert!(repo
            .list_by_node("node-a", &[JobStatus::Running])
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.list_by_status(JobStatus::Scheduled).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_unknown_job() {
        let repo = SqliteJobRepository::new(setup_test_db().await);
        let result = repo.compare_and_swap(&test_job()).await;
        assert!(matches!(result, Err(ClusterError::JobNotFound { .. })));
    }
}
