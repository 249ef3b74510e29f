use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cluster_core::models::AutoScaler;
use cluster_core::{AutoScalerRepository, ClusterError, ClusterResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

const SCALER_COLUMNS: &str = "id, scaler_id, name, cluster_id, min_nodes, max_nodes, \
    target_cpu_utilization, target_memory_utilization, scale_up_cooldown, scale_down_cooldown, \
    scale_up_step_size, scale_down_step_size, node_template, enabled, last_scaling_action, \
    created_at, updated_at";

pub struct SqliteAutoScalerRepository {
    pool: SqlitePool,
}

impl SqliteAutoScalerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_scaler(row: &sqlx::sqlite::SqliteRow) -> ClusterResult<AutoScaler> {
        Ok(AutoScaler {
            id: row.try_get("id")?,
            scaler_id: row.try_get("scaler_id")?,
            name: row.try_get("name")?,
            cluster_id: row.try_get("cluster_id")?,
            min_nodes: row.try_get("min_nodes")?,
            max_nodes: row.try_get("max_nodes")?,
            target_cpu_utilization: row.try_get("target_cpu_utilization")?,
            target_memory_utilization: row.try_get("target_memory_utilization")?,
            scale_up_cooldown: row.try_get("scale_up_cooldown")?,
            scale_down_cooldown: row.try_get("scale_down_cooldown")?,
            scale_up_step_size: row.try_get("scale_up_step_size")?,
            scale_down_step_size: row.try_get("scale_down_step_size")?,
            node_template: MappingHelpers::parse_json(row, "node_template")?,
            enabled: row.try_get("enabled")?,
            last_scaling_action: row.try_get("last_scaling_action")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AutoScalerRepository for SqliteAutoScalerRepository {
    async fn create(&self, scaler: &AutoScaler) -> ClusterResult<AutoScaler> {
        let result = sqlx::query(
            r#"
            INSERT INTO auto_scalers (
                scaler_id, name, cluster_id, min_nodes, max_nodes, target_cpu_utilization,
                target_memory_utilization, scale_up_cooldown, scale_down_cooldown,
                scale_up_step_size, scale_down_step_size, node_template, enabled,
                last_scaling_action, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scaler.scaler_id)
        .bind(&scaler.name)
        .bind(&scaler.cluster_id)
        .bind(scaler.min_nodes)
        .bind(scaler.max_nodes)
        .bind(scaler.target_cpu_utilization)
        .bind(scaler.target_memory_utilization)
        .bind(scaler.scale_up_cooldown)
        .bind(scaler.scale_down_cooldown)
        .bind(scaler.scale_up_step_size)
        .bind(scaler.scale_down_step_size)
        .bind(MappingHelpers::to_json(&scaler.node_template, "node_template")?)
        .bind(scaler.enabled)
        .bind(scaler.last_scaling_action)
        .bind(scaler.created_at)
        .bind(scaler.updated_at)
        .execute(&self.pool)
        .await?;

        let mut created = scaler.clone();
        created.id = result.last_insert_rowid();

        debug!("创建自动伸缩器成功: {}", created.scaler_id);
        Ok(created)
    }

    async fn get(&self, scaler_id: &str) -> ClusterResult<Option<AutoScaler>> {
        let row = sqlx::query(&format!(
            "SELECT {SCALER_COLUMNS} FROM auto_scalers WHERE scaler_id = $1"
        ))
        .bind(scaler_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_scaler).transpose()
    }

    async fn list(&self) -> ClusterResult<Vec<AutoScaler>> {
        let rows = sqlx::query(&format!("SELECT {SCALER_COLUMNS} FROM auto_scalers ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_scaler).collect()
    }

    async fn list_enabled(&self) -> ClusterResult<Vec<AutoScaler>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCALER_COLUMNS} FROM auto_scalers WHERE enabled = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_scaler).collect()
    }

    async fn set_enabled(&self, scaler_id: &str, enabled: bool) -> ClusterResult<bool> {
        let result =
            sqlx::query("UPDATE auto_scalers SET enabled = $1, updated_at = $2 WHERE scaler_id = $3")
                .bind(enabled)
                .bind(Utc::now())
                .bind(scaler_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_scaling_action(
        &self,
        scaler_id: &str,
        at: DateTime<Utc>,
    ) -> ClusterResult<()> {
        let result = sqlx::query(
            "UPDATE auto_scalers SET last_scaling_action = $1, updated_at = $2 WHERE scaler_id = $3",
        )
        .bind(at)
        .bind(at)
        .bind(scaler_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::AutoScalerNotFound {
                id: scaler_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::run_migrations;
    use cluster_core::models::AutoScalerSpec;

    async fn setup_test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_scaler_lifecycle() {
        let repo = SqliteAutoScalerRepository::new(setup_test_db().await);
        let mut spec = AutoScalerSpec::new("cluster-1", 1, 4);
        spec.node_template.labels.insert("pool".to_string(), "auto".to_string());
        let created = repo.create(&AutoScaler::from_spec(spec)).await.unwrap();

        let loaded = repo.get(&created.scaler_id).await.unwrap().unwrap();
        assert_eq!(loaded.max_nodes, 4);
        assert!(loaded.enabled);
        assert!(loaded.last_scaling_action.is_none());
        assert_eq!(
            loaded.node_template.labels.get("pool").map(String::as_str),
            Some("auto")
        );

        assert!(repo.set_enabled(&created.scaler_id, false).await.unwrap());
        assert!(repo.list_enabled().await.unwrap().is_empty());
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(!repo.set_enabled("missing", true).await.unwrap());

        let at = Utc::now();
        repo.record_scaling_action(&created.scaler_id, at)
            .await
            .unwrap();
        let loaded = repo.get(&created.scaler_id).await.unwrap().unwrap();
        let recorded = loaded.last_scaling_action.unwrap();
        assert!((recorded - at).num_milliseconds().abs() < 1);
    }
}
