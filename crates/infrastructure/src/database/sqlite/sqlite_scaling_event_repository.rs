use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cluster_core::models::{ScalingEvent, ScalingOutcome};
use cluster_core::{ClusterError, ClusterResult, ScalingEventRepository};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

const EVENT_COLUMNS: &str = "id, event_id, scaler_id, cluster_id, direction, trigger_metric, \
    trigger_value, threshold, current_node_count, target_node_count, nodes_added, nodes_removed, \
    success, error_message, created_at, completed_at";

pub struct SqliteScalingEventRepository {
    pool: SqlitePool,
}

impl SqliteScalingEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> ClusterResult<ScalingEvent> {
        Ok(ScalingEvent {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            scaler_id: row.try_get("scaler_id")?,
            cluster_id: row.try_get("cluster_id")?,
            direction: row.try_get("direction")?,
            trigger_metric: row.try_get("trigger_metric")?,
            trigger_value: row.try_get("trigger_value")?,
            threshold: row.try_get("threshold")?,
            current_node_count: row.try_get("current_node_count")?,
            target_node_count: row.try_get("target_node_count")?,
            nodes_added: MappingHelpers::parse_json(row, "nodes_added")?,
            nodes_removed: MappingHelpers::parse_json(row, "nodes_removed")?,
            success: row.try_get("success")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn fetch(&self, event_id: &str) -> ClusterResult<Option<ScalingEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scaling_events WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_event).transpose()
    }
}

#[async_trait]
impl ScalingEventRepository for SqliteScalingEventRepository {
    async fn create(&self, event: &ScalingEvent) -> ClusterResult<ScalingEvent> {
        let result = sqlx::query(
            r#"
            INSERT INTO scaling_events (
                event_id, scaler_id, cluster_id, direction, trigger_metric, trigger_value,
                threshold, current_node_count, target_node_count, nodes_added, nodes_removed,
                success, error_message, created_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.scaler_id)
        .bind(&event.cluster_id)
        .bind(event.direction)
        .bind(&event.trigger_metric)
        .bind(event.trigger_value)
        .bind(event.threshold)
        .bind(event.current_node_count)
        .bind(event.target_node_count)
        .bind(MappingHelpers::to_json(&event.nodes_added, "nodes_added")?)
        .bind(MappingHelpers::to_json(&event.nodes_removed, "nodes_removed")?)
        .bind(event.success)
        .bind(&event.error_message)
        .bind(event.created_at)
        .bind(event.completed_at)
        .execute(&self.pool)
        .await?;

        let mut created = event.clone();
        created.id = result.last_insert_rowid();

        debug!(
            "记录伸缩事件: {} {} -> {}",
            created.event_id, created.direction, created.target_node_count
        );
        Ok(created)
    }

    async fn complete(
        &self,
        event_id: &str,
        outcome: &ScalingOutcome,
        completed_at: DateTime<Utc>,
    ) -> ClusterResult<ScalingEvent> {
        let result = sqlx::query(
            r#"
            UPDATE scaling_events
            SET nodes_added = ?, nodes_removed = ?, success = ?, error_message = ?, completed_at = ?
            WHERE event_id = ? AND completed_at IS NULL
            "#,
        )
        .bind(MappingHelpers::to_json(&outcome.nodes_added, "nodes_added")?)
        .bind(MappingHelpers::to_json(&outcome.nodes_removed, "nodes_removed")?)
        .bind(outcome.success)
        .bind(&outcome.error_message)
        .bind(completed_at)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        let event = self
            .fetch(event_id)
            .await?
            .ok_or_else(|| ClusterError::Internal(format!("伸缩事件不存在: {event_id}")))?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::InvalidTransition(format!(
                "伸缩事件 {event_id} 已完成，不能再次修改"
            )));
        }
        Ok(event)
    }

    async fn list_by_scaler(&self, scaler_id: &str) -> ClusterResult<Vec<ScalingEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scaling_events WHERE scaler_id = $1 ORDER BY id"
        ))
        .bind(scaler_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::run_migrations;
    use cluster_core::models::ScalingDirection;

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
    async fn test_event_is_completed_once() {
        let repo = SqliteScalingEventRepository::new(setup_test_db().await);
        let event = ScalingEvent::begin(
            "scaler-1",
            "cluster-1",
            ScalingDirection::Up,
            "cpu_utilization",
            92.5,
            70.0,
            2,
            3,
        );
        let created = repo.create(&event).await.unwrap();
        assert!(created.success.is_none());

        let outcome = ScalingOutcome {
            nodes_added: vec!["node-x".to_string()],
            nodes_removed: Vec::new(),
            success: true,
            error_message: None,
        };
        let completed = repo
            .complete(&created.event_id, &outcome, Utc::now())
            .await
            .unwrap();
        assert_eq!(completed.success, Some(true));
        assert_eq!(completed.nodes_added, vec!["node-x".to_string()]);
        assert!(completed.completed_at.is_some());

        let again = repo.complete(&created.event_id, &outcome, Utc::now()).await;
        assert!(matches!(again, Err(ClusterError::InvalidTransition(_))));

        let events = repo.list_by_scaler("scaler-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, ScalingDirection::Up);
    }
}
