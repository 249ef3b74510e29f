use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cluster_core::config::DatabaseConfig;
use cluster_core::{ClusterResult, ClusterStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::sqlite::{
    run_migrations, SqliteAutoScalerRepository, SqliteJobRepository, SqliteNodeMetricRepository,
    SqliteNodeRepository, SqliteScalingEventRepository,
};
use crate::memory::in_memory_store;

/// Database type detection
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    Memory,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url == cluster_core::config::database::MEMORY_DATABASE_URL {
            DatabaseType::Memory
        } else {
            DatabaseType::SQLite
        }
    }
}

/// 根据配置创建集群状态存储
pub struct DatabaseManager {
    pool: Option<SqlitePool>,
    store: ClusterStore,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> ClusterResult<Self> {
        match DatabaseType::from_url(&config.url) {
            DatabaseType::Memory => {
                info!("使用内存集群状态存储");
                Ok(Self {
                    pool: None,
                    store: in_memory_store(),
                })
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
                // 内存数据库每个连接都是独立实例
                let max_connections = if config.url.contains(":memory:") {
                    1
                } else {
                    config.max_connections
                };

                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                    .connect_with(options)
                    .await?;
                run_migrations(&pool).await?;

                info!("已连接SQLite集群状态存储: {}", config.url);
                Ok(Self {
                    store: Self::sqlite_store(&pool),
                    pool: Some(pool),
                })
            }
        }
    }

    fn sqlite_store(pool: &SqlitePool) -> ClusterStore {
        ClusterStore::new(
            Arc::new(SqliteNodeRepository::new(pool.clone())),
            Arc::new(SqliteJobRepository::new(pool.clone())),
            Arc::new(SqliteAutoScalerRepository::new(pool.clone())),
            Arc::new(SqliteScalingEventRepository::new(pool.clone())),
            Arc::new(SqliteNodeMetricRepository::new(pool.clone())),
        )
    }

    pub fn database_type(&self) -> DatabaseType {
        match self.pool {
            Some(_) => DatabaseType::SQLite,
            None => DatabaseType::Memory,
        }
    }

    pub fn store(&self) -> ClusterStore {
        self.store.clone()
    }

    pub async fn health_check(&self) -> ClusterResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_core::models::{ClusterNode, NodeRegistration};

    fn config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_database_type_detection() {
        assert_eq!(DatabaseType::from_url("memory"), DatabaseType::Memory);
        assert_eq!(DatabaseType::from_url("sqlite:test.db"), DatabaseType::SQLite);
        assert_eq!(DatabaseType::from_url("sqlite::memory:"), DatabaseType::SQLite);
    }

    #[tokio::test]
    async fn test_memory_manager_shares_one_store() {
        let manager = DatabaseManager::new(&config("memory")).await.unwrap();
        assert_eq!(manager.database_type(), DatabaseType::Memory);
        assert!(manager.health_check().await.is_ok());

        let node = ClusterNode::from_registration(
            &NodeRegistration::new("n", "h", "c1", 2.0, 4.0),
            30_000,
        );
        let created = manager.store().nodes.create(&node).await.unwrap();
        assert!(manager
            .store()
            .nodes
            .get(&created.node_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_sqlite_manager_runs_migrations() {
        let manager = DatabaseManager::new(&config("sqlite::memory:")).await.unwrap();
        assert_eq!(manager.database_type(), DatabaseType::SQLite);
        assert!(manager.health_check().await.is_ok());

        let nodes = manager
            .store()
            .nodes
            .list_by_cluster("c1", None)
            .await
            .unwrap();
        assert!(nodes.is_empty());

        manager.close().await;
    }
}
