use cluster_core::ClusterResult;
use sqlx::SqlitePool;
use tracing::info;

const SCHEMA: &[(&str, &str)] = &[
    (
        "cluster_nodes",
        r#"
        CREATE TABLE IF NOT EXISTS cluster_nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL UNIQUE,
            cluster_id TEXT NOT NULL,
            name TEXT NOT NULL,
            node_type TEXT NOT NULL,
            hostname TEXT NOT NULL,
            ip_address TEXT NOT NULL,
            port INTEGER NOT NULL,
            region TEXT,
            availability_zone TEXT,
            cpu_cores REAL NOT NULL,
            memory_gb REAL NOT NULL,
            storage_gb REAL NOT NULL DEFAULT 0,
            gpu_count INTEGER NOT NULL DEFAULT 0,
            cpu_usage_percent REAL NOT NULL DEFAULT 0,
            memory_usage_percent REAL NOT NULL DEFAULT 0,
            storage_usage_percent REAL NOT NULL DEFAULT 0,
            network_io_mbps REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            health_score REAL NOT NULL DEFAULT 100,
            current_job_count INTEGER NOT NULL DEFAULT 0,
            max_concurrent_jobs INTEGER NOT NULL,
            job_queue_size INTEGER NOT NULL DEFAULT 0,
            labels TEXT NOT NULL DEFAULT '{}',
            heartbeat_interval_ms INTEGER NOT NULL,
            last_heartbeat DATETIME NOT NULL,
            registered_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            UNIQUE (cluster_id, hostname)
        )
        "#,
    ),
    (
        "distributed_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS distributed_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL UNIQUE,
            cluster_id TEXT NOT NULL,
            name TEXT NOT NULL,
            job_type TEXT NOT NULL,
            job_config TEXT NOT NULL DEFAULT '{}',
            cpu_cores_required REAL NOT NULL,
            memory_gb_required REAL NOT NULL,
            storage_gb_required REAL NOT NULL DEFAULT 0,
            gpu_required INTEGER NOT NULL DEFAULT 0,
            priority TEXT NOT NULL,
            scheduling_constraints TEXT NOT NULL DEFAULT '{}',
            preferred_nodes TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            assigned_node_id TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL,
            timeout_minutes INTEGER NOT NULL,
            submitted_by TEXT,
            org_id TEXT,
            created_at DATETIME NOT NULL,
            scheduled_at DATETIME,
            started_at DATETIME,
            completed_at DATETIME,
            last_retry_at DATETIME,
            duration_seconds REAL,
            output_data TEXT,
            error_message TEXT,
            version INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "idx_distributed_jobs_status",
        "CREATE INDEX IF NOT EXISTS idx_distributed_jobs_status ON distributed_jobs (status)",
    ),
    (
        "idx_distributed_jobs_node",
        "CREATE INDEX IF NOT EXISTS idx_distributed_jobs_node ON distributed_jobs (assigned_node_id)",
    ),
    (
        "auto_scalers",
        r#"
        CREATE TABLE IF NOT EXISTS auto_scalers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scaler_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            min_nodes INTEGER NOT NULL,
            max_nodes INTEGER NOT NULL,
            target_cpu_utilization REAL NOT NULL,
            target_memory_utilization REAL NOT NULL,
            scale_up_cooldown INTEGER NOT NULL,
            scale_down_cooldown INTEGER NOT NULL,
            scale_up_step_size INTEGER NOT NULL,
            scale_down_step_size INTEGER NOT NULL,
            node_template TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_scaling_action DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "scaling_events",
        r#"
        CREATE TABLE IF NOT EXISTS scaling_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            scaler_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            trigger_metric TEXT NOT NULL,
            trigger_value REAL NOT NULL,
            threshold REAL NOT NULL,
            current_node_count INTEGER NOT NULL,
            target_node_count INTEGER NOT NULL,
            nodes_added TEXT NOT NULL DEFAULT '[]',
            nodes_removed TEXT NOT NULL DEFAULT '[]',
            success INTEGER,
            error_message TEXT,
            created_at DATETIME NOT NULL,
            completed_at DATETIME
        )
        "#,
    ),
    (
        "node_metrics",
        r#"
        CREATE TABLE IF NOT EXISTS node_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            cpu_usage_percent REAL NOT NULL,
            memory_usage_percent REAL NOT NULL,
            storage_usage_percent REAL NOT NULL,
            network_io_mbps REAL NOT NULL,
            active_jobs INTEGER NOT NULL,
            queued_jobs INTEGER NOT NULL,
            recorded_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "idx_node_metrics_node_time",
        "CREATE INDEX IF NOT EXISTS idx_node_metrics_node_time ON node_metrics (node_id, recorded_at)",
    ),
];

/// 创建集群状态表，可重复执行
pub async fn run_migrations(pool: &SqlitePool) -> ClusterResult<()> {
    info!("运行SQLite数据库迁移");

    for (name, statement) in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
        tracing::debug!("迁移完成: {}", name);
    }

    Ok(())
}
