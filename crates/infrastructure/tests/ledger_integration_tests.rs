use anyhow::Result;
use cluster_core::config::DatabaseConfig;
use cluster_core::models::{
    ClusterNode, DistributedJob, JobEffect, JobEvent, JobStatus, JobSubmission, NodeRegistration,
    NodeStatus, ResourceRequirements,
};
use cluster_core::{CapacityLedger, ClusterError, ClusterStore, JobLedger};
use cluster_infrastructure::{in_memory_store, DatabaseManager};

async fn sqlite_store() -> Result<ClusterStore> {
    let manager = DatabaseManager::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    })
    .await?;
    Ok(manager.store())
}

async fn stores() -> Result<Vec<(&'static str, ClusterStore)>> {
    Ok(vec![
        ("memory", in_memory_store()),
        ("sqlite", sqlite_store().await?),
    ])
}

async fn seed_node(store: &ClusterStore, max_jobs: i32) -> Result<ClusterNode> {
    let mut registration = NodeRegistration::new("worker", "host-1", "c1", 8.0, 16.0);
    registration.max_concurrent_jobs = Some(max_jobs);
    let node = ClusterNode::from_registration(&registration, 30_000);
    Ok(store.nodes.create(&node).await?)
}

async fn seed_job(store: &ClusterStore) -> Result<DistributedJob> {
    let job = DistributedJob::from_submission(JobSubmission::new(
        "job",
        "generic",
        "c1",
        ResourceRequirements {
            cpu_cores: 1.0,
            memory_gb: 1.0,
            ..Default::default()
        },
    ));
    Ok(store.jobs.create(&job).await?)
}

#[tokio::test]
async fn test_concurrent_claims_never_exceed_slots() -> Result<()> {
    for (backend, store) in stores().await? {
        let node = seed_node(&store, 3).await?;
        let job = seed_job(&store).await?;
        let ledger = CapacityLedger::new(store.nodes.clone(), 16);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let node_id = node.node_id.clone();
            let job = job.clone();
            handles.push(tokio::spawn(async move {
                ledger.claim_slot(&node_id, &job).await
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => claimed += 1,
                Err(e) => assert!(
                    matches!(e, ClusterError::SchedulingConflict { .. }),
                    "{backend}: unexpected error {e}"
                ),
            }
        }

        let stored = store.nodes.get(&node.node_id).await?.unwrap();
        assert_eq!(claimed, 3, "{backend}");
        assert_eq!(stored.current_job_count, 3, "{backend}");
        assert_eq!(stored.job_queue_size, 3, "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn test_release_and_dequeue_floor_at_zero() -> Result<()> {
    for (backend, store) in stores().await? {
        let node = seed_node(&store, 2).await?;
        let job = seed_job(&store).await?;
        let ledger = CapacityLedger::new(store.nodes.clone(), 4);

        ledger.claim_slot(&node.node_id, &job).await?;
        let reschedule = ledger
            .apply_effects(&[
                JobEffect::DequeueFromNode {
                    node_id: node.node_id.clone(),
                },
                JobEffect::ReleaseSlot {
                    node_id: node.node_id.clone(),
                },
            ])
            .await?;
        assert!(!reschedule, "{backend}");

        ledger.release_slot(&node.node_id).await?;
        let after = ledger.dequeue(&node.node_id).await?;
        assert_eq!(after.current_job_count, 0, "{backend}");
        assert_eq!(after.job_queue_size, 0, "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn test_job_ledger_single_winner() -> Result<()> {
    for (backend, store) in stores().await? {
        let job = seed_job(&store).await?;
        let ledger = JobLedger::new(store.jobs.clone(), 8);

        let first = ledger
            .transition(
                &job.job_id,
                JobEvent::Assign {
                    node_id: "n1".to_string(),
                },
            )
            .await?;
        assert_eq!(first.job.status, JobStatus::Scheduled, "{backend}");

        // 作业已不是PENDING，第二次分配被拒绝
        let second = ledger
            .transition(
                &job.job_id,
                JobEvent::Assign {
                    node_id: "n2".to_string(),
                },
            )
            .await;
        assert!(
            matches!(second, Err(ClusterError::InvalidTransition(_))),
            "{backend}"
        );

        let cancelled = ledger.transition(&job.job_id, JobEvent::Cancel).await?;
        assert_eq!(cancelled.job.status, JobStatus::Cancelled, "{backend}");
        assert!(
            cancelled.effects.contains(&JobEffect::ReleaseSlot {
                node_id: "n1".to_string()
            }),
            "{backend}"
        );

        let stored = ledger.get(&job.job_id).await?;
        assert_eq!(stored.status, JobStatus::Cancelled, "{backend}");
        assert!(stored.assigned_node_id.is_none(), "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_entities() -> Result<()> {
    let store = in_memory_store();
    let capacity = CapacityLedger::new(store.nodes.clone(), 2);
    let jobs = JobLedger::new(store.jobs.clone(), 2);

    assert!(matches!(
        capacity.release_slot("nope").await,
        Err(ClusterError::NodeNotFound { .. })
    ));
    assert!(matches!(
        jobs.transition("nope", JobEvent::Cancel).await,
        Err(ClusterError::JobNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_releasing_slots_keeps_failed_node_unhealthy() -> Result<()> {
    for (backend, store) in stores().await? {
        let node = seed_node(&store, 4).await?;
        let job = seed_job(&store).await?;
        let ledger = CapacityLedger::new(store.nodes.clone(), 4);
        ledger.claim_slot(&node.node_id, &job).await?;
        ledger.claim_slot(&node.node_id, &job).await?;

        ledger
            .modify(&node.node_id, |node| {
                node.status = NodeStatus::Failed;
                node.health_score = 0.0;
                Ok(())
            })
            .await?;
        ledger.dequeue(&node.node_id).await?;
        ledger.release_slot(&node.node_id).await?;
        let drained = ledger.release_slot(&node.node_id).await?;

        assert_eq!(drained.current_job_count, 0, "{backend}");
        assert_eq!(drained.status, NodeStatus::Failed, "{backend}");
        assert_eq!(drained.health_score, 0.0, "{backend}");
    }
    Ok(())
}
