//! Throughput-driven control loop end to end over in-memory collaborators.

mod common;

use std::sync::Arc;

use common::{batch, FakePoolService};
use jobman_core::JobManagerConfig;
use jobman_manager::{LoopOutcome, Runner};
use jobman_pool::JobState;
use jobman_queue::{InMemoryQueue, MessageQueue};

fn runner(service: &Arc<FakePoolService>, queue: &Arc<InMemoryQueue>) -> Runner {
    let queue: Arc<dyn MessageQueue> = queue.clone();
    Runner::new(
        batch(service, "process %n%"),
        queue,
        JobManagerConfig::default(),
        "scan",
    )
}

async fn fill(queue: &InMemoryQueue, count: usize) {
    for n in 0..count {
        queue.push(format!(r#"{{"n":{n}}}"#)).await;
    }
}

#[tokio::test]
async fn unknown_ratio_falls_back_to_configured_increment() {
    let service = FakePoolService::new();
    service.push_batch_metrics(5.0, vec![], vec![]);
    let queue = Arc::new(InMemoryQueue::new(10));
    fill(&queue, 30).await;

    let outcome = runner(&service, &queue).run_once(true).run().await.unwrap();

    assert_eq!(outcome, LoopOutcome::SinglePass);
    let calls = service.add_task_calls();
    assert_eq!(calls.len(), 1);
    // Job id is used as given.
    assert_eq!(calls[0].0, "scan");
    // Default increment is 20, pulled in receives of ten.
    assert_eq!(calls[0].1.len(), 20);
    assert_eq!(queue.deleted_ids().await.len(), 20);
    assert_eq!(queue.ready_len().await, 10);
}

#[tokio::test]
async fn low_ratio_blocks_admission() {
    let service = FakePoolService::new();
    service.push_batch_metrics(3.0, vec![10.0; 6], vec![2.0; 6]);
    let queue = Arc::new(InMemoryQueue::new(10));
    fill(&queue, 5).await;

    let outcome = runner(&service, &queue).run_once(true).run().await.unwrap();

    assert_eq!(outcome, LoopOutcome::SinglePass);
    assert!(service.add_task_calls().is_empty());
    assert_eq!(queue.ready_len().await, 5);
}

#[tokio::test]
async fn known_ratio_sizes_the_increment() {
    let service = FakePoolService::new();
    // Ratio 2.0; reaching 1.0 needs an average of 4 pending, 2 present.
    service.push_batch_metrics(3.0, vec![2.0; 6], vec![4.0; 6]);
    let queue = Arc::new(InMemoryQueue::new(1));
    fill(&queue, 5).await;

    runner(&service, &queue).run_once(true).run().await.unwrap();

    assert_eq!(service.add_task_calls()[0].1.len(), 2);
    assert_eq!(queue.ready_len().await, 3);
}

#[tokio::test]
async fn ratio_already_at_target_adds_nothing() {
    let service = FakePoolService::new();
    service.push_batch_metrics(3.0, vec![5.0; 6], vec![4.0; 6]);
    let queue = Arc::new(InMemoryQueue::new(10));
    fill(&queue, 5).await;

    let outcome = runner(&service, &queue).run_once(true).run().await.unwrap();

    assert_eq!(outcome, LoopOutcome::SinglePass);
    assert!(service.add_task_calls().is_empty());
}

#[tokio::test]
async fn empty_queue_stops_the_loop() {
    let service = FakePoolService::new();
    service.push_batch_metrics(5.0, vec![], vec![]);
    let queue = Arc::new(InMemoryQueue::new(10));

    let outcome = runner(&service, &queue).run().await.unwrap();

    assert_eq!(outcome, LoopOutcome::QueueDrained);
    assert!(service.add_task_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn runs_until_queue_is_empty() {
    let service = FakePoolService::new();
    service.with_job("scan", JobState::Active);
    service.push_batch_metrics(5.0, vec![], vec![]);
    let queue = Arc::new(InMemoryQueue::new(10));
    fill(&queue, 3).await;

    let outcome = runner(&service, &queue).run().await.unwrap();

    assert_eq!(outcome, LoopOutcome::QueueDrained);
    assert!(service.added_jobs().is_empty());
    assert_eq!(service.add_task_calls().len(), 1);
    assert_eq!(queue.deleted_ids().await.len(), 3);
}
