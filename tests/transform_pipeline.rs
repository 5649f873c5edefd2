//! End-to-end checkpoint transform tests.
//!
//! Drives the full pipeline path: handle → transform task → output
//! channel, validating release ordering, checkpoint notifications,
//! overflow policy, flush acknowledgment, reset, and drain-on-terminal
//! semantics.

use std::error::Error as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use checkpoint_stream::{
    ChannelSink, CheckpointConfig, CheckpointStreamHandle, ItemSink, StreamError, StreamEvent,
};

/// Spawns a transform over a channel sink and returns all three ends.
fn spawn_over_channel(
    config: CheckpointConfig<u32>,
) -> (
    CheckpointStreamHandle<u32>,
    mpsc::Receiver<u32>,
    mpsc::Receiver<StreamEvent<u32>>,
) {
    let (out_tx, out_rx) = mpsc::channel(64);
    let (handle, events) =
        CheckpointStreamHandle::spawn(config, Box::new(ChannelSink::new(out_tx)));
    (handle, out_rx, events)
}

/// Polls `cond` until it holds or a timeout elapses.
async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn test_queues_until_checkpoint_then_releases_in_order() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|item| *item == 100));

    handle.ingest(1).await.unwrap();
    eventually(|| handle.depth() == 1).await;
    assert!(out_rx.try_recv().is_err(), "nothing released while buffering");

    handle.ingest(100).await.unwrap();
    assert_eq!(out_rx.recv().await, Some(1));
    assert_eq!(out_rx.recv().await, Some(100));
    assert!(matches!(
        events.recv().await,
        Some(StreamEvent::Checkpoint { item: 100 })
    ));
    assert_eq!(handle.depth(), 0);

    handle.finish().await;
    assert!(matches!(events.recv().await, Some(StreamEvent::Finished)));
    assert_eq!(out_rx.recv().await, None);
}

#[tokio::test]
async fn test_overflow_releases_all_items_past_default_limit() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|_| false));

    for i in 0..10 {
        handle.ingest(i).await.unwrap();
    }
    eventually(|| handle.depth() == 10).await;
    assert!(out_rx.try_recv().is_err());

    // The 11th item breaks the limit and forces out all 11.
    handle.ingest(10).await.unwrap();
    for i in 0..=10 {
        assert_eq!(out_rx.recv().await, Some(i));
    }
    assert!(events.try_recv().is_err(), "overflow emits no checkpoint event");

    handle.finish().await;
    assert!(matches!(events.recv().await, Some(StreamEvent::Finished)));
}

#[tokio::test]
async fn test_overflow_honors_custom_limit() {
    let config = CheckpointConfig::builder()
        .is_checkpoint(|_: &u32| false)
        .max_queued(5)
        .build()
        .unwrap();
    let (handle, mut out_rx, _events) = spawn_over_channel(config);

    for i in 0..6 {
        handle.ingest(i).await.unwrap();
    }
    for i in 0..6 {
        assert_eq!(out_rx.recv().await, Some(i));
    }

    handle.finish().await;
}

#[tokio::test]
async fn test_ordering_holds_across_release_boundaries() {
    // Checkpoints at 4, 9, 14, 19 split the sequence into four releases.
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|item| item % 5 == 4));

    for i in 0..20 {
        handle.ingest(i).await.unwrap();
    }
    for i in 0..20 {
        assert_eq!(out_rx.recv().await, Some(i));
    }

    let mut checkpoints = Vec::new();
    for _ in 0..4 {
        match events.recv().await.unwrap() {
            StreamEvent::Checkpoint { item } => checkpoints.push(item),
            other => panic!("expected checkpoint event, got {other:?}"),
        }
    }
    assert_eq!(checkpoints, vec![4, 9, 14, 19]);

    handle.finish().await;
}

#[tokio::test]
async fn test_flush_releases_without_checkpoint_notification() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|_| false));

    for i in 1..=3 {
        handle.ingest(i).await.unwrap();
    }
    handle.flush().await.unwrap();

    for i in 1..=3 {
        assert_eq!(out_rx.recv().await, Some(i));
    }
    assert_eq!(handle.depth(), 0);
    assert!(events.try_recv().is_err());

    // Idempotent on an empty queue.
    handle.flush().await.unwrap();

    handle.finish().await;
}

/// Sink that accepts one item per semaphore permit.
struct GatedSink {
    permits: Arc<Semaphore>,
    delivered: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl ItemSink<u32> for GatedSink {
    async fn deliver(&mut self, item: u32) -> Result<(), StreamError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StreamError::Downstream("gate closed".to_string()))?;
        permit.forget();
        self.delivered.lock().unwrap().push(item);
        Ok(())
    }

    async fn close(&mut self) {}
}

#[tokio::test]
async fn test_flush_ack_waits_for_downstream_acceptance() {
    let permits = Arc::new(Semaphore::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = GatedSink {
        permits: Arc::clone(&permits),
        delivered: Arc::clone(&delivered),
    };
    let (handle, _events) =
        CheckpointStreamHandle::spawn(CheckpointConfig::new(|_: &u32| false), Box::new(sink));

    handle.ingest(1).await.unwrap();
    handle.ingest(2).await.unwrap();

    let flusher = handle.clone();
    let flush_task = tokio::spawn(async move { flusher.flush().await });

    // The sink has not accepted anything yet, so the ack must still be
    // pending.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!flush_task.is_finished());

    permits.add_permits(2);
    flush_task.await.unwrap().unwrap();
    assert_eq!(*delivered.lock().unwrap(), vec![1, 2]);

    permits.add_permits(16);
    handle.finish().await;
}

#[tokio::test]
async fn test_reset_discards_without_emission() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|_| false));

    for i in 1..=3 {
        handle.ingest(i).await.unwrap();
    }
    eventually(|| handle.depth() == 3).await;

    handle.reset().await.unwrap();
    eventually(|| handle.depth() == 0).await;

    handle.finish().await;
    assert!(matches!(events.recv().await, Some(StreamEvent::Finished)));
    // The discarded items never reach downstream.
    assert_eq!(out_rx.recv().await, None);
    assert_eq!(handle.metrics().discarded, 3);
}

#[tokio::test]
async fn test_failure_drains_queue_before_error() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|_| false));

    for i in 1..=3 {
        handle.ingest(i).await.unwrap();
    }
    handle.abort("disk offline").await;

    // All buffered items arrive downstream before the failure surfaces.
    for i in 1..=3 {
        assert_eq!(out_rx.recv().await, Some(i));
    }
    assert_eq!(out_rx.recv().await, None);

    match events.recv().await.unwrap() {
        StreamEvent::Failed { error } => {
            assert!(matches!(error, StreamError::Aborted { .. }));
            // The caller's error object is surfaced unchanged.
            assert_eq!(error.source().unwrap().to_string(), "disk offline");
        }
        other => panic!("expected failure event, got {other:?}"),
    }

    // Terminal: no further commands are accepted.
    assert!(matches!(handle.ingest(4).await, Err(StreamError::Closed)));
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_end_of_input_drains_remaining_items() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|_| false));

    handle.ingest(7).await.unwrap();
    handle.ingest(8).await.unwrap();
    handle.finish().await;

    assert_eq!(out_rx.recv().await, Some(7));
    assert_eq!(out_rx.recv().await, Some(8));
    assert_eq!(out_rx.recv().await, None);
    assert!(matches!(events.recv().await, Some(StreamEvent::Finished)));
}

#[tokio::test]
async fn test_dropping_all_handles_acts_as_end_of_input() {
    let (handle, mut out_rx, mut events) =
        spawn_over_channel(CheckpointConfig::new(|_| false));

    handle.ingest(1).await.unwrap();
    handle.ingest(2).await.unwrap();
    drop(handle);

    assert_eq!(out_rx.recv().await, Some(1));
    assert_eq!(out_rx.recv().await, Some(2));
    assert_eq!(out_rx.recv().await, None);
    assert!(matches!(events.recv().await, Some(StreamEvent::Finished)));
}

#[tokio::test]
async fn test_predicate_panic_is_fatal_after_drain() {
    let (handle, mut out_rx, mut events) = spawn_over_channel(CheckpointConfig::new(|item| {
        assert!(*item != 7, "poison item");
        false
    }));

    handle.ingest(1).await.unwrap();
    handle.ingest(2).await.unwrap();
    handle.ingest(7).await.unwrap();

    // The poison item was appended before the predicate ran, so it is
    // drained along with the earlier items.
    assert_eq!(out_rx.recv().await, Some(1));
    assert_eq!(out_rx.recv().await, Some(2));
    assert_eq!(out_rx.recv().await, Some(7));
    assert_eq!(out_rx.recv().await, None);

    match events.recv().await.unwrap() {
        StreamEvent::Failed { error } => {
            assert!(matches!(error, StreamError::Predicate(_)));
            assert!(error.to_string().contains("poison item"));
        }
        other => panic!("expected failure event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_downstream_rejection_is_fatal() {
    let (out_tx, out_rx) = mpsc::channel(4);
    drop(out_rx);
    let (handle, mut events) = CheckpointStreamHandle::spawn(
        CheckpointConfig::new(|item: &u32| *item == 99),
        Box::new(ChannelSink::new(out_tx)),
    );

    // The checkpoint release hits a dead receiver.
    handle.ingest(99).await.unwrap();

    match events.recv().await.unwrap() {
        StreamEvent::Failed { error } => {
            assert!(matches!(error, StreamError::Downstream(_)));
        }
        other => panic!("expected failure event, got {other:?}"),
    }
    eventually(|| handle.is_closed()).await;
}

#[tokio::test]
async fn test_metrics_counters() {
    let config = CheckpointConfig::builder()
        .is_checkpoint(|item: &u32| *item == 9)
        .max_queued(2)
        .build()
        .unwrap();
    let (handle, mut out_rx, _events) = spawn_over_channel(config);

    handle.ingest(9).await.unwrap(); // checkpoint release, 1 item
    handle.ingest(1).await.unwrap();
    handle.ingest(2).await.unwrap();
    handle.ingest(3).await.unwrap(); // overflow release, 3 items
    handle.ingest(4).await.unwrap();
    handle.flush().await.unwrap(); // manual flush, 1 item
    handle.ingest(5).await.unwrap();
    handle.reset().await.unwrap(); // discards 1 item
    handle.finish().await;

    let snapshot = handle.metrics();
    assert_eq!(snapshot.released, 5);
    assert_eq!(snapshot.checkpoints, 1);
    assert_eq!(snapshot.overflows, 1);
    assert_eq!(snapshot.flushes, 1);
    assert_eq!(snapshot.discarded, 1);
    assert_eq!(snapshot.depth, 0);

    // Drain the output so the channel assertions above stay honest.
    let mut seen = Vec::new();
    while let Some(item) = out_rx.recv().await {
        seen.push(item);
    }
    assert_eq!(seen, vec![9, 1, 2, 3, 4]);
}
