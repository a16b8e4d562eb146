//! End to end tests of the batching pipeline against a scripted chain.

mod common;

use batch_relay::{
    batcher::{BatchOutcome, Batcher, FlushTrigger},
    events::{EventRecord, TypedOutcome},
    store::CoordinationStore,
    types::Category,
};
use common::{MockChainClient, announcement, config};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

#[tokio::test]
async fn size_trigger_flushes_a_combined_batch() {
    let chain = Arc::new(MockChainClient::new(40, 1_000));
    let config = config().with_max_batch_size(3);
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config);

    for n in 0..3 {
        batcher.process(announcement(Category::Broadcast, n)).await;
    }

    let completion = completions.recv().await.unwrap();
    assert_eq!(completion.category, Category::Broadcast);
    assert_eq!(completion.item_count, 3);
    assert!(matches!(completion.outcome, BatchOutcome::Success { .. }));

    let submissions = chain.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1, "one combined extrinsic for the whole batch");

    let (call, nonce) = &submissions[0];
    assert_eq!(*nonce, 40);
    assert_eq!(call.pallet, "messages");
    assert_eq!(call.call, "publish_batch");
    let messages = call.params["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    // Arrival order survives into the extrinsic.
    let order: Vec<u64> = messages.iter().map(|m| m["user_id"].as_u64().unwrap()).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[tokio::test]
async fn back_to_back_appends_never_overfill_a_batch() {
    let chain = Arc::new(MockChainClient::new(0, 1_000));
    let config = config().with_max_batch_size(2);
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config);

    // Appends outpace submission: the full batch must be swapped out before
    // the next append lands, not when the background pipeline gets around to
    // it.
    for n in 0..5 {
        batcher.process(announcement(Category::Broadcast, n)).await;
    }

    let first = completions.recv().await.unwrap();
    let second = completions.recv().await.unwrap();
    assert_eq!(first.item_count, 2);
    assert_eq!(second.item_count, 2);

    // The straggler is still live and flushes on its own.
    batcher.flush(Category::Broadcast, FlushTrigger::Timer).await;
    let third = completions.recv().await.unwrap();
    assert_eq!(third.item_count, 1);

    for (call, _) in chain.submissions.lock().unwrap().iter() {
        assert!(call.params["messages"].as_array().unwrap().len() <= 2);
    }
}

#[tokio::test]
async fn concurrent_triggers_flush_exactly_once() {
    let chain = Arc::new(MockChainClient::new(0, 1_000));
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config());

    for n in 0..3 {
        batcher.process(announcement(Category::Profile, n)).await;
    }

    // A size-threshold race and a timer fire land at the same moment; the
    // loser of the swap sees an empty batch and no-ops.
    tokio::join!(
        batcher.flush(Category::Profile, FlushTrigger::Size),
        batcher.flush(Category::Profile, FlushTrigger::Timer),
    );

    let completion = completions.recv().await.unwrap();
    assert_eq!(completion.item_count, 3);
    assert!(completions.try_recv().is_err(), "the racing trigger produced a second flush");
    assert_eq!(chain.submissions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn categories_batch_independently() {
    let chain = Arc::new(MockChainClient::new(0, 1_000));
    let config = config().with_max_batch_size(2);
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config);

    batcher.process(announcement(Category::Broadcast, 1)).await;
    batcher.process(announcement(Category::Reply, 2)).await;
    // Neither category reached its own threshold yet.
    assert!(completions.try_recv().is_err());

    batcher.process(announcement(Category::Reply, 3)).await;
    let completion = completions.recv().await.unwrap();
    assert_eq!(completion.category, Category::Reply);
    assert_eq!(completion.item_count, 2);
    assert!(completions.try_recv().is_err(), "broadcast batch still accumulating");
}

#[tokio::test(start_paused = true)]
async fn age_timer_flushes_a_partial_batch() {
    let chain = Arc::new(MockChainClient::new(7, 1_000));
    let config = config().with_max_batch_size(100).with_max_batch_age(Duration::from_secs(2));
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config);
    batcher.arm_batch_timer(Category::Reaction);

    for n in 0..3 {
        batcher.process(announcement(Category::Reaction, n)).await;
    }

    // Not before the deadline.
    assert!(timeout(Duration::from_millis(1_900), completions.recv()).await.is_err());

    let completion = completions.recv().await.unwrap();
    assert_eq!(completion.category, Category::Reaction);
    assert_eq!(completion.item_count, 3);
    assert_eq!(chain.submitted_nonces(), vec![7]);
}

#[tokio::test(start_paused = true)]
async fn empty_timer_fire_is_a_no_op() {
    let chain = Arc::new(MockChainClient::new(0, 1_000));
    let config = config().with_max_batch_size(100).with_max_batch_age(Duration::from_secs(2));
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config);
    batcher.arm_batch_timer(Category::Update);

    // Several timer periods pass with nothing queued.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(completions.try_recv().is_err());
    assert!(chain.submissions.lock().unwrap().is_empty());

    // The timer keeps running and picks up later arrivals.
    batcher.process(announcement(Category::Update, 1)).await;
    let completion = completions.recv().await.unwrap();
    assert_eq!(completion.item_count, 1);
}

#[tokio::test]
async fn manual_flush_of_empty_category_produces_nothing() {
    let chain = Arc::new(MockChainClient::new(0, 1_000));
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config());

    batcher.flush(Category::Profile, FlushTrigger::Timer).await;
    assert!(completions.try_recv().is_err());
    assert!(chain.submissions.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn capacity_rejection_fails_batch_without_consuming_a_lease() {
    let chain = Arc::new(MockChainClient::new(10, 0));
    let mut config = config().with_max_batch_size(2);
    config.capacity.retry_limit = 1;
    config.capacity.retry_backoff = Duration::from_millis(10);
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config);

    batcher.process(announcement(Category::Broadcast, 1)).await;
    batcher.process(announcement(Category::Broadcast, 2)).await;

    let completion = completions.recv().await.unwrap();
    let BatchOutcome::Failure { items, .. } = completion.outcome else {
        panic!("expected a terminal failure");
    };
    assert_eq!(items.len(), 2, "failed items ride along for dead-lettering");
    assert!(chain.submissions.lock().unwrap().is_empty(), "nothing reached the chain");

    // Capacity replenishes; the next flush gets the first slot of the window,
    // proving the rejected one never held a lease.
    chain.set_remaining_capacity(1_000);
    batcher.process(announcement(Category::Broadcast, 3)).await;
    batcher.process(announcement(Category::Broadcast, 4)).await;

    let completion = completions.recv().await.unwrap();
    assert!(matches!(completion.outcome, BatchOutcome::Success { .. }));
    assert_eq!(chain.submitted_nonces(), vec![10]);
}

#[tokio::test]
async fn definitive_rejection_reopens_the_nonce_slot() {
    let chain = Arc::new(MockChainClient::new(25, 1_000));
    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config().with_max_batch_size(1));

    chain.reject_submissions.store(true, std::sync::atomic::Ordering::SeqCst);
    batcher.process(announcement(Category::Tombstone, 1)).await;
    let completion = completions.recv().await.unwrap();
    assert!(matches!(completion.outcome, BatchOutcome::Failure { .. }));

    chain.reject_submissions.store(false, std::sync::atomic::Ordering::SeqCst);
    batcher.process(announcement(Category::Tombstone, 2)).await;
    let completion = completions.recv().await.unwrap();
    assert!(matches!(completion.outcome, BatchOutcome::Success { .. }));

    // The rejected attempt released its lease, so both used the same slot.
    assert_eq!(chain.submitted_nonces(), vec![25, 25]);
}

#[tokio::test]
async fn inclusion_events_surface_as_typed_outcomes() {
    let chain = Arc::new(MockChainClient::new(0, 1_000));
    chain.events.lock().unwrap().extend([
        EventRecord::new(
            "messages",
            "MessagesStored",
            json!({ "schemaId": 5, "count": 1 }),
        ),
        EventRecord::new("balances", "Withdraw", json!({ "amount": 12 })),
    ]);

    let (batcher, mut completions) =
        Batcher::new(Arc::clone(&chain), CoordinationStore::in_memory(), config().with_max_batch_size(1));
    batcher.process(announcement(Category::Broadcast, 1)).await;

    let completion = completions.recv().await.unwrap();
    let BatchOutcome::Success { outcomes } = completion.outcome else {
        panic!("expected success");
    };
    assert_eq!(outcomes, vec![TypedOutcome::MessagesStored { schema_id: 5, count: 1 }]);
}
