//! Nonce lease coordination tests.

mod common;

use batch_relay::{
    error::LeaseError,
    nonce::NonceAllocator,
    store::CoordinationStore,
};
use common::{MockChainClient, account};
use std::{collections::HashSet, sync::Arc, time::Duration};

fn allocator(
    chain: &Arc<MockChainClient>,
    store: &CoordinationStore,
    window: u64,
    ttl: Duration,
) -> NonceAllocator<MockChainClient> {
    NonceAllocator::new(Arc::clone(chain), store.clone(), account(), window, ttl)
}

#[tokio::test]
async fn concurrent_leases_are_collision_free() {
    let chain = Arc::new(MockChainClient::new(100, 0));
    let store = CoordinationStore::in_memory();
    let allocator = Arc::new(allocator(&chain, &store, 12, Duration::from_secs(60)));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let allocator = Arc::clone(&allocator);
        tasks.push(tokio::spawn(async move { allocator.lease().await }));
    }

    let mut values = HashSet::new();
    for task in tasks {
        let lease = task.await.unwrap().unwrap();
        assert!(values.insert(lease.value()), "duplicate nonce {}", lease.value());
    }

    // All ten fall inside the lookahead window above the chain nonce.
    assert!(values.iter().all(|v| (100..112).contains(v)));
}

#[tokio::test]
async fn exhausted_window_is_an_error_not_a_guess() {
    let chain = Arc::new(MockChainClient::new(0, 0));
    let store = CoordinationStore::in_memory();
    let allocator = allocator(&chain, &store, 2, Duration::from_secs(60));

    let first = allocator.lease().await.unwrap();
    let second = allocator.lease().await.unwrap();
    assert_eq!((first.value(), second.value()), (0, 1));

    // No free slot left: the caller gets backpressure, never a value past the
    // window.
    match allocator.lease().await {
        Err(LeaseError::Exhausted { window }) => assert_eq!(window, 2),
        other => panic!("expected an exhausted window, got {other:?}"),
    }
}

#[tokio::test]
async fn release_reopens_the_lowest_slot() {
    let chain = Arc::new(MockChainClient::new(5, 0));
    let store = CoordinationStore::in_memory();
    let allocator = allocator(&chain, &store, 4, Duration::from_secs(60));

    let first = allocator.lease().await.unwrap();
    let _second = allocator.lease().await.unwrap();
    assert_eq!(first.value(), 5);

    first.release().await.unwrap();
    let reclaimed = allocator.lease().await.unwrap();
    assert_eq!(reclaimed.value(), 5, "lease scan restarts from the chain nonce");
}

#[tokio::test]
async fn expired_leases_no_longer_block_the_window() {
    let chain = Arc::new(MockChainClient::new(0, 0));
    let store = CoordinationStore::in_memory();
    let allocator = allocator(&chain, &store, 1, Duration::from_millis(50));

    let stale = allocator.lease().await.unwrap();
    assert!(matches!(allocator.lease().await, Err(LeaseError::Exhausted { .. })));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(stale.is_expired());

    // The crashed-holder scenario: nobody released, the TTL did.
    let recovered = allocator.lease().await.unwrap();
    assert_eq!(recovered.value(), 0);
}

#[tokio::test]
async fn window_tracks_the_advancing_chain_nonce() {
    let chain = Arc::new(MockChainClient::new(30, 0));
    let store = CoordinationStore::in_memory();
    let allocator = allocator(&chain, &store, 3, Duration::from_secs(60));

    assert_eq!(allocator.lease().await.unwrap().value(), 30);

    // The chain counter advances after an inclusion; the window shifts with it
    // on the next call.
    chain.chain_nonce.store(31, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(allocator.lease().await.unwrap().value(), 31);
}
