//! Concurrency and failure-path tests
//!
//! The reservation conditional-create is the only linearization point; these
//! tests hammer it from parallel tasks and verify the failure mapping when
//! the coordination store misbehaves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callerid_engine::coordination::{
    CoordinationError, CoordinationResult, CoordinationStore, DeleteOutcome, SetOutcome,
};
use callerid_engine::prelude::*;

async fn api_with(config: AllocatorConfig) -> CallerIdApi {
    CallerIdApi::in_memory(config).await.expect("API creation failed")
}

async fn seed(api: &CallerIdApi, number: &str) {
    api.add_caller_id(AddCallerIdRequest {
        caller_id: number.to_string(),
        hourly_cap: Some(1000),
        daily_cap: Some(5000),
        ..Default::default()
    })
    .await
    .expect("seeding caller ID failed");
}

fn request(agent: &str) -> AllocationRequest {
    AllocationRequest {
        destination: "2125551234".to_string(),
        campaign: "c".to_string(),
        agent: agent.to_string(),
    }
}

#[tokio::test]
async fn two_contenders_one_number_exactly_one_wins() {
    let api = api_with(AllocatorConfig::default()).await;
    seed(&api, "2125550001").await;

    let req_a = request("a1");
    let req_b = request("a2");
    let (a, b) = tokio::join!(api.allocate(&req_a), api.allocate(&req_b));

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one contender should win");

    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(AllocationError::NoneAvailable)));
}

#[tokio::test]
async fn concurrent_winners_never_share_a_number() {
    let api = api_with(AllocatorConfig::default()).await;
    let numbers = [
        "2125550001",
        "2125550002",
        "2125550003",
        "2125550004",
        "2125550005",
    ];
    for number in numbers {
        seed(&api, number).await;
    }

    let mut handles = Vec::new();
    for i in 0..20 {
        let api = api.clone();
        let agent = format!("agent{}", i);
        handles.push(tokio::spawn(async move {
            api.allocate(&request(&agent)).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(allocation) => winners.push(allocation.caller_id),
            Err(AllocationError::NoneAvailable) => {}
            Err(other) => panic!("Unexpected error under contention: {:?}", other),
        }
    }

    // Every number is handed out exactly once
    winners.sort();
    let mut expected: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
    expected.sort();
    assert_eq!(winners, expected);
}

#[tokio::test]
async fn released_numbers_are_rewon_by_later_contenders() {
    let api = api_with(AllocatorConfig::default()).await;
    seed(&api, "2125550001").await;

    for round in 0..5 {
        let agent = format!("agent{}", round);
        let allocation = api.allocate(&request(&agent)).await.unwrap();
        assert_eq!(allocation.caller_id, "2125550001");
        assert!(api.release("2125550001", Some(&agent)).await.unwrap().released);
    }
}

/// Coordination store that fails every call at the transport level
struct UnreachableStore;

#[async_trait]
impl CoordinationStore for UnreachableStore {
    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> CoordinationResult<SetOutcome> {
        Err(CoordinationError::Transport("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> CoordinationResult<Option<String>> {
        Err(CoordinationError::Transport("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> CoordinationResult<DeleteOutcome> {
        Err(CoordinationError::Transport("connection refused".into()))
    }

    async fn increment_with_ttl(
        &self,
        _key: &str,
        _ttl_if_new: Duration,
    ) -> CoordinationResult<i64> {
        Err(CoordinationError::Transport("connection refused".into()))
    }

    async fn decrement(&self, _key: &str) -> CoordinationResult<i64> {
        Err(CoordinationError::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn transport_failures_surface_as_unavailable() {
    let pool = PoolDatabase::in_memory().await.unwrap();
    let engine = AllocationEngine::new(
        pool,
        Arc::new(UnreachableStore),
        AllocatorConfig::default(),
    );

    let err = engine
        .allocate(&AllocationRequest {
            destination: "2125551234".to_string(),
            campaign: "c".to_string(),
            agent: "a".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unavailable(_)));
    assert_eq!(err.kind(), "unavailable");

    let err = engine.lookup_reservation("2125550001").await.unwrap_err();
    assert!(matches!(err, AllocationError::Unavailable(_)));
}

/// Wraps the in-memory store, delaying counter increments long enough for a
/// request deadline to fire between taking and confirming a reservation
struct SlowCounterStore {
    inner: Arc<MemoryCoordinationStore>,
    delay: Duration,
}

#[async_trait]
impl CoordinationStore for SlowCounterStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CoordinationResult<SetOutcome> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> CoordinationResult<DeleteOutcome> {
        self.inner.delete(key).await
    }

    async fn increment_with_ttl(&self, key: &str, ttl_if_new: Duration) -> CoordinationResult<i64> {
        if key.starts_with("usage:") {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.increment_with_ttl(key, ttl_if_new).await
    }

    async fn decrement(&self, key: &str) -> CoordinationResult<i64> {
        self.inner.decrement(key).await
    }
}

#[tokio::test]
async fn deadline_expiry_frees_the_half_taken_reservation() {
    let inner = Arc::new(MemoryCoordinationStore::new());
    let store = SlowCounterStore {
        inner: Arc::clone(&inner),
        delay: Duration::from_millis(200),
    };
    let pool = PoolDatabase::in_memory().await.unwrap();
    let config = AllocatorConfig {
        request_deadline_ms: 50,
        ..AllocatorConfig::default()
    };
    let engine = AllocationEngine::new(pool, Arc::new(store), config);

    engine
        .pool()
        .insert_caller_id(&callerid_engine::database::CallerId {
            caller_id: "2125550001".to_string(),
            carrier: None,
            area_code: Some("212".to_string()),
            hourly_cap: 100,
            daily_cap: 500,
            last_used: None,
            total_uses: 0,
            is_active: true,
            metadata: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let err = engine
        .allocate(&AllocationRequest {
            destination: "2125551234".to_string(),
            campaign: "c".to_string(),
            agent: "a".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unavailable(_)));

    // The deadline fired while the reservation was held for the cap check;
    // the engine must have freed it on the way out
    assert!(inner
        .get("reservation:2125550001")
        .await
        .unwrap()
        .is_none());
}
