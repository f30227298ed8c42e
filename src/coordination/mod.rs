//! Coordination store port
//!
//! The ephemeral shared key-value store holding reservation locks, sliding
//! usage counters, and agent rate counters. All semantics the allocator
//! relies on come from single-key atomic primitives; there are no
//! multi-key transactions and no locks.
//!
//! Transport failures are surfaced as [`CoordinationError`] so the caller
//! can distinguish "key exists" from "store unreachable".

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod keys;
mod memory;

pub use memory::MemoryCoordinationStore;

/// Coordination store failures
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Transient transport failure (timeout, connection loss)
    #[error("Coordination transport error: {0}")]
    Transport(String),

    /// A counter key holds a value that is not an integer
    #[error("Corrupt counter value at {key}: {value}")]
    CorruptCounter { key: String, value: String },
}

/// Result type for coordination store operations
pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// Outcome of a conditional create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key did not exist and was created
    Created,
    /// A live key was already present; nothing was written
    Exists,
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A live key was removed
    Deleted,
    /// No live key was present
    Absent,
}

/// Single-key atomic primitives required by the allocator.
///
/// Every operation is atomic with respect to its key. Implementations must
/// expire keys at their TTL; an expired key behaves exactly like an absent
/// one.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create the key only if no live key exists
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CoordinationResult<SetOutcome>;

    /// Fetch the value of a live key
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>>;

    /// Remove the key
    async fn delete(&self, key: &str) -> CoordinationResult<DeleteOutcome>;

    /// Atomically increment an integer key, setting the TTL only when the
    /// key is newly created. Returns the post-increment value.
    async fn increment_with_ttl(&self, key: &str, ttl_if_new: Duration) -> CoordinationResult<i64>;

    /// Atomically decrement an integer key, saturating at zero. Used only
    /// as best-effort compensation after a cap violation; the key's TTL is
    /// left untouched. Returns the post-decrement value.
    async fn decrement(&self, key: &str) -> CoordinationResult<i64>;
}
