//! Caller-ID allocation engine for outbound dialers.
//!
//! This crate picks the originating number for each outbound call from a
//! managed pool: least-recently-used rotation so no number gets overused,
//! area-code matching against the destination to improve answer rates,
//! per-number hourly/daily caps, a per-agent request rate limit, and an
//! exclusive short-lived reservation so two concurrent requests never get
//! the same number.
//!
//! Three layers compose the engine: the persistent pool store (the caller-ID
//! catalog and long-term usage fields), the ephemeral coordination store
//! (reservation locks and sliding counters, all single-key atomics with
//! TTLs), and the allocator that consults both and emits either an
//! allocation or a typed failure.

pub mod allocator;
pub mod api;
pub mod config;
pub mod coordination;
pub mod database;
pub mod error;
pub mod phone;

pub use allocator::AllocationEngine;
pub use api::CallerIdApi;
pub use config::AllocatorConfig;
pub use error::{AllocationError, Result};

/// Re-export of the types most applications need
pub mod prelude {
    pub use crate::allocator::{
        Allocation, AllocationEngine, AllocationRequest, ReservationPayload,
    };
    pub use crate::api::{
        AddCallerIdRequest, CallerIdApi, CallerIdView, ReleaseResponse, UpdateCallerIdRequest,
    };
    pub use crate::config::AllocatorConfig;
    pub use crate::coordination::{CoordinationStore, MemoryCoordinationStore};
    pub use crate::database::{AllocationRecord, PoolDatabase};
    pub use crate::error::{AllocationError, Result};
}
