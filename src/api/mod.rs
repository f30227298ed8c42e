//! Public API module
//!
//! A thin facade over the allocation engine for transports and operational
//! tooling: the allocation surface the dialer calls, plus the admin surface
//! for managing the pool. Transports serialize the request/response types
//! as-is; error kinds are stable strings from
//! [`AllocationError::kind`](crate::error::AllocationError::kind).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocator::{Allocation, AllocationEngine, AllocationRequest, ReservationPayload};
use crate::config::AllocatorConfig;
use crate::coordination::MemoryCoordinationStore;
use crate::database::{CallerId, PoolDatabase};
use crate::error::{AllocationError, Result};
use crate::phone;

/// Request to add a caller ID to the pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddCallerIdRequest {
    pub caller_id: String,
    pub carrier: Option<String>,
    /// Derived from the number when absent
    pub area_code: Option<String>,
    /// Falls back to the configured default when absent
    pub hourly_cap: Option<i64>,
    /// Falls back to the configured default when absent
    pub daily_cap: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Request to update an existing caller ID; absent fields are unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCallerIdRequest {
    pub caller_id: String,
    pub carrier: Option<String>,
    pub area_code: Option<String>,
    pub hourly_cap: Option<i64>,
    pub daily_cap: Option<i64>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

/// Pool entry as exposed to tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdView {
    pub caller_id: String,
    pub carrier: Option<String>,
    pub area_code: Option<String>,
    pub hourly_cap: i64,
    pub daily_cap: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub total_uses: i64,
    pub is_active: bool,
    pub metadata: Option<serde_json::Value>,
}

impl From<CallerId> for CallerIdView {
    fn from(caller: CallerId) -> Self {
        let metadata = caller
            .metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self {
            caller_id: caller.caller_id,
            carrier: caller.carrier,
            area_code: caller.area_code,
            hourly_cap: caller.hourly_cap,
            daily_cap: caller.daily_cap,
            last_used: caller.last_used,
            total_uses: caller.total_uses,
            is_active: caller.is_active,
            metadata,
        }
    }
}

/// Response to a release call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub caller_id: String,
    pub released: bool,
}

/// Caller-ID allocation API
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use callerid_engine::prelude::*;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = PoolDatabase::open("callerid.db").await?;
/// let coordination = Arc::new(MemoryCoordinationStore::new());
/// let engine = Arc::new(AllocationEngine::new(
///     pool,
///     coordination,
///     AllocatorConfig::from_env(),
/// ));
/// let api = CallerIdApi::new(engine);
///
/// let allocation = api
///     .allocate(&AllocationRequest {
///         destination: "2125551234".into(),
///         campaign: "spring".into(),
///         agent: "agent42".into(),
///     })
///     .await?;
/// println!("Dial from {}", allocation.caller_id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CallerIdApi {
    engine: Arc<AllocationEngine>,
}

impl CallerIdApi {
    /// Create a new API facade over the given engine
    pub fn new(engine: Arc<AllocationEngine>) -> Self {
        Self { engine }
    }

    /// Convenience constructor wiring an in-memory pool database and
    /// coordination store; used by tests and demos
    pub async fn in_memory(config: AllocatorConfig) -> anyhow::Result<Self> {
        let pool = PoolDatabase::in_memory().await?;
        let coordination = Arc::new(MemoryCoordinationStore::new());
        Ok(Self::new(Arc::new(AllocationEngine::new(
            pool,
            coordination,
            config,
        ))))
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<AllocationEngine> {
        &self.engine
    }

    /// Allocate a caller ID for one outbound call
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
        self.engine.allocate(request).await
    }

    /// Release a reservation ahead of its TTL; idempotent
    pub async fn release(&self, caller_id: &str, agent_hint: Option<&str>) -> Result<ReleaseResponse> {
        let released = self.engine.release(caller_id, agent_hint).await?;
        Ok(ReleaseResponse {
            caller_id: phone::sanitize_number(caller_id),
            released,
        })
    }

    /// Fetch the live reservation for a caller ID, if any
    pub async fn lookup_reservation(&self, caller_id: &str) -> Result<Option<ReservationPayload>> {
        self.engine.lookup_reservation(caller_id).await
    }

    // ------------------------------------------------------------------
    // Admin surface: owns every pool write except last_used
    // ------------------------------------------------------------------

    /// Add a caller ID to the rotation pool
    pub async fn add_caller_id(&self, request: AddCallerIdRequest) -> Result<CallerIdView> {
        let number = phone::normalize_caller_id(&request.caller_id)?;

        let config = self.engine.config();
        let hourly_cap = request.hourly_cap.unwrap_or(config.default_hourly_cap);
        let daily_cap = request.daily_cap.unwrap_or(config.default_daily_cap);
        if hourly_cap < 0 || daily_cap < 0 {
            return Err(AllocationError::invalid_input("caps must be non-negative"));
        }
        if hourly_cap > daily_cap {
            return Err(AllocationError::invalid_input(
                "hourly cap must not exceed daily cap",
            ));
        }

        let pool = self.engine.pool();
        if pool
            .get_caller_id(&number)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?
            .is_some()
        {
            return Err(AllocationError::conflict(format!(
                "caller ID {} already exists",
                number
            )));
        }

        let area_code = request
            .area_code
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .or_else(|| phone::extract_area_code(&number));

        let now = Utc::now();
        let caller = CallerId {
            caller_id: number,
            carrier: request.carrier,
            area_code,
            hourly_cap,
            daily_cap,
            last_used: None,
            total_uses: 0,
            is_active: true,
            metadata: request.metadata.map(|m| m.to_string()),
            created_at: now,
            updated_at: now,
        };

        pool.insert_caller_id(&caller)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;

        Ok(caller.into())
    }

    /// Update an existing caller ID; returns the new view, or `None` if the
    /// number is not in the pool
    pub async fn update_caller_id(
        &self,
        request: UpdateCallerIdRequest,
    ) -> Result<Option<CallerIdView>> {
        let number = phone::normalize_caller_id(&request.caller_id)?;
        let pool = self.engine.pool();

        let Some(mut caller) = pool
            .get_caller_id(&number)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?
        else {
            return Ok(None);
        };

        if let Some(carrier) = request.carrier {
            caller.carrier = Some(carrier);
        }
        if let Some(area_code) = request.area_code {
            caller.area_code = Some(area_code);
        }
        if let Some(hourly_cap) = request.hourly_cap {
            caller.hourly_cap = hourly_cap;
        }
        if let Some(daily_cap) = request.daily_cap {
            caller.daily_cap = daily_cap;
        }
        if let Some(active) = request.is_active {
            caller.is_active = active;
        }
        if let Some(metadata) = request.metadata {
            caller.metadata = Some(metadata.to_string());
        }

        if caller.hourly_cap < 0 || caller.daily_cap < 0 {
            return Err(AllocationError::invalid_input("caps must be non-negative"));
        }
        if caller.hourly_cap > caller.daily_cap {
            return Err(AllocationError::invalid_input(
                "hourly cap must not exceed daily cap",
            ));
        }

        pool.update_caller_id(&caller)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;

        Ok(Some(caller.into()))
    }

    /// Toggle the active flag; returns whether the number existed
    pub async fn set_caller_id_active(&self, caller_id: &str, active: bool) -> Result<bool> {
        let number = phone::normalize_caller_id(caller_id)?;
        let updated = self
            .engine
            .pool()
            .set_active(&number, active)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;
        Ok(updated > 0)
    }

    /// Physically remove a caller ID; returns whether a row was deleted
    pub async fn remove_caller_id(&self, caller_id: &str) -> Result<bool> {
        let number = phone::normalize_caller_id(caller_id)?;
        let removed = self
            .engine
            .pool()
            .remove_caller_id(&number)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;
        Ok(removed > 0)
    }

    /// Fetch one pool entry
    pub async fn get_caller_id(&self, caller_id: &str) -> Result<Option<CallerIdView>> {
        let number = phone::normalize_caller_id(caller_id)?;
        let caller = self
            .engine
            .pool()
            .get_caller_id(&number)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;
        Ok(caller.map(Into::into))
    }

    /// List the whole pool
    pub async fn list_caller_ids(&self) -> Result<Vec<CallerIdView>> {
        let callers = self
            .engine
            .pool()
            .list_caller_ids()
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;
        Ok(callers.into_iter().map(Into::into).collect())
    }
}
