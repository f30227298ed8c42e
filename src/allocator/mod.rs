//! Caller-ID allocation engine
//!
//! Converts an allocation request into an exclusive short-lived claim on one
//! caller ID from the pool. Selection prefers numbers whose area code
//! matches the destination, rotates least-recently-used first, and enforces
//! per-number hourly/daily caps plus a per-agent request rate limit.
//!
//! As seen by the allocator, each caller ID moves through four states:
//! free (no reservation, under caps), reserved (live reservation key),
//! capped (reservation was briefly taken, a cap tripped, the key was
//! released; the number is skipped until the bucket rolls over), and
//! inactive (invisible to candidate queries entirely).
//!
//! The only cross-process linearization point is the conditional create of
//! the reservation key. Counters are commutative increments and `last_used`
//! is a convergent scalar, so neither needs locking.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AllocatorConfig;
use crate::coordination::{keys, CoordinationStore, DeleteOutcome, SetOutcome};
use crate::database::{AllocationRecord, CallerId, PoolDatabase};
use crate::error::{AllocationError, Result};
use crate::phone;

/// TTL for hourly usage buckets: bucket width plus grace
const HOURLY_COUNTER_TTL: Duration = Duration::from_secs(3700);

/// TTL for daily usage buckets: bucket width plus grace
const DAILY_COUNTER_TTL: Duration = Duration::from_secs(90_000);

/// TTL for per-agent minute rate buckets
const RATE_COUNTER_TTL: Duration = Duration::from_secs(60);

/// One allocation request from the dialer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Destination phone number, digits plus optional formatting
    pub destination: String,
    /// Campaign the call belongs to
    pub campaign: String,
    /// Agent placing the call
    pub agent: String,
}

/// A granted allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub caller_id: String,
    pub area_code: Option<String>,
    pub carrier: Option<String>,
    pub ttl_seconds: u64,
    pub expires_at: DateTime<Utc>,
    pub destination: String,
    pub campaign: String,
    pub agent: String,
    pub hourly_cap: i64,
    pub daily_cap: i64,
}

/// Payload stored under the reservation key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationPayload {
    pub caller_id: String,
    pub agent: String,
    pub campaign: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The allocation engine
///
/// Owns capability handles to both stores; constructed once at start-up and
/// shared behind an `Arc`. No request holds an in-process lock across a
/// store call.
pub struct AllocationEngine {
    pool: PoolDatabase,
    coordination: Arc<dyn CoordinationStore>,
    config: AllocatorConfig,
}

impl AllocationEngine {
    /// Create a new allocation engine over the given stores
    pub fn new(
        pool: PoolDatabase,
        coordination: Arc<dyn CoordinationStore>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            pool,
            coordination,
            config,
        }
    }

    /// The pool store handle, for admin tooling
    pub fn pool(&self) -> &PoolDatabase {
        &self.pool
    }

    /// The active configuration
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate a caller ID for one outbound call.
    ///
    /// The whole operation is bounded by the configured request deadline;
    /// on expiry any reservation created but not yet returned is freed
    /// best-effort so the number is not locked for a full TTL.
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
        let started = Instant::now();

        let destination = phone::normalize_destination(&request.destination)?;
        let campaign = request.campaign.trim();
        let agent = request.agent.trim();
        if campaign.is_empty() {
            return Err(AllocationError::invalid_input("campaign must not be empty"));
        }
        if agent.is_empty() {
            return Err(AllocationError::invalid_input("agent must not be empty"));
        }

        let pending_reservation: Mutex<Option<String>> = Mutex::new(None);

        let outcome = tokio::time::timeout(
            self.config.request_deadline(),
            self.allocate_inner(&destination, campaign, agent, started, &pending_reservation),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                let orphan = pending_reservation.lock().unwrap().take();
                if let Some(number) = orphan {
                    debug!("Deadline expired holding a reservation for {}, freeing it", number);
                    if let Err(e) = self
                        .coordination
                        .delete(&keys::reservation_key(&number))
                        .await
                    {
                        warn!("Failed to free orphaned reservation for {}: {}", number, e);
                    }
                }
                Err(AllocationError::unavailable(format!(
                    "request deadline of {}ms exceeded",
                    self.config.request_deadline_ms
                )))
            }
        }
    }

    async fn allocate_inner(
        &self,
        destination: &str,
        campaign: &str,
        agent: &str,
        started: Instant,
        pending: &Mutex<Option<String>>,
    ) -> Result<Allocation> {
        // Phase 1: the rate counter is charged before any candidate scan so
        // scan cost cannot amplify abuse. The increment decays by TTL.
        let now = Utc::now();
        let count = self
            .coordination
            .increment_with_ttl(&keys::agent_rate_key(agent, now), RATE_COUNTER_TTL)
            .await?;
        if count > self.config.agent_rate_limit_per_minute {
            let retry_after_seconds = (60 - u64::from(now.second())).max(1);
            debug!(
                "Agent {} over rate limit ({} > {}/min)",
                agent, count, self.config.agent_rate_limit_per_minute
            );
            return Err(AllocationError::RateLimited {
                agent: agent.to_string(),
                retry_after_seconds,
            });
        }

        // Phase 2+3: tier 1 restricts to the destination's area code, tier 2
        // falls back to the whole pool so availability survives a depleted
        // matching pool.
        let area_code = phone::extract_area_code(destination);
        let limit = self.config.candidate_scan_limit;
        let mut tried: HashSet<String> = HashSet::new();

        if let Some(area) = area_code.as_deref() {
            let tier1 = self
                .pool
                .query_candidates(Some(area), limit)
                .await
                .map_err(|e| AllocationError::unavailable(e.to_string()))?;
            tried.extend(tier1.iter().map(|c| c.caller_id.clone()));

            if let Some(allocation) = self
                .contend(&tier1, destination, campaign, agent, started, pending)
                .await?
            {
                return Ok(allocation);
            }

            if self.config.area_code_strict {
                debug!("Strict area-code mode: no fallback past area {}", area);
                return Err(AllocationError::NoneAvailable);
            }
        }

        let tier2 = self
            .pool
            .query_candidates(None, limit)
            .await
            .map_err(|e| AllocationError::unavailable(e.to_string()))?;
        let fresh: Vec<CallerId> = tier2
            .into_iter()
            .filter(|c| !tried.contains(&c.caller_id))
            .collect();

        if let Some(allocation) = self
            .contend(&fresh, destination, campaign, agent, started, pending)
            .await?
        {
            return Ok(allocation);
        }

        Err(AllocationError::NoneAvailable)
    }

    async fn contend(
        &self,
        candidates: &[CallerId],
        destination: &str,
        campaign: &str,
        agent: &str,
        started: Instant,
        pending: &Mutex<Option<String>>,
    ) -> Result<Option<Allocation>> {
        for candidate in candidates {
            if let Some(allocation) = self
                .try_candidate(candidate, destination, campaign, agent, started, pending)
                .await?
            {
                return Ok(Some(allocation));
            }
        }
        Ok(None)
    }

    /// Contend for one candidate: take the reservation lock, then evaluate
    /// caps. Losing the lock or tripping a cap moves on to the next
    /// candidate; only transport failures surface.
    async fn try_candidate(
        &self,
        candidate: &CallerId,
        destination: &str,
        campaign: &str,
        agent: &str,
        started: Instant,
        pending: &Mutex<Option<String>>,
    ) -> Result<Option<Allocation>> {
        // A cap of zero can never be satisfied
        if candidate.hourly_cap <= 0 || candidate.daily_cap <= 0 {
            return Ok(None);
        }

        // Cooldown window since the last successful allocation
        if self.config.caller_id_cooldown_seconds > 0 {
            if let Some(last_used) = candidate.last_used {
                let idle = Utc::now().signed_duration_since(last_used).num_seconds();
                if idle >= 0 && (idle as u64) < self.config.caller_id_cooldown_seconds {
                    debug!(
                        "Caller ID {} in cooldown ({}s idle), skipping",
                        candidate.caller_id, idle
                    );
                    return Ok(None);
                }
            }
        }

        let now = Utc::now();
        let ttl_seconds = self.config.reservation_ttl_seconds;
        let expires_at = now + chrono::Duration::seconds(ttl_seconds as i64);
        let payload = ReservationPayload {
            caller_id: candidate.caller_id.clone(),
            agent: agent.to_string(),
            campaign: campaign.to_string(),
            destination: destination.to_string(),
            created_at: now,
            expires_at,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| AllocationError::unavailable(format!("reservation encode: {}", e)))?;

        let reservation = keys::reservation_key(&candidate.caller_id);
        match self
            .coordination
            .set_if_absent(&reservation, &body, self.config.reservation_ttl())
            .await?
        {
            SetOutcome::Exists => return Ok(None),
            SetOutcome::Created => {}
        }
        *pending.lock().unwrap() = Some(candidate.caller_id.clone());

        // Cap evaluation happens under the reservation lock, hourly first
        let hour_key = keys::hourly_usage_key(&candidate.caller_id, now);
        let hourly = self
            .coordination
            .increment_with_ttl(&hour_key, HOURLY_COUNTER_TTL)
            .await?;
        if hourly > candidate.hourly_cap {
            self.undo_capped_attempt(&[&hour_key], &reservation, candidate)
                .await;
            pending.lock().unwrap().take();
            return Ok(None);
        }

        let day_key = keys::daily_usage_key(&candidate.caller_id, now);
        let daily = self
            .coordination
            .increment_with_ttl(&day_key, DAILY_COUNTER_TTL)
            .await?;
        if daily > candidate.daily_cap {
            self.undo_capped_attempt(&[&day_key, &hour_key], &reservation, candidate)
                .await;
            pending.lock().unwrap().take();
            return Ok(None);
        }

        // The reservation holds from here on; the LRU write is persistence
        // only and must not fail the allocation
        if let Err(e) = self.pool.update_last_used(&candidate.caller_id, now).await {
            warn!(
                "Failed to persist last_used for {}: {}",
                candidate.caller_id, e
            );
        }

        pending.lock().unwrap().take();

        // Advisory campaign counter; never read back by the allocator
        if let Err(e) = self
            .coordination
            .increment_with_ttl(&keys::campaign_usage_key(campaign, now), DAILY_COUNTER_TTL)
            .await
        {
            debug!("Campaign counter increment failed for {}: {}", campaign, e);
        }

        let latency_ms = started.elapsed().as_millis() as i64;
        let record = AllocationRecord {
            ts: now,
            caller_id: candidate.caller_id.clone(),
            destination: destination.to_string(),
            campaign: campaign.to_string(),
            agent: agent.to_string(),
            latency_ms,
            outcome: "allocated".to_string(),
        };
        if let Err(e) = self.pool.record_allocation(&record).await {
            debug!(
                "Allocation history write failed for {}: {}",
                candidate.caller_id, e
            );
        }

        info!(
            "📞 Allocated caller ID {} to agent {} (campaign {}, destination {}, ttl {}s)",
            candidate.caller_id, agent, campaign, destination, ttl_seconds
        );

        Ok(Some(Allocation {
            caller_id: candidate.caller_id.clone(),
            area_code: candidate.area_code.clone(),
            carrier: candidate.carrier.clone(),
            ttl_seconds,
            expires_at,
            destination: destination.to_string(),
            campaign: campaign.to_string(),
            agent: agent.to_string(),
            hourly_cap: candidate.hourly_cap,
            daily_cap: candidate.daily_cap,
        }))
    }

    /// Best-effort compensation after a cap violation: decrement the
    /// counters this attempt charged and release the reservation. Failures
    /// here only leave drift that heals at bucket TTL expiry.
    async fn undo_capped_attempt(
        &self,
        counter_keys: &[&str],
        reservation_key: &str,
        candidate: &CallerId,
    ) {
        for key in counter_keys {
            if let Err(e) = self.coordination.decrement(key).await {
                warn!("Cap compensation decrement failed for {}: {}", key, e);
            }
        }
        if let Err(e) = self.coordination.delete(reservation_key).await {
            warn!(
                "Failed to release capped reservation for {}: {}",
                candidate.caller_id, e
            );
        }
        debug!(
            "Caller ID {} capped for this bucket, trying next candidate",
            candidate.caller_id
        );
    }

    /// Release a reservation ahead of its TTL.
    ///
    /// Idempotent; returns whether a live key was deleted. Usage counters
    /// are untouched: they count placement attempts, not call outcomes.
    pub async fn release(&self, caller_id: &str, agent_hint: Option<&str>) -> Result<bool> {
        let number = phone::sanitize_number(caller_id);
        if number.is_empty() {
            return Err(AllocationError::invalid_input(
                "caller ID must contain digits",
            ));
        }

        match self
            .coordination
            .delete(&keys::reservation_key(&number))
            .await?
        {
            DeleteOutcome::Deleted => {
                info!(
                    "🔓 Reservation released for {}{}",
                    number,
                    agent_hint
                        .map(|a| format!(" by {}", a))
                        .unwrap_or_default()
                );
                Ok(true)
            }
            DeleteOutcome::Absent => Ok(false),
        }
    }

    /// Fetch the live reservation for a caller ID, if any
    pub async fn lookup_reservation(&self, caller_id: &str) -> Result<Option<ReservationPayload>> {
        let number = phone::sanitize_number(caller_id);
        match self
            .coordination
            .get(&keys::reservation_key(&number))
            .await?
        {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(payload) => Ok(Some(payload)),
                Err(e) => {
                    warn!("Malformed reservation payload for {}: {}", number, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}
