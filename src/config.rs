use std::str::FromStr;
use std::time::Duration;

/// Configuration for the allocation engine
///
/// Built once at start-up and passed by value; nothing re-reads the
/// environment after construction.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Reservation lifetime in seconds
    pub reservation_ttl_seconds: u64,

    /// Maximum allocation requests per agent per clock minute
    pub agent_rate_limit_per_minute: i64,

    /// Maximum candidates fetched per tier from the pool store
    pub candidate_scan_limit: u32,

    /// Hourly cap applied when a caller ID is created without one
    pub default_hourly_cap: i64,

    /// Daily cap applied when a caller ID is created without one
    pub default_daily_cap: i64,

    /// Whole-operation deadline for one allocation
    pub request_deadline_ms: u64,

    /// Minimum idle seconds before a caller ID may be re-allocated (0 = off)
    pub caller_id_cooldown_seconds: u64,

    /// Suppress the any-area-code fallback tier when the destination has an
    /// area code
    pub area_code_strict: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_seconds: 300,
            agent_rate_limit_per_minute: 100,
            candidate_scan_limit: 50,
            default_hourly_cap: 100,
            default_daily_cap: 1000,
            request_deadline_ms: 2000,
            caller_id_cooldown_seconds: 0,
            area_code_strict: false,
        }
    }
}

impl AllocatorConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reservation_ttl_seconds: env_or("RESERVATION_TTL_SECONDS", defaults.reservation_ttl_seconds),
            agent_rate_limit_per_minute: env_or(
                "AGENT_RATE_LIMIT_PER_MINUTE",
                defaults.agent_rate_limit_per_minute,
            ),
            candidate_scan_limit: env_or("CANDIDATE_SCAN_LIMIT", defaults.candidate_scan_limit),
            default_hourly_cap: env_or("DEFAULT_HOURLY_CAP", defaults.default_hourly_cap),
            default_daily_cap: env_or("DEFAULT_DAILY_CAP", defaults.default_daily_cap),
            request_deadline_ms: env_or("REQUEST_DEADLINE_MS", defaults.request_deadline_ms),
            caller_id_cooldown_seconds: env_or(
                "CALLER_ID_COOLDOWN_SECONDS",
                defaults.caller_id_cooldown_seconds,
            ),
            area_code_strict: env_or("AREA_CODE_STRICT", defaults.area_code_strict),
        }
    }

    /// Reservation lifetime as a duration
    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_seconds)
    }

    /// Per-request deadline as a duration
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}
