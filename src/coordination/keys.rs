//! Coordination store key layout
//!
//! The key naming is an external contract observed by operational tooling;
//! do not change it without coordinating with the dialer side. All bucket
//! boundaries align to the UTC calendar.

use chrono::{DateTime, Utc};

/// Reservation lock for one caller ID
pub fn reservation_key(caller_id: &str) -> String {
    format!("reservation:{}", caller_id)
}

/// Hourly usage counter bucket
pub fn hourly_usage_key(caller_id: &str, at: DateTime<Utc>) -> String {
    format!("usage:hourly:{}:{}", caller_id, at.format("%Y%m%d%H"))
}

/// Daily usage counter bucket
pub fn daily_usage_key(caller_id: &str, at: DateTime<Utc>) -> String {
    format!("usage:daily:{}:{}", caller_id, at.format("%Y%m%d"))
}

/// Per-agent per-minute request counter
pub fn agent_rate_key(agent: &str, at: DateTime<Utc>) -> String {
    format!("ratelimit:{}:{}", agent, at.format("%Y%m%d%H%M"))
}

/// Advisory per-campaign daily usage counter; never read by the allocator
pub fn campaign_usage_key(campaign: &str, at: DateTime<Utc>) -> String {
    format!("campaign:{}:{}", campaign, at.format("%Y%m%d"))
}
