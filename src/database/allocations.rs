//! Append-only allocation history
//!
//! One row per granted allocation, consumed by dashboards and operational
//! tooling. The allocator writes these fire-and-forget and never reads
//! them back.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};

use super::value_helpers::*;
use super::PoolDatabase;

/// One granted allocation
#[derive(Debug, Clone)]
pub struct AllocationRecord {
    pub ts: DateTime<Utc>,
    pub caller_id: String,
    pub destination: String,
    pub campaign: String,
    pub agent: String,
    pub latency_ms: i64,
    pub outcome: String,
}

impl PoolDatabase {
    /// Append one allocation to the history log
    pub async fn record_allocation(&self, record: &AllocationRecord) -> Result<()> {
        self.apply(
            "INSERT INTO allocation_log
             (ts, caller_id, destination, campaign, agent, latency_ms, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            vec![
                record
                    .ts
                    .to_rfc3339_opts(SecondsFormat::Micros, true)
                    .into(),
                record.caller_id.clone().into(),
                record.destination.clone().into(),
                record.campaign.clone().into(),
                record.agent.clone().into(),
                record.latency_ms.into(),
                record.outcome.clone().into(),
            ] as Vec<limbo::Value>,
        )
        .await?;

        Ok(())
    }

    /// Most recent allocations, newest first
    pub async fn recent_allocations(&self, limit: u32) -> Result<Vec<AllocationRecord>> {
        self.select(
            &format!(
                "SELECT ts, caller_id, destination, campaign, agent, latency_ms, outcome
                 FROM allocation_log
                 ORDER BY id DESC
                 LIMIT {}",
                limit
            ),
            (),
            |row| {
                let ts_raw = value_to_string(&row.get_value(0)?)?;
                let ts = DateTime::parse_from_rfc3339(&ts_raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(AllocationRecord {
                    ts,
                    caller_id: value_to_string(&row.get_value(1)?)?,
                    destination: value_to_optional_string(&row.get_value(2)?).unwrap_or_default(),
                    campaign: value_to_optional_string(&row.get_value(3)?).unwrap_or_default(),
                    agent: value_to_optional_string(&row.get_value(4)?).unwrap_or_default(),
                    latency_ms: value_to_i64(&row.get_value(5)?)?,
                    outcome: value_to_string(&row.get_value(6)?)?,
                })
            },
        )
        .await
    }
}
