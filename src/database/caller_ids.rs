//! Caller-ID pool operations

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use super::value_helpers::*;
use super::PoolDatabase;

/// One dialable number in the rotation pool
#[derive(Debug, Clone)]
pub struct CallerId {
    pub caller_id: String,
    pub carrier: Option<String>,
    pub area_code: Option<String>,
    pub hourly_cap: i64,
    pub daily_cap: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub total_uses: i64,
    pub is_active: bool,
    /// Opaque JSON blob for external tooling; never read by the allocator
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CALLER_COLUMNS: &str = "caller_id, carrier, area_code, hourly_cap, daily_cap, last_used, \
     total_uses, is_active, metadata, created_at, updated_at";

fn format_ts(ts: DateTime<Utc>) -> String {
    // Fixed-width RFC 3339 so text comparison matches time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl PoolDatabase {
    /// Insert a new pool entry. Callers are expected to have checked for
    /// duplicates; the admin surface maps that to a conflict error.
    pub async fn insert_caller_id(&self, caller: &CallerId) -> Result<()> {
        let params: Vec<limbo::Value> = vec![
            caller.caller_id.clone().into(),
            caller
                .carrier
                .clone()
                .map(|s| s.into())
                .unwrap_or(limbo::Value::Null),
            caller
                .area_code
                .clone()
                .map(|s| s.into())
                .unwrap_or(limbo::Value::Null),
            caller.hourly_cap.into(),
            caller.daily_cap.into(),
            caller
                .last_used
                .map(|ts| format_ts(ts).into())
                .unwrap_or(limbo::Value::Null),
            caller.total_uses.into(),
            (caller.is_active as i64).into(),
            caller
                .metadata
                .clone()
                .map(|s| s.into())
                .unwrap_or(limbo::Value::Null),
            format_ts(caller.created_at).into(),
            format_ts(caller.updated_at).into(),
        ];

        self.apply(
            "INSERT INTO caller_ids
             (caller_id, carrier, area_code, hourly_cap, daily_cap, last_used,
              total_uses, is_active, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params,
        )
        .await?;

        info!(
            "➕ Caller ID {} added to pool (area {:?}, caps {}/{})",
            caller.caller_id, caller.area_code, caller.hourly_cap, caller.daily_cap
        );
        Ok(())
    }

    /// Update the mutable configuration of a pool entry
    pub async fn update_caller_id(&self, caller: &CallerId) -> Result<usize> {
        let params: Vec<limbo::Value> = vec![
            caller
                .carrier
                .clone()
                .map(|s| s.into())
                .unwrap_or(limbo::Value::Null),
            caller
                .area_code
                .clone()
                .map(|s| s.into())
                .unwrap_or(limbo::Value::Null),
            caller.hourly_cap.into(),
            caller.daily_cap.into(),
            (caller.is_active as i64).into(),
            caller
                .metadata
                .clone()
                .map(|s| s.into())
                .unwrap_or(limbo::Value::Null),
            format_ts(Utc::now()).into(),
            caller.caller_id.clone().into(),
        ];

        let updated = self
            .apply(
                "UPDATE caller_ids
                 SET carrier = ?1, area_code = ?2, hourly_cap = ?3, daily_cap = ?4,
                     is_active = ?5, metadata = ?6, updated_at = ?7
                 WHERE caller_id = ?8",
                params,
            )
            .await?;

        Ok(updated)
    }

    /// Toggle the active flag; inactive entries are invisible to the
    /// allocator
    pub async fn set_active(&self, caller_id: &str, active: bool) -> Result<usize> {
        let updated = self
            .apply(
                "UPDATE caller_ids SET is_active = ?1, updated_at = ?2 WHERE caller_id = ?3",
                vec![
                    (active as i64).into(),
                    format_ts(Utc::now()).into(),
                    caller_id.into(),
                ] as Vec<limbo::Value>,
            )
            .await?;

        if updated > 0 {
            info!(
                "Caller ID {} {}",
                caller_id,
                if active { "activated" } else { "deactivated" }
            );
        }
        Ok(updated)
    }

    /// Physically remove a pool entry
    pub async fn remove_caller_id(&self, caller_id: &str) -> Result<usize> {
        let removed = self
            .apply(
                "DELETE FROM caller_ids WHERE caller_id = ?1",
                vec![caller_id.into()] as Vec<limbo::Value>,
            )
            .await?;

        if removed > 0 {
            info!("🗑️ Caller ID {} removed from pool", caller_id);
        }
        Ok(removed)
    }

    /// Fetch one pool entry by number
    pub async fn get_caller_id(&self, caller_id: &str) -> Result<Option<CallerId>> {
        self.select_one(
            &format!("SELECT {} FROM caller_ids WHERE caller_id = ?1", CALLER_COLUMNS),
            vec![caller_id.into()] as Vec<limbo::Value>,
            row_to_caller,
        )
        .await
    }

    /// List the whole pool, for admin tooling
    pub async fn list_caller_ids(&self) -> Result<Vec<CallerId>> {
        self.select(
            &format!("SELECT {} FROM caller_ids ORDER BY caller_id", CALLER_COLUMNS),
            (),
            row_to_caller,
        )
        .await
    }

    /// Query allocation candidates, least recently used first.
    ///
    /// Ordering contract: `last_used ASC` with never-used entries first
    /// (NULL sorts first ascending), then `caller_id ASC` as a
    /// deterministic tiebreak so replicas see identical ordering. Passing
    /// an area code restricts the scan to that area.
    pub async fn query_candidates(
        &self,
        area_code: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CallerId>> {
        let candidates = match area_code {
            Some(area) => {
                self.select(
                    &format!(
                        "SELECT {} FROM caller_ids
                         WHERE is_active = 1 AND area_code = ?1
                         ORDER BY last_used ASC, caller_id ASC
                         LIMIT {}",
                        CALLER_COLUMNS, limit
                    ),
                    vec![area.into()] as Vec<limbo::Value>,
                    row_to_caller,
                )
                .await?
            }
            None => {
                self.select(
                    &format!(
                        "SELECT {} FROM caller_ids
                         WHERE is_active = 1
                         ORDER BY last_used ASC, caller_id ASC
                         LIMIT {}",
                        CALLER_COLUMNS, limit
                    ),
                    (),
                    row_to_caller,
                )
                .await?
            }
        };

        debug!(
            "🔍 Candidate query (area {:?}) returned {} entries",
            area_code,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Record a successful allocation on the pool entry.
    ///
    /// Single attempt: the allocator logs a failure here without failing
    /// the allocation, and the next successful write restores LRU order.
    /// The timestamp guard keeps `last_used` monotonic per number even
    /// when writes land out of order.
    pub async fn update_last_used(&self, caller_id: &str, at: DateTime<Utc>) -> Result<()> {
        let ts = format_ts(at);
        self.apply(
            "UPDATE caller_ids
             SET last_used = ?1, total_uses = total_uses + 1, updated_at = ?1
             WHERE caller_id = ?2 AND (last_used IS NULL OR last_used <= ?1)",
            vec![ts.into(), caller_id.into()] as Vec<limbo::Value>,
        )
        .await?;

        Ok(())
    }
}

/// Convert a database row to a pool entry.
/// Column order: caller_id, carrier, area_code, hourly_cap, daily_cap,
/// last_used, total_uses, is_active, metadata, created_at, updated_at
fn row_to_caller(row: &limbo::Row) -> Result<CallerId> {
    let last_used = value_to_optional_string(&row.get_value(5)?).and_then(|s| parse_ts(&s));
    let created_at = parse_ts(&value_to_string(&row.get_value(9)?)?)
        .ok_or_else(|| anyhow!("Invalid created_at timestamp"))?;
    let updated_at = parse_ts(&value_to_string(&row.get_value(10)?)?)
        .ok_or_else(|| anyhow!("Invalid updated_at timestamp"))?;

    Ok(CallerId {
        caller_id: value_to_string(&row.get_value(0)?)?,
        carrier: value_to_optional_string(&row.get_value(1)?),
        area_code: value_to_optional_string(&row.get_value(2)?),
        hourly_cap: value_to_i64(&row.get_value(3)?)?,
        daily_cap: value_to_i64(&row.get_value(4)?)?,
        last_used,
        total_uses: value_to_i64(&row.get_value(6)?)?,
        is_active: value_to_i64(&row.get_value(7)?)? != 0,
        metadata: value_to_optional_string(&row.get_value(8)?),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pool_entry(number: &str, area: Option<&str>) -> CallerId {
        let now = Utc::now();
        CallerId {
            caller_id: number.to_string(),
            carrier: None,
            area_code: area.map(|s| s.to_string()),
            hourly_cap: 100,
            daily_cap: 500,
            last_used: None,
            total_uses: 0,
            is_active: true,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn candidates_order_never_used_first_then_oldest() {
        let db = PoolDatabase::in_memory().await.unwrap();

        db.insert_caller_id(&pool_entry("2125550001", Some("212")))
            .await
            .unwrap();
        db.insert_caller_id(&pool_entry("2125550002", Some("212")))
            .await
            .unwrap();
        db.insert_caller_id(&pool_entry("2125550003", Some("212")))
            .await
            .unwrap();

        let t1 = Utc.with_ymd_and_hms(2025, 3, 7, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 7, 9, 0, 0).unwrap();
        db.update_last_used("2125550001", t1).await.unwrap();
        db.update_last_used("2125550002", t2).await.unwrap();

        let candidates = db.query_candidates(Some("212"), 50).await.unwrap();
        let numbers: Vec<&str> = candidates.iter().map(|c| c.caller_id.as_str()).collect();
        // Never used first, then oldest last_used
        assert_eq!(numbers, vec!["2125550003", "2125550002", "2125550001"]);
    }

    #[tokio::test]
    async fn candidates_tiebreak_is_number_ascending() {
        let db = PoolDatabase::in_memory().await.unwrap();
        db.insert_caller_id(&pool_entry("3105552001", Some("310")))
            .await
            .unwrap();
        db.insert_caller_id(&pool_entry("2125551001", Some("212")))
            .await
            .unwrap();

        let candidates = db.query_candidates(None, 50).await.unwrap();
        let numbers: Vec<&str> = candidates.iter().map(|c| c.caller_id.as_str()).collect();
        assert_eq!(numbers, vec!["2125551001", "3105552001"]);
    }

    #[tokio::test]
    async fn inactive_entries_are_invisible_to_candidate_queries() {
        let db = PoolDatabase::in_memory().await.unwrap();
        db.insert_caller_id(&pool_entry("2125550001", Some("212")))
            .await
            .unwrap();
        db.set_active("2125550001", false).await.unwrap();

        assert!(db.query_candidates(Some("212"), 50).await.unwrap().is_empty());
        assert!(db.query_candidates(None, 50).await.unwrap().is_empty());

        // Still visible to direct lookup
        let caller = db.get_caller_id("2125550001").await.unwrap().unwrap();
        assert!(!caller.is_active);
    }

    #[tokio::test]
    async fn last_used_writes_never_go_backwards() {
        let db = PoolDatabase::in_memory().await.unwrap();
        db.insert_caller_id(&pool_entry("2125550001", Some("212")))
            .await
            .unwrap();

        let later = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 3, 7, 11, 0, 0).unwrap();
        db.update_last_used("2125550001", later).await.unwrap();
        db.update_last_used("2125550001", earlier).await.unwrap();

        let caller = db.get_caller_id("2125550001").await.unwrap().unwrap();
        assert_eq!(caller.last_used, Some(later));
    }

    #[tokio::test]
    async fn remove_deletes_the_row() {
        let db = PoolDatabase::in_memory().await.unwrap();
        db.insert_caller_id(&pool_entry("2125550001", Some("212")))
            .await
            .unwrap();

        assert_eq!(db.remove_caller_id("2125550001").await.unwrap(), 1);
        assert!(db.get_caller_id("2125550001").await.unwrap().is_none());
        assert_eq!(db.remove_caller_id("2125550001").await.unwrap(), 0);
    }
}
