//! Pool database schema
//!
//! Kept deliberately simple for Limbo compatibility: plain columns, no
//! foreign keys, uniqueness of `caller_id` enforced by the create path.

use anyhow::Result;
use tracing::{debug, info};

use super::PoolDatabase;

/// Create all tables and indexes if they do not exist
pub async fn initialize_pool_schema(pool: &PoolDatabase) -> Result<()> {
    info!("🗄️ Initializing caller-ID pool schema");

    pool.apply(
        "CREATE TABLE IF NOT EXISTS caller_ids (
            id INTEGER PRIMARY KEY,
            caller_id TEXT NOT NULL,
            carrier TEXT,
            area_code TEXT,
            hourly_cap INTEGER NOT NULL,
            daily_cap INTEGER NOT NULL,
            last_used TEXT,
            total_uses INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            metadata TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        (),
    )
    .await?;

    debug!("✅ caller_ids table created");

    pool.apply(
        "CREATE TABLE IF NOT EXISTS allocation_log (
            id INTEGER PRIMARY KEY,
            ts TEXT NOT NULL,
            caller_id TEXT NOT NULL,
            destination TEXT,
            campaign TEXT,
            agent TEXT,
            latency_ms INTEGER,
            outcome TEXT NOT NULL
        )",
        (),
    )
    .await?;

    debug!("✅ allocation_log table created");

    pool.apply(
        "CREATE INDEX IF NOT EXISTS idx_caller_ids_number ON caller_ids(caller_id)",
        (),
    )
    .await?;

    pool.apply(
        "CREATE INDEX IF NOT EXISTS idx_caller_ids_area_active
         ON caller_ids(area_code, is_active)",
        (),
    )
    .await?;

    pool.apply(
        "CREATE INDEX IF NOT EXISTS idx_caller_ids_last_used ON caller_ids(last_used)",
        (),
    )
    .await?;

    pool.apply(
        "CREATE INDEX IF NOT EXISTS idx_allocation_log_ts ON allocation_log(ts)",
        (),
    )
    .await?;

    info!("✅ Caller-ID pool schema initialized");
    Ok(())
}
