//! Pool store database module
//!
//! Limbo-backed persistence for the caller-ID pool and the allocation
//! history. The allocator only ever writes `last_used`/`total_uses`; all
//! other writes belong to admin tooling.
//!
//! A single shared connection serves the whole pool: the allocator's reads
//! dominate, its one hot write is a single-row update, and cross-request
//! exclusion lives in the coordination store, so nothing here needs its own
//! connection or a transaction scope.

use std::sync::Arc;

use anyhow::Result;
use limbo::{Builder, Connection, Database};
use tokio::sync::RwLock;
use tracing::info;

mod allocations;
mod caller_ids;
mod schema;

pub use allocations::AllocationRecord;
pub use caller_ids::CallerId;

struct PoolDbInner {
    // Held so the database outlives every clone of the handle
    _db: Database,
    conn: RwLock<Connection>,
}

/// Handle to the caller-ID pool database
#[derive(Clone)]
pub struct PoolDatabase {
    inner: Arc<PoolDbInner>,
}

impl PoolDatabase {
    /// Open (or create) the pool database at the given path
    pub async fn open(db_path: &str) -> Result<Self> {
        info!("🗄️ Opening caller-ID pool database at: {}", db_path);

        let db = Builder::new_local(db_path).build().await?;
        let conn = db.connect()?;
        let pool = Self {
            inner: Arc::new(PoolDbInner {
                _db: db,
                conn: RwLock::new(conn),
            }),
        };

        schema::initialize_pool_schema(&pool).await?;

        info!("✅ Caller-ID pool database ready");
        Ok(pool)
    }

    /// In-memory pool for tests and demos
    pub async fn in_memory() -> Result<Self> {
        Self::open(":memory:").await
    }

    /// Run a write statement, returning the number of rows changed
    pub(crate) async fn apply<P: limbo::params::IntoParams>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<usize> {
        let conn = self.inner.conn.write().await;
        conn.execute(sql, params).await?;

        let mut stmt = conn.prepare("SELECT changes()").await?;
        let mut rows = stmt.query(()).await?;
        let changed = match rows.next().await? {
            Some(row) => value_helpers::value_to_i64(&row.get_value(0)?)?,
            None => 0,
        };
        Ok(changed as usize)
    }

    /// Run a query, mapping every row into a domain value
    pub(crate) async fn select<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: limbo::params::IntoParams,
        F: Fn(&limbo::Row) -> Result<T>,
    {
        let conn = self.inner.conn.read().await;
        let mut stmt = conn.prepare(sql).await?;
        let mut rows = stmt.query(params).await?;

        let mut mapped = Vec::new();
        while let Some(row) = rows.next().await? {
            mapped.push(map(&row)?);
        }
        Ok(mapped)
    }

    /// Run a query expected to produce at most one row
    pub(crate) async fn select_one<T, P, F>(
        &self,
        sql: &str,
        params: P,
        map: F,
    ) -> Result<Option<T>>
    where
        P: limbo::params::IntoParams,
        F: Fn(&limbo::Row) -> Result<T>,
    {
        Ok(self.select(sql, params, map).await?.into_iter().next())
    }
}

/// Utility functions for Limbo value conversions
pub(crate) mod value_helpers {
    use anyhow::{bail, Result};
    use limbo::Value;

    /// Convert Value to String
    pub fn value_to_string(val: &Value) -> Result<String> {
        match val {
            Value::Text(s) => Ok(s.clone()),
            Value::Blob(b) => Ok(String::from_utf8_lossy(b).to_string()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            Value::Null => bail!("Cannot convert NULL to string"),
        }
    }

    /// Convert Value to optional String
    pub fn value_to_optional_string(val: &Value) -> Option<String> {
        match val {
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(String::from_utf8_lossy(b).to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Null => None,
        }
    }

    /// Convert Value to i64
    pub fn value_to_i64(val: &Value) -> Result<i64> {
        match val {
            Value::Integer(i) => Ok(*i),
            Value::Real(f) => Ok(*f as i64),
            _ => bail!("Cannot convert {:?} to i64", val),
        }
    }
}
