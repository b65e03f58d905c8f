//! # Repository Module
//!
//! SQLite implementations of the [`Storage`](crate::store::Storage) traits
//! for [`Database`](crate::Database).
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store.rs (traits)          repository/ (impl ... for Database)        │
//! │  ──────────────────         ────────────────────────────────────        │
//! │  IdempotencyStore     ───►  idempotency.rs                              │
//! │  LedgerStore          ───►  ledger.rs                                   │
//! │  CatalogStore         ───►  catalog.rs                                  │
//! │  CustomerStore        ───►  customer.rs                                 │
//! │  SaleStore            ───►  sale.rs                                     │
//! │  SyncEventStore       ───►  sync.rs                                     │
//! │  AuditStore, Storage  ───►  sync.rs                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each file decodes into private `*Row` structs (`sqlx::FromRow`) and
//! converts them into the domain types from `tindahan-core`. Timestamps
//! are bound and read as unix microseconds.

pub mod catalog;
pub mod customer;
pub mod idempotency;
pub mod ledger;
pub mod sale;
pub mod sync;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use tindahan_core::clock;

use crate::error::{DbError, DbResult};

pub(crate) fn micros(ts: DateTime<Utc>) -> i64 {
    clock::to_micros(ts)
}

pub(crate) fn opt_micros(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(clock::to_micros)
}

pub(crate) fn ts(micros: i64) -> DateTime<Utc> {
    clock::from_micros(micros)
}

pub(crate) fn opt_ts(micros: Option<i64>) -> Option<DateTime<Utc>> {
    micros.map(clock::from_micros)
}

pub(crate) fn to_u32(entity: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::corrupt(entity, format!("{} out of range", value)))
}

pub(crate) fn from_json<T: DeserializeOwned>(entity: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(entity, e.to_string()))
}

/// `LIMIT` value for an optional limit; SQLite treats -1 as unbounded.
pub(crate) fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}
