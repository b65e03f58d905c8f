//! # Pull Sync
//!
//! Serves "everything changed since the cursor" for the collections a
//! device caches: products, customers, categories and store settings.
//!
//! ## Paging
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  probe each collection: after < updated_at, limit + 1 rows              │
//! │                                                                         │
//! │  collection overflowed?                                                 │
//! │     boundary = newest stamp on the page that is older than row limit+1  │
//! │                (the whole page shares one stamp ──► that stamp)         │
//! │  until = min(boundary over overflowed collections)                      │
//! │  re-read every collection with after < updated_at ≤ until               │
//! │                                                                         │
//! │  new_cursor = max(since, newest updated_at actually returned)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records sharing one timestamp are never split across pages, so a cursor
//! sitting on that timestamp cannot skip any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use ts_rs::TS;

use tindahan_core::{clock, Actor, Category, Customer, Product, StoreSettings, SyncCursor};
use tindahan_db::ChangeWindow;

use crate::effects::SideEffect;
use crate::engine::Engine;
use crate::error::EngineResult;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecordUpdate {
    pub id: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "unknown")]
    pub snapshot: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tombstone {
    pub id: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PullUpdates {
    pub products: Vec<RecordUpdate>,
    pub customers: Vec<RecordUpdate>,
    pub categories: Vec<RecordUpdate>,
    pub store_settings: Vec<RecordUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PullTombstones {
    pub products: Vec<Tombstone>,
    pub customers: Vec<Tombstone>,
    pub categories: Vec<Tombstone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PullResponse {
    pub new_cursor: String,
    pub updates: PullUpdates,
    pub tombstones: PullTombstones,
    /// More changes are waiting; pull again with `new_cursor`.
    pub has_more: bool,
}

// =============================================================================
// Syncable Records
// =============================================================================

trait Syncable: Serialize {
    fn id(&self) -> &str;
    fn updated_at(&self) -> DateTime<Utc>;
    fn is_active(&self) -> bool;
}

macro_rules! impl_syncable {
    ($($ty:ty),*) => {
        $(
            impl Syncable for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
                fn updated_at(&self) -> DateTime<Utc> {
                    self.updated_at
                }
                fn is_active(&self) -> bool {
                    self.is_active
                }
            }
        )*
    };
}

impl_syncable!(Product, Customer, Category);

/// Splits rows into updates and tombstones, advancing `cursor`.
fn collect<T: Syncable>(
    rows: &[T],
    cursor: &mut SyncCursor,
) -> EngineResult<(Vec<RecordUpdate>, Vec<Tombstone>)> {
    let mut updates = Vec::new();
    let mut tombstones = Vec::new();

    for row in rows {
        cursor.advance_to(row.updated_at());
        if row.is_active() {
            updates.push(RecordUpdate {
                id: row.id().to_string(),
                updated_at: row.updated_at(),
                snapshot: serde_json::to_value(row)?,
            });
        } else {
            tombstones.push(Tombstone {
                id: row.id().to_string(),
                updated_at: row.updated_at(),
            });
        }
    }

    Ok((updates, tombstones))
}

fn stamps<T: Syncable>(rows: &[T]) -> Vec<i64> {
    rows.iter().map(|r| clock::to_micros(r.updated_at())).collect()
}

/// Inclusive upper bound for a page probed with `limit + 1` rows, or `None`
/// when the probe did not overflow. `stamps` is ascending.
fn page_boundary(stamps: &[i64], limit: usize) -> Option<i64> {
    let next = *stamps.get(limit)?;
    Some(
        stamps[..limit]
            .iter()
            .rev()
            .copied()
            .find(|&stamp| stamp < next)
            .unwrap_or(next),
    )
}

// =============================================================================
// Pull
// =============================================================================

impl Engine {
    /// Returns changes after `cursor` (absent means from the beginning).
    pub async fn pull(&self, actor: &Actor, cursor: Option<&str>) -> EngineResult<PullResponse> {
        let since = SyncCursor::parse_optional(cursor)?;
        let store_id = actor.store_id.as_str();
        let limit = self.config.pull_page_limit.max(1);

        let probe = ChangeWindow::after(since.micros()).limit(limit + 1);
        let mut products = self.store.products_changed(store_id, probe).await?;
        let mut customers = self.store.customers_changed(store_id, probe).await?;
        let mut categories = self.store.categories_changed(store_id, probe).await?;

        let until = [
            page_boundary(&stamps(&products), limit),
            page_boundary(&stamps(&customers), limit),
            page_boundary(&stamps(&categories), limit),
        ]
        .into_iter()
        .flatten()
        .min();

        let window = match until {
            Some(until) => {
                let window = ChangeWindow::after(since.micros()).until(until);
                products = self.store.products_changed(store_id, window).await?;
                customers = self.store.customers_changed(store_id, window).await?;
                categories = self.store.categories_changed(store_id, window).await?;
                window
            }
            None => ChangeWindow::after(since.micros()),
        };
        let settings = self.store.settings_changed(store_id, window).await?;

        let mut new_cursor = since;
        let (product_updates, product_tombstones) = collect(&products, &mut new_cursor)?;
        let (customer_updates, customer_tombstones) = collect(&customers, &mut new_cursor)?;
        let (category_updates, category_tombstones) = collect(&categories, &mut new_cursor)?;
        let settings_updates = settings
            .map(|s| settings_update(&s, &mut new_cursor))
            .transpose()?
            .into_iter()
            .collect::<Vec<_>>();

        let response = PullResponse {
            new_cursor: new_cursor.encode(),
            updates: PullUpdates {
                products: product_updates,
                customers: customer_updates,
                categories: category_updates,
                store_settings: settings_updates,
            },
            tombstones: PullTombstones {
                products: product_tombstones,
                customers: customer_tombstones,
                categories: category_tombstones,
            },
            has_more: until.is_some(),
        };

        info!(
            store_id,
            device_id = %actor.device_id,
            since = %since,
            new_cursor = %response.new_cursor,
            products = products.len(),
            customers = customers.len(),
            categories = categories.len(),
            has_more = response.has_more,
            "Pull served"
        );

        self.effects
            .run(vec![SideEffect::checkpoint(actor, response.new_cursor.clone())])
            .await;

        Ok(response)
    }
}

fn settings_update(settings: &StoreSettings, cursor: &mut SyncCursor) -> EngineResult<RecordUpdate> {
    cursor.advance_to(settings.updated_at);
    Ok(RecordUpdate {
        id: settings.store_id.clone(),
        updated_at: settings.updated_at,
        snapshot: serde_json::to_value(settings)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_not_truncated() {
        assert_eq!(page_boundary(&[1, 2, 3], 3), None);
        assert_eq!(page_boundary(&[], 3), None);
    }

    #[test]
    fn test_boundary_stops_before_tied_run() {
        // limit 3, probe returned 4 rows; rows 3 and 4 share stamp 5
        assert_eq!(page_boundary(&[1, 2, 5, 5], 3), Some(2));
        assert_eq!(page_boundary(&[1, 2, 3, 5], 3), Some(3));
    }

    #[test]
    fn test_boundary_whole_page_one_stamp() {
        assert_eq!(page_boundary(&[7, 7, 7, 7], 3), Some(7));
    }
}
