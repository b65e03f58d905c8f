//! # tindahan-db: Storage Layer for the Tindahan Sync Backend
//!
//! Every piece of state the sync engine touches goes through the
//! [`Storage`] traits defined here. Two implementations ship:
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  tindahan-sync (engine)                                                 │
//! │       │  SharedStore = Arc<dyn Storage>                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  tindahan-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐   ┌────────────┐ │   │
//! │  │   │   store.rs    │    │    repository/     │   │ migrations │ │   │
//! │  │   │  (traits)     │◄───│ impl for Database  │   │ (embedded) │ │   │
//! │  │   │               │    └────────────────────┘   └────────────┘ │   │
//! │  │   │               │◄───  memory.rs (MemoryStore, tests)        │   │
//! │  │   └───────────────┘                                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)  ──  migrations/sqlite/*.sql                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tindahan_db::{Database, DbConfig, SharedStore, Storage};
//!
//! let db = Database::new(DbConfig::new("tindahan.db")).await?;
//! db.health_check().await?;
//! let store: SharedStore = Arc::new(db);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use store::{
    AccountPaymentOutcome, AppendOutcome, AuditStore, CatalogStore, ChangeWindow, CustomerStore,
    IdempotencyStore, LedgerStore, SaleStore, SharedStore, Storage, SyncEventStore,
};
