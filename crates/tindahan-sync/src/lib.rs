//! # tindahan-sync: Idempotent Transaction Engine
//!
//! Applies device actions exactly once, whether they arrive directly or
//! replayed from an offline queue, and serves incremental pulls back.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Engine                                     │
//! │                                                                         │
//! │   push(batch) ──► per event ──┐            pull(cursor)                 │
//! │                               ▼                 │                       │
//! │                        execute(event)           ▼                       │
//! │                               │          changed rows + tombstones      │
//! │            ┌──────────────────┼──────────────┐  │                       │
//! │            ▼                  ▼              ▼  ▼                       │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐     │
//! │  │     Gate       │  │ IdempotencyGuard│  │  SideEffectRunner      │     │
//! │  │ role + PIN     │  │ (store,op,key)  │  │  audit, checkpoints    │     │
//! │  └────────────────┘  └───────┬─────────┘  └────────────────────────┘     │
//! │                              ▼                                          │
//! │        ┌─────────────────────┼─────────────────────┐                    │
//! │        ▼                     ▼                     ▼                    │
//! │  ┌────────────┐      ┌────────────────┐    ┌──────────────────┐         │
//! │  │ SaleEngine │      │ StockOperations│    │ AccountOperations│         │
//! │  └─────┬──────┘      └───────┬────────┘    └──────────────────┘         │
//! │        └──────────┬──────────┘                                          │
//! │                   ▼                                                     │
//! │            ┌──────────────┐                                             │
//! │            │ StockLedger  │  read current → compute → conditional append│
//! │            └──────────────┘                                             │
//! │                                                                         │
//! │  All storage goes through `tindahan_db::SharedStore`.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `Engine::execute`, the single idempotent entry point
//! - [`batch`] - `Engine::push`, in-order replay of queued events
//! - [`pull`] - `Engine::pull`, cursor-bounded change feed
//! - [`guard`] - idempotency records with stale-pending takeover
//! - [`ledger`] - append-only stock ledger
//! - [`sales`] - sale create/resume, void, refund
//! - [`stock`] - adjustments and restocks
//! - [`accounts`] - customer account payments
//! - [`gate`] - role capabilities and manager PIN step-up
//! - [`effects`] - non-critical writes after commit
//! - [`config`] - engine tunables
//! - [`error`] - error taxonomy and retry classification
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tindahan_core::{Actor, ClientEvent, Role};
//! use tindahan_db::MemoryStore;
//! use tindahan_sync::{Engine, EngineConfig};
//!
//! # tokio_test_block(async {
//! let engine = Engine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
//! let actor = Actor {
//!     user_id: "u-1".into(),
//!     store_id: "s1".into(),
//!     device_id: "d-1".into(),
//!     role: Role::Owner,
//!     grants: vec![],
//!     revokes: vec![],
//! };
//!
//! let pulled = engine.pull(&actor, None).await.unwrap();
//! assert_eq!(pulled.new_cursor, "v1:0");
//!
//! let event = ClientEvent::parse(
//!     "restock",
//!     json!({"request_id": "r-1", "product_id": "missing", "quantity": 3}),
//! ).unwrap();
//! assert!(engine.execute(&actor, &event, None).await.is_err());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accounts;
pub mod batch;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod gate;
pub mod guard;
pub mod ledger;
pub mod pull;
pub mod sales;
pub mod stock;

// =============================================================================
// Re-exports
// =============================================================================

pub use accounts::{AccountOperations, AccountPaymentResult};
pub use batch::{EventError, EventResult, PushRequest, PushResponse};
pub use config::EngineConfig;
pub use effects::{EffectFailure, SideEffect, SideEffectRunner};
pub use engine::{Engine, OperationResponse};
pub use error::{classify, EngineError, EngineResult, ErrorCode, FailureClass};
pub use gate::{Gate, PinVerifier, RolePolicy, StepUpVerifier};
pub use guard::{GuardOutcome, IdempotencyGuard};
pub use ledger::{LedgerOutcome, StockLedger, StockMutation};
pub use pull::{PullResponse, PullTombstones, PullUpdates, RecordUpdate, Tombstone};
pub use sales::{RefundOutcome, SaleEngine, SaleOutcome, StockChange, VoidOutcome};
pub use stock::{StockOperations, StockOutcome};
