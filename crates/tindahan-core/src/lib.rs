//! # tindahan-core: Pure Business Logic for Tindahan POS
//!
//! Everything the engine decides without touching storage: money math, sale
//! totals, the sale state machine, client event payloads, mutation keys and
//! the pull cursor.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tindahan Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Devices (offline queue, local cache)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP: push / pull / direct ops         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/tindahan-api                            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   tindahan-sync: guard, ledger, sale engine, batch, pull        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tindahan-core (THIS CRATE) ★                    │   │
//! │  │   types · money · totals · lifecycle · events · keys · cursor   │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              tindahan-db (SQLite / in-memory)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, Product, StockLedgerEntry, ...)
//! - [`money`] - Integer centavo arithmetic
//! - [`totals`] - Subtotal / discount / change / balance-due rules
//! - [`lifecycle`] - Sale status transitions
//! - [`events`] - Typed client event payloads
//! - [`keys`] - Deterministic mutation keys and child-row ids
//! - [`cursor`] - Pull-sync cursor token
//! - [`validation`] - Payload validation
//! - [`clock`] - Microsecond timestamps
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tindahan_core::events::{LineInput, PaymentInput};
//! use tindahan_core::totals::compute_totals;
//! use tindahan_core::{PaymentMethod, SaleStatus};
//!
//! let items = [LineInput {
//!     product_id: "p-1".into(),
//!     quantity: 2,
//!     unit_price_centavos: 500,
//!     line_discount_centavos: 0,
//! }];
//! let paid = [PaymentInput {
//!     request_id: None,
//!     method: PaymentMethod::Cash,
//!     amount_centavos: 300,
//!     reference: None,
//! }];
//!
//! let totals = compute_totals(&items, 100, 0, &paid, SaleStatus::Due).unwrap();
//! assert_eq!(totals.total.centavos(), 900);
//! assert_eq!(totals.balance_due.centavos(), 600);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod cursor;
pub mod error;
pub mod events;
pub mod keys;
pub mod lifecycle;
pub mod money;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cursor::SyncCursor;
pub use error::{CoreError, CoreResult, ValidationError};
pub use events::{ClientEvent, SyncEventEnvelope};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single sale line.
pub const MAX_ITEM_QUANTITY: i64 = 100_000;

/// Maximum number of lines in one sale.
pub const MAX_SALE_LINES: usize = 500;

/// Largest magnitude accepted for a manual stock adjustment or restock.
pub const MAX_STOCK_DELTA: i64 = 1_000_000;
