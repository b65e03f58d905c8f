//! # Domain Types
//!
//! Core domain types shared by storage, engine and API.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog (pulled by devices)      Transactions (pushed by devices)     │
//! │  ───────────────────────────      ─────────────────────────────────    │
//! │  Product   (stock projection)     Sale ──┬── SaleLineItem              │
//! │  Category                                ├── Payment                   │
//! │  Customer  (balance due)                 └── Refund                    │
//! │  StoreSettings                                                          │
//! │                                   StockLedgerEntry (append-only)       │
//! │                                                                         │
//! │  Bookkeeping                                                            │
//! │  ───────────                                                            │
//! │  IdempotencyRecord   SyncEventRecord   AuditEntry   DeviceCheckpoint   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A sale has a server `id` (UUID v4) and the device's `client_tx_id`; the
//! pair (store_id, client_tx_id) is what makes a resubmitted sale find its
//! earlier self.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Sale Status
// =============================================================================

/// Lifecycle status of a sale.
///
/// `voided` and `refunded` are terminal; see [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SaleStatus {
    /// Saved cart, no side effects yet.
    Parked,
    /// Paid in full.
    Completed,
    /// Handed over with an outstanding customer balance (utang).
    Due,
    Voided,
    Refunded,
}

impl SaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Parked => "parked",
            SaleStatus::Completed => "completed",
            SaleStatus::Due => "due",
            SaleStatus::Voided => "voided",
            SaleStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parked" => Ok(SaleStatus::Parked),
            "completed" => Ok(SaleStatus::Completed),
            "due" => Ok(SaleStatus::Due),
            "voided" => Ok(SaleStatus::Voided),
            "refunded" => Ok(SaleStatus::Refunded),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: ["parked", "completed", "due", "voided", "refunded"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    Card,
    /// GCash, Maya and similar wallets.
    EWallet,
    BankTransfer,
    Other,
}

// =============================================================================
// Stock Reason
// =============================================================================

/// Why a stock ledger entry was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StockReason {
    Sale,
    Adjustment,
    Restock,
    Void,
    Refund,
}

// =============================================================================
// Catalog
// =============================================================================

/// A product in a store's catalog.
///
/// `stock_quantity` is a projection: it always equals the `resulting_qty`
/// of the newest ledger entry for the product (or its initial quantity when
/// no entry exists yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub sku: String,
    pub name: String,
    pub price_centavos: i64,
    pub stock_quantity: i64,
    pub category_id: Option<String>,
    /// Set on variants; the parent itself has `is_sellable = false`.
    pub parent_id: Option<String>,
    pub is_sellable: bool,
    /// `false` means soft-deleted; pulled as a tombstone.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn price(&self) -> Money {
        Money::from_centavos(self.price_centavos)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A customer who may carry an outstanding balance from due sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Never negative.
    pub balance_due_centavos: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Per-store configuration consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoreSettings {
    pub store_id: String,
    /// When false, a stock decrease that would go below zero is rejected.
    pub allow_negative_stock: bool,
    /// Automatic percentage discount on every sale subtotal, in basis points.
    pub auto_discount_bps: u32,
    /// Capabilities that additionally need a manager PIN.
    pub step_up_capabilities: Vec<Capability>,
    /// argon2 PHC string. Never sent to devices.
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub manager_pin_hash: Option<String>,
    pub receipt_prefix: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StoreSettings {
    pub const DEFAULT_RECEIPT_PREFIX: &'static str = "OR-";

    /// Settings used for a store that never saved any.
    pub fn defaults(store_id: impl Into<String>) -> Self {
        StoreSettings {
            store_id: store_id.into(),
            allow_negative_stock: false,
            auto_discount_bps: 0,
            step_up_capabilities: Vec::new(),
            manager_pin_hash: None,
            receipt_prefix: Self::DEFAULT_RECEIPT_PREFIX.to_string(),
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn requires_step_up(&self, capability: Capability) -> bool {
        self.step_up_capabilities.contains(&capability)
    }
}

// =============================================================================
// Sales
// =============================================================================

/// A sale header. Line items, payments and refunds are separate rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub store_id: String,
    pub client_tx_id: String,
    pub device_id: Option<String>,
    pub cashier_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: SaleStatus,
    pub subtotal_centavos: i64,
    pub discount_centavos: i64,
    pub total_centavos: i64,
    pub paid_centavos: i64,
    pub change_centavos: i64,
    pub balance_due_centavos: i64,
    /// Assigned once on completion; never changes afterwards.
    pub receipt_number: Option<String>,
    /// Set when the balance due was added to the customer's account.
    pub balance_due_applied: bool,
    /// Amount actually added to the customer's balance. A void takes back
    /// exactly this.
    pub balance_applied_centavos: i64,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineItem {
    /// `{sale_id}:{line_index}`, stable across resubmissions.
    pub id: String,
    pub sale_id: String,
    pub line_index: u32,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_centavos: i64,
    pub line_discount_centavos: i64,
    pub line_total_centavos: i64,
}

/// Money received, either for a sale or against a customer's balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub store_id: String,
    pub sale_id: Option<String>,
    pub customer_id: Option<String>,
    pub method: PaymentMethod,
    pub amount_centavos: i64,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Refund {
    pub id: String,
    pub store_id: String,
    pub sale_id: String,
    pub amount_centavos: i64,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// One accepted stock mutation. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLedgerEntry {
    pub id: String,
    pub store_id: String,
    pub product_id: String,
    /// Unique per store; a repeat is an already-applied mutation.
    pub mutation_key: String,
    pub delta_qty: i64,
    pub reason: StockReason,
    pub reference_type: String,
    pub reference_id: String,
    pub resulting_qty: i64,
    pub device_id: Option<String>,
    pub client_tx_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Operations & Authorization
// =============================================================================

/// Every idempotent operation the engine performs.
///
/// Doubles as the batch event type: `event_type` strings parse into this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OperationKind {
    CompleteSale,
    ParkSale,
    VoidSale,
    RefundSale,
    AdjustStock,
    Restock,
    RecordPayment,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::CompleteSale,
        OperationKind::ParkSale,
        OperationKind::VoidSale,
        OperationKind::RefundSale,
        OperationKind::AdjustStock,
        OperationKind::Restock,
        OperationKind::RecordPayment,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CompleteSale => "complete_sale",
            OperationKind::ParkSale => "park_sale",
            OperationKind::VoidSale => "void_sale",
            OperationKind::RefundSale => "refund_sale",
            OperationKind::AdjustStock => "adjust_stock",
            OperationKind::Restock => "restock",
            OperationKind::RecordPayment => "record_payment",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `complete_sale` and `complete-sale` spellings.
impl FromStr for OperationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "event_type".to_string(),
                allowed: OperationKind::ALL
                    .iter()
                    .map(|k| k.as_str().to_string())
                    .collect(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Capability {
    SaleCreate,
    SaleVoid,
    SaleRefund,
    DiscountApply,
    StockAdjust,
    StockRestock,
    PaymentRecord,
}

impl Capability {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Capability::SaleCreate => "sale_create",
            Capability::SaleVoid => "sale_void",
            Capability::SaleRefund => "sale_refund",
            Capability::DiscountApply => "discount_apply",
            Capability::StockAdjust => "stock_adjust",
            Capability::StockRestock => "stock_restock",
            Capability::PaymentRecord => "payment_record",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Owner,
    Manager,
    Cashier,
    StockClerk,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub store_id: String,
    pub device_id: String,
    pub role: Role,
    /// Capabilities granted on top of the role.
    #[serde(default)]
    pub grants: Vec<Capability>,
    /// Capabilities removed from the role.
    #[serde(default)]
    pub revokes: Vec<Capability>,
}

// =============================================================================
// Idempotency
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStatus {
    Pending,
    Applied,
    Failed,
}

/// Guard record, unique per (store_id, operation, key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: String,
    pub store_id: String,
    pub operation: OperationKind,
    pub key: String,
    pub status: IdempotencyStatus,
    /// Immutable once status is applied; replayed verbatim.
    pub result: Option<serde_json::Value>,
    pub context: serde_json::Value,
    pub last_error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sync Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SyncEventStatus {
    Applied,
    DuplicateIgnored,
    /// Transient failure; the device keeps the event queued.
    FailedRetry,
    /// The device must not resend the event unchanged.
    FailedPermanent,
}

impl SyncEventStatus {
    /// Whether a stored event with this status short-circuits a replay.
    pub const fn is_settled(&self) -> bool {
        matches!(self, SyncEventStatus::Applied | SyncEventStatus::DuplicateIgnored)
    }
}

/// Server-side log of one pushed client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEventRecord {
    pub event_id: String,
    pub store_id: String,
    pub device_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: SyncEventStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Audit & Checkpoints
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub store_id: String,
    pub actor_id: String,
    pub device_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The newest cursor handed to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCheckpoint {
    pub store_id: String,
    pub device_id: String,
    pub cursor: String,
    pub pulled_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
