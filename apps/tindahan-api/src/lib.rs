//! # Tindahan API
//!
//! HTTP server in front of the transaction engine.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tindahan API                                    │
//! │                                                                         │
//! │  Device ──► axum Router ──► require_auth (JWT ──► Actor)                │
//! │                    │                                                    │
//! │                    ├── /v1/sync/push ─────► Engine::push                │
//! │                    ├── /v1/sync/pull ─────► Engine::pull                │
//! │                    └── /v1/sales, /v1/stock, /v1/customers              │
//! │                                  └────────► Engine::execute             │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                                         SQLite (tindahan-db)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config`]. Environment variables:
//! - `TINDAHAN_CONFIG` - path of the TOML file
//! - `TINDAHAN_PORT` - listen port (default: 8080)
//! - `TINDAHAN_DATABASE_PATH` - SQLite file
//! - `TINDAHAN_JWT_SECRET` - HS256 signing secret
//! - `RUST_LOG` - log filter (default: `tindahan_api=info,tindahan_sync=info`)

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

// Re-exports
pub use auth::{Claims, JwtManager};
pub use config::{ApiConfig, ConfigError};
pub use error::ApiError;
pub use routes::{app_router, AppState};
