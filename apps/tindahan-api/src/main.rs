//! # Tindahan API Server
//!
//! ```text
//! tindahan-api                                   serve HTTP
//! tindahan-api issue-token USER STORE DEVICE ROLE  print a device access token
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tindahan_api::{app_router, ApiConfig, AppState, JwtManager};
use tindahan_core::{Actor, Role};
use tindahan_db::{Database, DbConfig};
use tindahan_sync::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tindahan_api=info,tindahan_sync=info")),
        )
        .with_target(true)
        .init();

    let config = ApiConfig::load().context("loading configuration")?;
    let jwt = JwtManager::new(
        config.auth.jwt_secret.clone(),
        config.auth.access_lifetime_secs,
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(command) = args.first() {
        if command == "issue-token" {
            return issue_token(&jwt, &args[1..]);
        }
        bail!("unknown command `{}`", command);
    }

    info!(
        bind = %config.bind_addr(),
        database = %config.database.path.display(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let db = Database::new(
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
    )
    .await
    .context("opening database")?;

    let engine = Engine::new(Arc::new(db.clone()), config.engine.clone());
    let router = app_router(AppState::new(engine, jwt));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "tindahan-api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

fn issue_token(jwt: &JwtManager, args: &[String]) -> anyhow::Result<()> {
    let [user_id, store_id, device_id, role] = args else {
        bail!("usage: tindahan-api issue-token USER STORE DEVICE ROLE");
    };
    let role: Role = serde_json::from_value(serde_json::Value::String(role.clone()))
        .with_context(|| format!("unknown role `{}`", role))?;

    let actor = Actor {
        user_id: user_id.clone(),
        store_id: store_id.clone(),
        device_id: device_id.clone(),
        role,
        grants: Vec::new(),
        revokes: Vec::new(),
    };
    let token = jwt.generate_access_token(&actor)?;
    println!("{}", token);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
