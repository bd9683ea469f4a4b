//! Broker process entry point: loads configuration, opens the order store,
//! and runs the FIX acceptor and the administrative HTTP surface side by side
//! until shutdown is requested.

use broker_fix::admin::{self, AppState};
use broker_fix::audit::StdoutAuditSink;
use broker_fix::auth::AuthConfig;
use broker_fix::fix::{run_fix_acceptor, SessionRegistry};
use broker_fix::lifecycle::{LifecycleEngine, NoopObserver};
use broker_fix::router::ExecutionRouter;
use broker_fix::store::{schema, OrderStore, SymbolRegistry};
use broker_fix::AppConfig;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = AppConfig::from_env();

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    schema::ensure_schema(&pool).await?;

    let orders = OrderStore::new(pool.clone());
    let symbols = SymbolRegistry::new(pool);
    let lifecycle = Arc::new(LifecycleEngine::new(orders, symbols.clone(), Arc::new(NoopObserver)));

    let sessions = SessionRegistry::new();
    let router = Arc::new(ExecutionRouter::new(sessions.clone(), config.broker_id.clone()));

    let fix_listener = TcpListener::bind(&config.fix_bind_addr).await?;
    log::info!("FIX acceptor listening on {}", config.fix_bind_addr);
    let fix_task = tokio::spawn(run_fix_acceptor(
        fix_listener,
        Arc::clone(&lifecycle),
        Arc::clone(&router),
        sessions,
        config.broker_id.clone(),
        config.heartbeat_interval_secs,
    ));

    let admin_state = AppState {
        lifecycle: Arc::clone(&lifecycle),
        symbols,
        router: Arc::clone(&router),
        audit: Arc::new(StdoutAuditSink),
    };
    let admin_app = admin::create_router(admin_state, AuthConfig::from_env());
    let admin_listener = TcpListener::bind(&config.admin_bind_addr).await?;
    log::info!("admin HTTP surface listening on {}", config.admin_bind_addr);
    let admin_task = tokio::spawn(async move {
        axum::serve(admin_listener, admin_app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    tokio::select! {
        res = fix_task => {
            if let Err(e) = res {
                log::error!("FIX acceptor task exited: {e}");
            }
        }
        res = admin_task => {
            if let Ok(Err(e)) = res {
                log::error!("admin HTTP server exited: {e}");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("shutdown requested");
}
