mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use http_body_util::BodyExt;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use panel_server::database::{
    SqliteCredentialStore, SqliteSessionStore, open_credentials_database, open_sessions_database,
};
use panel_server::errors::ErrorCatalog;
use panel_server::security::{API_SWEEP_INTERVAL, LOGIN_SWEEP_INTERVAL};
use panel_server::{AppState, build_service};
use panel_shared::config::{read_config, validate_config};
use panel_shared::types::LoginData;
use panel_shared::types::server_config::AppConfig;

use crate::args::{Args, Command};

/// Upper bound on waiting for in-flight connections at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(25);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = read_config(&args.config)
        .with_context(|| format!("Failed to read configuration from {}", args.config))?;

    init_tracing(&config);
    info!(path = %args.config, "Configuration loaded");

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            validate_config(&config)
                .with_context(|| format!("Invalid configuration in {}", args.config))?;
            serve(config).await
        }
        Command::AddUser {
            username,
            password,
            roles,
        } => add_user(&config, username, password, roles).await,
    }
}

fn init_tracing(config: &AppConfig) {
    let default_level = if config.server.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: AppConfig) -> Result<()> {
    let catalog = ErrorCatalog::load(config.server.errors_file.as_deref())
        .context("Failed to load error catalog")?;

    let sessions_pool = open_sessions_database(&config.storage.sessions_db_path)
        .await
        .context("Failed to open session ledger")?;
    let credentials_pool = open_credentials_database(&config.storage.credentials_db_path)
        .await
        .context("Failed to open credential database")?;

    let addr = config.server.addr();
    let state = AppState::new(
        config,
        catalog,
        Arc::new(SqliteSessionStore::new(sessions_pool.clone())),
        Arc::new(SqliteCredentialStore::new(credentials_pool.clone())),
    )?;

    let sweepers = [
        state.login_throttle.spawn_sweeper(LOGIN_SWEEP_INTERVAL),
        state.api_throttle.spawn_sweeper(API_SWEEP_INTERVAL),
    ];

    let app = build_service(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    let graceful = GracefulShutdown::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                // Box the hyper body and record the peer address the throttles key on.
                let service = ServiceBuilder::new()
                    .map_request(move |req: Request<Incoming>| {
                        let mut req = req.map(|body| body.boxed());
                        req.extensions_mut().insert(peer);
                        req
                    })
                    .service(app.clone());

                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
                let conn = graceful.watch(conn);

                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);

    tokio::select! {
        _ = graceful.shutdown() => info!("All connections closed"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("Timed out after {:?} waiting for connections to close", SHUTDOWN_GRACE);
        }
    }

    for sweeper in sweepers {
        sweeper.abort();
    }
    sessions_pool.close().await;
    credentials_pool.close().await;

    info!("Server stopped");
    Ok(())
}

async fn add_user(
    config: &AppConfig,
    username: String,
    password: String,
    roles: Vec<String>,
) -> Result<()> {
    let login = LoginData { username, password };
    if !login.valid_username() {
        bail!("username must be 3-32 ASCII letters or digits");
    }
    if !login.valid_password() {
        bail!("password must be 8-128 characters without spaces");
    }

    let pool = open_credentials_database(&config.storage.credentials_db_path)
        .await
        .context("Failed to open credential database")?;
    let store = SqliteCredentialStore::new(pool.clone());

    let user_id = store
        .create_user(&login.username, &login.password, &roles)
        .await
        .with_context(|| format!("Failed to create user {}", login.username))?;

    info!(user_id, username = %login.username, roles = ?roles, "User added");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
}
