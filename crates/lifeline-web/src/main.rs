mod actions;
mod app;
mod config;
mod error;
mod live;
mod pages;
mod session;
mod storage;

use std::net::SocketAddr;

use axum::Router;
use tracing::info;

use lifeline_db::Database;
use lifeline_platform::local::ObjectStore;
use lifeline_platform::{LocalPlatform, Platform, RemotePlatform};

use crate::config::{Backend, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifeline=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    match config.backend {
        Backend::Local => {
            let db = Database::open(&config.db_path)?;
            let storage = ObjectStore::new(config.storage_dir.clone()).await?;
            let platform = LocalPlatform::new(
                db,
                storage,
                config.jwt_secret.clone(),
                config.public_url.clone(),
            );
            info!("Using embedded platform ({})", config.db_path.display());
            let extra = app::local_routes(platform.clone());
            serve(platform, extra, &config).await
        }
        Backend::Remote => {
            let platform = RemotePlatform::new(&config.supabase_url, &config.supabase_anon_key)?;
            info!("Using hosted platform at {}", config.supabase_url);
            serve(platform, Router::new(), &config).await
        }
    }
}

async fn serve<P: Platform>(platform: P, extra: Router, config: &Config) -> anyhow::Result<()> {
    let app = app::router(platform, extra);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Lifeline listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Lifeline stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
