use std::sync::Arc;

use clap::Parser;
use otpline_core::config::StorageBackend;
use otpline_core::{MemoryStore, OtpStore, OtplineConfig, PgStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use otpline_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "otpline.toml")]
    config: String,

    /// Check storage connectivity and exit
    #[arg(long)]
    health: bool,

    /// Use the in-memory store regardless of `database.backend`
    #[arg(long)]
    memory: bool,
}

async fn build_store(config: &OtplineConfig) -> anyhow::Result<Arc<dyn OtpStore>> {
    match config.database.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store: data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let pool = otpline_core::db::create_pool(&config.database).await?;
            if config.database.apply_schema {
                otpline_core::db::apply_schema(&pool).await?;
            }
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let mut config = match OtplineConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if args.memory {
        config.database.backend = StorageBackend::Memory;
    }

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone()));
    fmt().with_env_filter(filter).init();

    let store = match build_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Store connected: {}", v),
            Err(e) => {
                println!("❌ Store connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ otpline health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if config.expiry_sweep.enabled {
        tokio::spawn(otpline_server::subsystems::sweep::run_sweep_loop(
            store.clone(),
            config.expiry_sweep.clone(),
            tx.subscribe(),
        ));
    }

    if config.http.enabled {
        let http_store = store.clone();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                otpline_server::http::start_http_server(http_store, http_config, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.expanded_socket_path();
    server::run_unix_server(&socket_path, store, config, tx.subscribe()).await?;

    Ok(())
}
