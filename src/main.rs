//! WhatsApp Pairing Broker - pairing-code linking over HTTP.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wa_pairing_broker::{
    config::{Cli, Command, DecodeConfig, ServeConfig},
    link::Linker,
    pairing::{spawn_sweeper, PairingService},
    server::{create_router, RouterConfig},
    session::restore_auth_dir,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Decode(config) => run_decode(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    #[cfg(feature = "whatsapp")]
    {
        let mut linker = wa_pairing_broker::link::WhatsAppLinker::new();
        if let Some(ref url) = config.ws_url {
            linker = linker.with_ws_url(url.clone());
        }
        serve(config, linker).await
    }

    #[cfg(not(feature = "whatsapp"))]
    {
        error!("Built without the `whatsapp` feature: no protocol client is available");
        error!("Rebuild with: cargo build --features whatsapp");
        ExitCode::FAILURE
    }
}

#[cfg_attr(not(feature = "whatsapp"), allow(dead_code))]
async fn serve<L: Linker + 'static>(config: ServeConfig, linker: L) -> ExitCode {
    print_banner();

    info!("Configuration:");
    info!("  Work dir: {}", config.work_dir.display());
    info!(
        "  Sessions: expire after {}s, swept every {}s",
        config.session_ttl, config.sweep_interval
    );
    info!(
        "  Pairing: code timeout {}s, linger {}s",
        config.code_timeout, config.linger
    );
    info!("  Brand: {}", config.brand);
    if let Some(ref url) = config.ws_url {
        info!("  WebSocket endpoint: {}", url);
    }
    match config.cors_origins {
        Some(ref origins) => info!("  CORS origins: {}", origins.join(", ")),
        None => warn!("  CORS: any origin allowed"),
    }

    let service = Arc::new(PairingService::new(linker, config.pairing_config()));
    let sweeper = spawn_sweeper(Arc::clone(&service), config.sweep_period());

    let router = create_router(service, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/ping", addr);
    info!(
        "    curl -X POST http://{}/request-code -H 'content-type: application/json' \\",
        addr
    );
    info!("         -d '{{\"phone\":\"<number>\"}}'");
    info!("    curl http://{}/session-status/<session_id>", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            sweeper.abort();
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolve when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("╔═══════════════════════════════════════╗");
    info!("║      WhatsApp Pairing Broker v{:<8}║", version);
    info!("╚═══════════════════════════════════════╝");
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wa_pairing_broker=debug,tower_http=debug"
    } else {
        "wa_pairing_broker=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Decode Command
// =============================================================================

fn run_decode(config: DecodeConfig) -> ExitCode {
    match restore_auth_dir(&config.session, &config.out_dir) {
        Ok(files) => {
            println!(
                "Restored {} file(s) into {}",
                files.len(),
                config.out_dir.display()
            );
            for file in files {
                println!("  {}", file.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
