//! Vertex: cost-aware model router with idle self-termination.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vertex_catalog::HttpRegistry;
use vertex_core::VertexConfig;
use vertex_runtime::{Scheduler, TerminationHook};
use vertex_server::{build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("VERTEX_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                println!("Vertex: cost-aware model router");
                println!();
                println!("Usage: vertex");
                println!();
                println!("Environment:");
                println!("  VERTEX_DATA_DIR               Data directory (default: ./data)");
                println!("  PORT                          HTTP port (default: 3004)");
                println!("  VERTEX_IDLE_THRESHOLD_SECS    Idle seconds before self-termination");
                println!("  VERTEX_LIFECYCLE_ENABLED      Set to false to never self-terminate");
                return Ok(());
            }
            other => {
                eprintln!("Unknown command: {}. Use 'vertex help' for usage.", other);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = VertexConfig::from_env(&data_dir)?;
    let port = config.port;
    let registry = Arc::new(HttpRegistry::new(&config.registry_base, config.fetch_timeout)?);

    // The lifecycle hook only flips this flag; shutdown happens below.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let hook: TerminationHook = Arc::new(move || {
        let _ = shutdown_tx.send(true);
    });

    let state = Arc::new(AppState::build(config, registry, hook)?);

    let mut scheduler = Scheduler::new();
    state.schedule(&mut scheduler);
    info!("Background tasks: {}", scheduler.task_names().join(", "));
    let scheduler = scheduler.spawn();

    let app = build_router(state.clone());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Vertex server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let idle = async {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            tokio::select! {
                _ = idle => info!("Idle threshold reached, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
            }
        })
        .await?;

    scheduler.abort();
    state.unload_all();
    info!("Vertex stopped");
    Ok(())
}
