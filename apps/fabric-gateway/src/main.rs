//! `fabric-gateway`: the long-running MCP process. Wires a concrete
//! `AppState` (C8) over real C1-C7/C9 components, hosts the
//! `/messages`+`/sse`+`/health` surface plus the C7 peer-to-peer sync
//! endpoints, and keeps every background sweeper running for the life of
//! the process. Grounded on `aios-api`'s binary: a `clap` CLI, JSON
//! tracing, an `axum::serve` loop with graceful shutdown.

mod sync_routes;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fabric_config::FabricConfig;
use fabric_coordination::{spawn_delivery_retry_loop, CoordinationBus};
use fabric_directory::{spawn_expiry_sweeper, AgentDirectory, AgentFilter};
use fabric_memory::MemoryService;
use fabric_protocol::MachineId;
use fabric_rules::{RuleEngine, RuleStore};
use fabric_storage::{spawn_retention_sweeper, FileStorageEngine, StorageEngine};
use fabric_sync::{spawn_sync_loop, SyncEngine};
use fabric_tools::FabricToolDispatcher;
use fabric_transport::{build_router, spawn_session_sweeper, AppState, SessionTable};
use fabric_vector::{spawn_reconciler, FlatVectorIndex, HashingEmbedder};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fabric-gateway", about = "MCP gateway for the collective-memory fabric")]
struct Cli {
    /// Path to a TOML configuration file layered over the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `storage.root` from the config file.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Overrides `listen` from the config file.
    #[arg(long)]
    listen: Option<String>,
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);
const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

fn derive_id_salt(machine_id: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in machine_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = FabricConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.storage.root = root.to_string_lossy().into_owned();
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let machine_id = MachineId::from_string(config.machine_id.clone());
    info!(machine_id = %machine_id, listen = %config.listen, "starting fabric-gateway");

    let storage = Arc::new(FileStorageEngine::new(&config.storage.root, config.storage_config()));
    storage.load_all().await?;
    let vector_index = Arc::new(FlatVectorIndex::new());
    let embedder = Arc::new(HashingEmbedder::new());
    let memory = Arc::new(MemoryService::new(
        storage.clone() as Arc<dyn StorageEngine>,
        vector_index.clone() as Arc<dyn fabric_vector::VectorIndex>,
        embedder.clone() as Arc<dyn fabric_vector::EmbeddingFn>,
        config.memory_config(),
        derive_id_salt(config.machine_id.as_str()),
    ));

    let directory = Arc::new(AgentDirectory::new(config.directory_ttl()));
    let bus = Arc::new(CoordinationBus::new(directory.clone(), config.coord.max_inbox_depth));
    let rules = Arc::new(RuleEngine::new(Arc::new(RuleStore::new())));
    let sync = Arc::new(SyncEngine::new(
        machine_id.clone(),
        storage.clone() as Arc<dyn StorageEngine>,
        config.peers(),
        config.sync_config(),
    ));

    let dispatcher = Arc::new(FabricToolDispatcher::new(
        memory.clone(),
        directory.clone(),
        bus.clone(),
        rules.clone(),
        sync.clone(),
        machine_id.clone(),
    ));

    let memory_count = Arc::new(AtomicU64::new(0));
    {
        let memory = memory.clone();
        let memory_count = memory_count.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GAUGE_REFRESH_INTERVAL);
            loop {
                ticker.tick().await;
                if let Ok(stats) = memory.stats().await {
                    let total: u64 = stats.counts_per_category.values().sum();
                    memory_count.store(total, Ordering::Relaxed);
                }
            }
        });
    }

    let sessions = Arc::new(SessionTable::new());
    let state = AppState {
        sessions: sessions.clone(),
        authenticator: Arc::new(config.authenticator()),
        dispatcher,
        machine_id: machine_id.clone(),
        per_call_timeout: config.per_call_timeout(),
        started_at: chrono::Utc::now(),
        agent_count: {
            let directory = directory.clone();
            Arc::new(move || directory.list(AgentFilter::default()).len())
        },
        memory_count: {
            let memory_count = memory_count.clone();
            Arc::new(move || memory_count.load(Ordering::Relaxed) as usize)
        },
        sync_lag_s: {
            let sync = sync.clone();
            Arc::new(move || sync.unapplied_lag() as f64)
        },
    };

    // Agents are purged well after they expire so a brief network partition
    // doesn't drop a still-live agent from the directory.
    let purge_horizon = config.directory_ttl() * 4;

    let _retention_sweeper = spawn_retention_sweeper(storage.clone() as Arc<dyn StorageEngine>, SWEEP_INTERVAL);
    let _expiry_sweeper = spawn_expiry_sweeper(directory.clone(), SWEEP_INTERVAL, purge_horizon);
    let _delivery_retry_loop = spawn_delivery_retry_loop(bus.clone(), SWEEP_INTERVAL);
    let _sync_loop = spawn_sync_loop(sync.clone());
    let _session_sweeper = spawn_session_sweeper(sessions.clone(), SWEEP_INTERVAL, config.session_timeouts());
    let _reconciler = spawn_reconciler(
        storage.clone() as Arc<dyn StorageEngine>,
        vector_index.clone() as Arc<dyn fabric_vector::VectorIndex>,
        embedder as Arc<dyn fabric_vector::EmbeddingFn>,
        RECONCILE_INTERVAL,
    );

    let app = build_router(state).merge(sync_routes::build_sync_router(sync.clone()));

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(listen = %config.listen, "fabric-gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining in-flight calls before final snapshot");
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    match storage.stats().await {
        Ok(stats) => info!(?stats, "final storage snapshot on shutdown"),
        Err(e) => warn!(error = %e, "failed to read storage stats on shutdown"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
