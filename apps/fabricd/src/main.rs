//! `fabricd`: the operator CLI, grounded on `aiosd`'s shape — a `clap`
//! derive over a handful of straightforward sequential operations, compact
//! tracing instead of the gateway's JSON logs. Drives the same library
//! crates as `fabric-gateway` but one shot rather than long-running, except
//! for `serve`, which runs the same HTTP surface for local debugging.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fabric_config::FabricConfig;
use fabric_coordination::CoordinationBus;
use fabric_directory::AgentDirectory;
use fabric_memory::MemoryService;
use fabric_protocol::{Category, FabricError, MachineId};
use fabric_rules::{RuleEngine, RuleStore};
use fabric_storage::{FileStorageEngine, ScanFilter, StorageEngine};
use fabric_sync::{run_round, SyncConfig, SyncEngine};
use fabric_tools::FabricToolDispatcher;
use fabric_transport::{build_router, AppState, SessionTable};
use fabric_vector::{FlatVectorIndex, HashingEmbedder};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fabricd", about = "Operator CLI for the collective-memory fabric")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/SSE surface in the foreground (same routes as `fabric-gateway`).
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },
    /// Run a single sync round against every configured peer, then exit.
    SyncOnce,
    /// Print every live (non-tombstoned) item in a category as JSON lines.
    Dump { category: String },
    /// Load items from a JSON-lines file written by `dump` back into storage.
    Restore { file: PathBuf },
}

enum CliError {
    Config(String),
    TransientIo(String),
    Invariant(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => 1,
            CliError::TransientIo(_) => 2,
            CliError::Invariant(_) => 3,
        }
    }

    fn log(&self) {
        match self {
            CliError::Config(detail) => error!(detail, "configuration error"),
            CliError::TransientIo(detail) => error!(detail, "transient I/O error"),
            CliError::Invariant(detail) => error!(detail, "fatal invariant violation"),
        }
    }
}

impl From<config::ConfigError> for CliError {
    fn from(err: config::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<FabricError> for CliError {
    fn from(err: FabricError) -> Self {
        match err {
            FabricError::InvariantViolation(_) | FabricError::CorruptedStorage(_) => CliError::Invariant(err.to_string()),
            FabricError::StorageUnavailable(_) | FabricError::PeerUnreachable(_) | FabricError::Timeout => {
                CliError::TransientIo(err.to_string())
            }
            other => CliError::Invariant(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::TransientIo(err.to_string())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .compact()
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.log();
            ExitCode::from(e.exit_code())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<FabricConfig, CliError> {
    Ok(FabricConfig::load(path)?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Serve { listen } => serve(config, listen).await,
        Command::SyncOnce => sync_once(config).await,
        Command::Dump { category } => dump(config, &category).await,
        Command::Restore { file } => restore(config, &file).await,
    }
}

fn open_storage(config: &FabricConfig) -> Arc<FileStorageEngine> {
    Arc::new(FileStorageEngine::new(&config.storage.root, config.storage_config()))
}

async fn serve(config: FabricConfig, listen_override: Option<String>) -> Result<(), CliError> {
    let machine_id = MachineId::from_string(config.machine_id.clone());
    let storage = open_storage(&config);
    storage.load_all().await?;
    let vector_index = Arc::new(FlatVectorIndex::new());
    let embedder = Arc::new(HashingEmbedder::new());
    let memory = Arc::new(MemoryService::new(
        storage.clone() as Arc<dyn StorageEngine>,
        vector_index as Arc<dyn fabric_vector::VectorIndex>,
        embedder as Arc<dyn fabric_vector::EmbeddingFn>,
        config.memory_config(),
        0,
    ));
    let directory = Arc::new(AgentDirectory::new(config.directory_ttl()));
    let bus = Arc::new(CoordinationBus::new(directory.clone(), config.coord.max_inbox_depth));
    let rules = Arc::new(RuleEngine::new(Arc::new(RuleStore::new())));
    let sync = Arc::new(SyncEngine::new(machine_id.clone(), storage.clone() as Arc<dyn StorageEngine>, config.peers(), config.sync_config()));
    let dispatcher = Arc::new(FabricToolDispatcher::new(memory, directory, bus, rules, sync, machine_id.clone()));

    let sessions = Arc::new(SessionTable::new());
    let state = AppState {
        sessions,
        authenticator: Arc::new(config.authenticator()),
        dispatcher,
        machine_id,
        per_call_timeout: config.per_call_timeout(),
        started_at: chrono::Utc::now(),
        agent_count: Arc::new(|| 0),
        memory_count: Arc::new(|| 0),
        sync_lag_s: Arc::new(|| 0.0),
    };

    let listen = listen_override.unwrap_or(config.listen);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(listen, "fabricd serve listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| CliError::TransientIo(e.to_string()))
}

async fn sync_once(config: FabricConfig) -> Result<(), CliError> {
    let machine_id = MachineId::from_string(config.machine_id.clone());
    let storage = open_storage(&config);
    storage.load_all().await?;
    let peers = config.peers();
    if peers.is_empty() {
        warn!("no peers configured, nothing to sync");
        return Ok(());
    }
    let sync = SyncEngine::new(machine_id, storage as Arc<dyn StorageEngine>, peers.clone(), SyncConfig::default());
    let mut failures = 0;
    for peer in &peers {
        match run_round(&sync, peer).await {
            Ok(ack) => info!(peer = %peer.machine_id, clock = ?ack.up_to_vector_clock, "sync round complete"),
            Err(e) => {
                warn!(peer = %peer.machine_id, error = %e, "sync round failed");
                failures += 1;
            }
        }
    }
    if failures == peers.len() {
        return Err(CliError::TransientIo("every configured peer was unreachable".into()));
    }
    Ok(())
}

fn parse_category(raw: &str) -> Result<Category, CliError> {
    match raw {
        "global" => Ok(Category::Global),
        "project" => Ok(Category::Project),
        "infrastructure" => Ok(Category::Infrastructure),
        "incidents" => Ok(Category::Incidents),
        "deployments" => Ok(Category::Deployments),
        "monitoring" => Ok(Category::Monitoring),
        "runbooks" => Ok(Category::Runbooks),
        "security" => Ok(Category::Security),
        "agent" => Ok(Category::Agent),
        "rule-audit" => Ok(Category::RuleAudit),
        other => Err(CliError::Config(format!("unknown category {other}"))),
    }
}

async fn dump(config: FabricConfig, category: &str) -> Result<(), CliError> {
    let category = parse_category(category)?;
    let storage = open_storage(&config);
    storage.load_all().await?;
    let items = storage
        .scan(ScanFilter { category: Some(category), include_tombstones: true, ..ScanFilter::default() })
        .await?;
    for item in &items {
        println!("{}", serde_json::to_string(item).map_err(|e| CliError::Invariant(e.to_string()))?);
    }
    info!(count = items.len(), category = ?category, "dump complete");
    Ok(())
}

async fn restore(config: FabricConfig, file: &std::path::Path) -> Result<(), CliError> {
    let storage = open_storage(&config);
    storage.load_all().await?;
    let contents = tokio::fs::read_to_string(file).await?;
    let mut restored = 0u64;
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let item: fabric_protocol::MemoryItem =
            serde_json::from_str(line).map_err(|e| CliError::Invariant(format!("malformed record: {e}")))?;
        match storage.put(item).await {
            Ok(_) => restored += 1,
            Err(FabricError::VersionConflict { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    info!(restored, "restore complete");
    Ok(())
}
