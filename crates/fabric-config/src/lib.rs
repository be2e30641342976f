//! Layered `FabricConfig`: TOML file (optional) over built-in defaults,
//! loaded the way `pagi-core::CoreConfig::load` layers a config file over
//! `set_default` calls. Both binaries load the same struct and slice it
//! into the per-component config types each library crate already owns.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use fabric_protocol::{Category, ConflictResolution};
use serde::Deserialize;

fn default_listen() -> String {
    "127.0.0.1:8680".to_owned()
}

fn default_machine_id() -> String {
    "local".to_owned()
}

fn default_snapshot_interval_s() -> u64 {
    3600
}

fn default_sync_horizon_s() -> u64 {
    24 * 3600
}

fn default_retention_days() -> u64 {
    30
}

fn default_k_default() -> usize {
    20
}

fn default_dedup_similarity() -> f32 {
    0.97
}

fn default_alpha() -> f32 {
    0.6
}
fn default_beta() -> f32 {
    0.3
}
fn default_gamma() -> f32 {
    0.1
}
fn default_half_life_days() -> f32 {
    14.0
}

fn default_agent_ttl_s() -> u64 {
    120
}

fn default_inbox_cap() -> usize {
    10_000
}

fn default_max_inbox_depth() -> usize {
    10_000
}

fn default_t_sync_s() -> u64 {
    30
}

fn default_max_records_per_round() -> usize {
    500
}

fn default_max_lag() -> u64 {
    10_000
}

fn default_peer_timeout_s() -> u64 {
    10
}

fn default_idle_threshold_s() -> i64 {
    300
}

fn default_session_timeout_s() -> i64 {
    1800
}

fn default_recovery_horizon_s() -> i64 {
    300
}

fn default_per_call_timeout_s() -> u64 {
    30
}

fn default_conflict_default() -> String {
    "highest_priority".to_owned()
}

fn default_effective_clock_skew_s() -> i64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: String,
    pub retention_days: HashMap<String, u64>,
    pub quota: HashMap<String, Option<u64>>,
    pub sync_horizon_s: u64,
    pub snapshot_interval_s: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            root: ".fabric".to_owned(),
            retention_days: HashMap::new(),
            quota: HashMap::new(),
            sync_horizon_s: default_sync_horizon_s(),
            snapshot_interval_s: default_snapshot_interval_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub k_default: usize,
}

impl Default for VectorSettings {
    fn default() -> Self {
        VectorSettings { k_default: default_k_default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub half_life_days: f32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        RankingSettings {
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            half_life_days: default_half_life_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub category_ttl: HashMap<String, u64>,
    pub dedup_similarity: f32,
    pub ranking: RankingSettings,
}

impl Default for MemorySettings {
    fn default() -> Self {
        MemorySettings {
            category_ttl: HashMap::new(),
            dedup_similarity: default_dedup_similarity(),
            ranking: RankingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub agent_ttl_s: u64,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        DirectorySettings { agent_ttl_s: default_agent_ttl_s() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordSettings {
    pub inbox_cap: usize,
    pub max_inbox_depth: usize,
}

impl Default for CoordSettings {
    fn default() -> Self {
        CoordSettings { inbox_cap: default_inbox_cap(), max_inbox_depth: default_max_inbox_depth() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub t_sync_s: u64,
    pub max_records_per_round: usize,
    pub max_lag: u64,
    pub peer_timeout_s: u64,
    pub peers: Vec<PeerSettings>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            t_sync_s: default_t_sync_s(),
            max_records_per_round: default_max_records_per_round(),
            max_lag: default_max_lag(),
            peer_timeout_s: default_peer_timeout_s(),
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PeerSettings {
    pub machine_id: String,
    pub base_url: String,
    #[serde(default)]
    pub project_tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub idle_threshold_s: i64,
    pub session_timeout_s: i64,
    pub recovery_horizon_s: i64,
    pub per_call_timeout_s: u64,
    /// Bearer token -> agent id, for the `StaticTokenAuthenticator` test
    /// double. A real credential vault is an external collaborator
    /// (spec.md §1 non-goal); this is the config-file stand-in for it.
    pub agent_tokens: HashMap<String, String>,
    /// Bearer token -> machine id, for peers authenticating sync rounds.
    pub sync_tokens: HashMap<String, String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            idle_threshold_s: default_idle_threshold_s(),
            session_timeout_s: default_session_timeout_s(),
            recovery_horizon_s: default_recovery_horizon_s(),
            per_call_timeout_s: default_per_call_timeout_s(),
            agent_tokens: HashMap::new(),
            sync_tokens: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesSettings {
    pub conflict_default: String,
    pub effective_clock_skew_s: i64,
}

impl Default for RulesSettings {
    fn default() -> Self {
        RulesSettings {
            conflict_default: default_conflict_default(),
            effective_clock_skew_s: default_effective_clock_skew_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub machine_id: String,
    pub listen: String,
    pub storage: StorageSettings,
    pub vector: VectorSettings,
    pub memory: MemorySettings,
    pub directory: DirectorySettings,
    pub coord: CoordSettings,
    pub sync: SyncSettings,
    pub transport: TransportSettings,
    pub rules: RulesSettings,
}

impl Default for FabricConfig {
    fn default() -> Self {
        FabricConfig {
            machine_id: default_machine_id(),
            listen: default_listen(),
            storage: StorageSettings::default(),
            vector: VectorSettings::default(),
            memory: MemorySettings::default(),
            directory: DirectorySettings::default(),
            coord: CoordSettings::default(),
            sync: SyncSettings::default(),
            transport: TransportSettings::default(),
            rules: RulesSettings::default(),
        }
    }
}

impl FabricConfig {
    /// Layers an optional TOML file over the built-in defaults; a missing
    /// path is not an error, matching `CoreConfig::load`'s "file absent ->
    /// defaults" behavior.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }
        builder.build()?.try_deserialize()
    }

    pub fn storage_config(&self) -> fabric_storage::StorageConfig {
        let mut config = fabric_storage::StorageConfig::defaults();
        config.sync_horizon = Duration::from_secs(self.storage.sync_horizon_s);
        for (raw_category, days) in &self.storage.retention_days {
            if let Some(category) = parse_category(raw_category) {
                config.retention.insert(category, Duration::from_secs(days * 24 * 3600));
            }
        }
        for (raw_category, quota) in &self.storage.quota {
            if let Some(category) = parse_category(raw_category) {
                config.quota.insert(category, *quota);
            }
        }
        config
    }

    pub fn memory_config(&self) -> fabric_memory::MemoryConfig {
        let mut dedup_thresholds = HashMap::new();
        for category in ALL_CATEGORIES {
            dedup_thresholds.insert(category, self.memory.dedup_similarity);
        }
        fabric_memory::MemoryConfig {
            ranking: fabric_memory::RankingWeights {
                alpha: self.memory.ranking.alpha,
                beta: self.memory.ranking.beta,
                gamma: self.memory.ranking.gamma,
                age_half_life_days: self.memory.ranking.half_life_days,
            },
            dedup_thresholds,
        }
    }

    pub fn directory_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.directory.agent_ttl_s as i64)
    }

    pub fn sync_config(&self) -> fabric_sync::SyncConfig {
        fabric_sync::SyncConfig {
            t_sync: Duration::from_secs(self.sync.t_sync_s),
            max_records_per_round: self.sync.max_records_per_round,
            max_lag: self.sync.max_lag,
            peer_timeout: Duration::from_secs(self.sync.peer_timeout_s),
        }
    }

    pub fn peers(&self) -> Vec<fabric_sync::PeerConfig> {
        self.sync
            .peers
            .iter()
            .map(|peer| fabric_sync::PeerConfig {
                machine_id: fabric_protocol::MachineId::from_string(peer.machine_id.clone()),
                base_url: peer.base_url.clone(),
                project_tags: peer.project_tags.iter().cloned().collect(),
            })
            .collect()
    }

    pub fn session_timeouts(&self) -> fabric_transport::SessionTimeouts {
        fabric_transport::SessionTimeouts {
            idle_after: chrono::Duration::seconds(self.transport.idle_threshold_s),
            session_timeout: chrono::Duration::seconds(self.transport.session_timeout_s),
            recovery_horizon: chrono::Duration::seconds(self.transport.recovery_horizon_s),
        }
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.per_call_timeout_s)
    }

    /// Builds the transport crate's test-double authenticator from the
    /// configured token tables. Every agent token is granted the `agent`
    /// role; a real deployment swaps this for a vault-backed
    /// `Authenticator` without touching `fabric-transport`.
    pub fn authenticator(&self) -> fabric_transport::StaticTokenAuthenticator {
        let mut authenticator = fabric_transport::StaticTokenAuthenticator::new();
        for (token, agent_id) in &self.transport.agent_tokens {
            authenticator = authenticator.with_agent_token(
                token.clone(),
                fabric_transport::Principal {
                    agent_id: fabric_protocol::AgentId::from_string(agent_id.clone()),
                    roles: vec!["agent".to_owned()],
                },
            );
        }
        for (token, machine_id) in &self.transport.sync_tokens {
            authenticator =
                authenticator.with_sync_token(token.clone(), fabric_protocol::MachineId::from_string(machine_id.clone()));
        }
        authenticator
    }

    pub fn conflict_default(&self) -> ConflictResolution {
        match self.rules.conflict_default.as_str() {
            "most_specific" => ConflictResolution::MostSpecific,
            "latest_created" => ConflictResolution::LatestCreated,
            "consensus" => ConflictResolution::Consensus,
            "override" => ConflictResolution::Override,
            _ => ConflictResolution::HighestPriority,
        }
    }
}

const ALL_CATEGORIES: [Category; 10] = [
    Category::Global,
    Category::Project,
    Category::Infrastructure,
    Category::Incidents,
    Category::Deployments,
    Category::Monitoring,
    Category::Runbooks,
    Category::Security,
    Category::Agent,
    Category::RuleAudit,
];

fn parse_category(raw: &str) -> Option<Category> {
    ALL_CATEGORIES.into_iter().find(|category| {
        serde_json_category_name(*category) == raw
    })
}

fn serde_json_category_name(category: Category) -> String {
    serde_json::to_value(category)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = FabricConfig::load(None).expect("defaults");
        assert_eq!(config.listen, "127.0.0.1:8680");
        assert_eq!(config.vector.k_default, 20);
    }

    #[test]
    fn storage_config_applies_retention_overrides() {
        let mut config = FabricConfig::default();
        config.storage.retention_days.insert("incidents".to_owned(), 90);
        let storage_config = config.storage_config();
        assert_eq!(storage_config.retention_for(Category::Incidents), Duration::from_secs(90 * 24 * 3600));
    }

    #[test]
    fn conflict_default_parses_known_strings() {
        let mut config = FabricConfig::default();
        config.rules.conflict_default = "consensus".to_owned();
        assert_eq!(config.conflict_default(), ConflictResolution::Consensus);
    }
}
