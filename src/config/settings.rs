use std::env;

use serde::Deserialize;

use crate::domain::ClusterConfig;

/// Typed configuration, loaded once at startup. Composed of a
/// `main` section (scan period, timeouts, node identity), a `commands`
/// section (every external command string the controller runs), and a
/// `cluster` section (the static node map).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub main: MainSettings,
    pub commands: CommandSettings,
    pub cluster: Vec<ClusterNodeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterNodeEntry {
    pub node_id: String,
    pub connection_string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainSettings {
    pub local_node_host_name: String,
    pub cluster_scan_period_sec: u64,
    pub timeout_to_failover_sec: u64,
    pub timeout_to_downgrade_master_sec: u64,
    pub timeout_to_check_replication_status_after_start_sec: u64,
    pub replication_slot_name: String,
    pub pg_data_path: String,
    pub webserver_address: String,
    pub webserver_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandSettings {
    pub db_status_probe: String,
    pub db_status_success_marker: String,
    pub start_db: String,
    pub stop_db: String,
    pub network_status_probe: String,
    pub network_status_success_marker: String,
    pub promote: String,
    pub delta_resync: String,
    pub full_rebuild: String,
    pub create_data_dirs: String,
    pub remove_data_dirs: String,
}

impl Settings {
    /// Loads layered configuration: a TOML file named by `CLUSTER_MONITOR_CONFIG`
    /// (default `config.toml`), overridden by `CLUSTER_MONITOR_*` environment
    /// variables, following the project's existing `config::Config::builder()`
    /// convention.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            env::var("CLUSTER_MONITOR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let raw = config::Config::builder()
            .add_source(config::File::with_name(&config_path))
            .add_source(config::Environment::with_prefix("CLUSTER_MONITOR").separator("__"))
            .build()?;

        raw.try_deserialize()
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::new(
            self.cluster
                .iter()
                .map(|e| (e.node_id.clone(), e.connection_string.clone()))
                .collect(),
        )
    }
}
