use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The host name configured for a node; the unique key for a node in the cluster.
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Unknown,
    Master,
    Standby,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Unknown => write!(f, "UNKNOWN"),
            NodeRole::Master => write!(f, "MASTER"),
            NodeRole::Standby => write!(f, "STANDBY"),
        }
    }
}

impl Default for NodeRole {
    fn default() -> Self {
        NodeRole::Unknown
    }
}

/// One node's observable state, produced by `NodeProbe::probe`.
///
/// `connected = false` implies every other field may be stale and must not
/// drive decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeObservation {
    pub connected: bool,
    pub last_successful_probe_time: Option<DateTime<Utc>>,
    pub role: NodeRole,
    pub db_time: Option<String>,
    pub db_size_bytes: Option<i64>,
    pub replication_position: Option<String>,
    pub replication_position_number: u64,
    pub synchronous_standby_names: String,
    pub wal_size_pretty: String,
    pub wal_file_count: i64,
    pub primary_conninfo: String,
    pub primary_slot_name: String,
    pub replication_slot_count: i64,
}

impl Default for NodeObservation {
    fn default() -> Self {
        NodeObservation {
            connected: false,
            last_successful_probe_time: None,
            role: NodeRole::Unknown,
            db_time: None,
            db_size_bytes: None,
            replication_position: None,
            replication_position_number: 0,
            synchronous_standby_names: String::new(),
            wal_size_pretty: String::new(),
            wal_file_count: 0,
            primary_conninfo: String::new(),
            primary_slot_name: String::new(),
            replication_slot_count: 0,
        }
    }
}

impl NodeObservation {
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// The statically configured node list: `NodeId -> connection string`,
/// preserving the order nodes were declared in the config file.
///
/// A `HashMap` would lose that order, and the failover tie-break is
/// defined in terms of "first-seen in the configured map" - every
/// instance must iterate nodes the same way, so the order has to come
/// from somewhere deterministic: the config file itself.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    entries: Vec<(NodeId, String)>,
}

impl ClusterConfig {
    pub fn new(entries: Vec<(NodeId, String)>) -> Self {
        ClusterConfig { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &str)> {
        self.entries.iter().map(|(id, cs)| (id, cs.as_str()))
    }

    pub fn connection_string(&self, node: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| id == node)
            .map(|(_, cs)| cs.as_str())
    }

    pub fn contains(&self, node: &str) -> bool {
        self.entries.iter().any(|(id, _)| id == node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of `node` in configuration order, used to break ties on
    /// equal replication positions deterministically.
    pub fn order_index(&self, node: &str) -> Option<usize> {
        self.entries.iter().position(|(id, _)| id == node)
    }
}
