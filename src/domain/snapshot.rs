use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::node::{ClusterConfig, NodeId, NodeObservation, NodeRole};
use crate::probe::NodeProbe;

/// Mapping NodeId -> NodeObservation plus the derived sets and hysteresis
/// timers.
///
/// Created once at startup from the static configured node list and
/// refreshed in place every tick; observations are replaced wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub observations: HashMap<NodeId, NodeObservation>,
    pub connected_primaries: HashSet<NodeId>,
    pub connected_replicas: HashSet<NodeId>,
    pub no_primary_since: Option<DateTime<Utc>>,
    pub multi_primary_since: Option<DateTime<Utc>>,
}

impl ClusterSnapshot {
    pub fn new(cluster: &ClusterConfig) -> Self {
        let observations = cluster
            .iter()
            .map(|(id, _)| (id.clone(), NodeObservation::disconnected()))
            .collect();
        ClusterSnapshot {
            observations,
            connected_primaries: HashSet::new(),
            connected_replicas: HashSet::new(),
            no_primary_since: None,
            multi_primary_since: None,
        }
    }

    /// Probes every configured node (concurrently - per-node results are
    /// independent, so fan-out order has no effect on the result), replaces
    /// every observation, recomputes the derived sets, and applies the
    /// timer invariants.
    pub async fn refresh(&mut self, cluster: &ClusterConfig, probe: &NodeProbe) {
        let probes = cluster.iter().map(|(id, conn_str)| {
            let id = id.clone();
            let conn_str = conn_str.to_string();
            async move {
                let obs = probe.probe(&conn_str).await;
                (id, obs)
            }
        });
        let results = join_all(probes).await;

        self.observations.clear();
        self.connected_primaries.clear();
        self.connected_replicas.clear();

        for (id, obs) in results {
            if obs.connected {
                match obs.role {
                    NodeRole::Master => {
                        self.connected_primaries.insert(id.clone());
                    }
                    NodeRole::Standby => {
                        self.connected_replicas.insert(id.clone());
                    }
                    NodeRole::Unknown => {
                        warn!(node = %id, "connected node reported unknown role, discarding its role classification");
                    }
                }
            }
            self.observations.insert(id, obs);
        }

        self.apply_timer_invariants();
    }

    fn apply_timer_invariants(&mut self) {
        let now = Utc::now();
        match self.connected_primaries.len() {
            1 => {
                self.no_primary_since = None;
                self.multi_primary_since = None;
            }
            0 => {
                if self.no_primary_since.is_none() {
                    self.no_primary_since = Some(now);
                }
                self.multi_primary_since = None;
            }
            _ => {
                if self.multi_primary_since.is_none() {
                    self.multi_primary_since = Some(now);
                }
                self.no_primary_since = None;
            }
        }
        debug!(
            primaries = self.connected_primaries.len(),
            replicas = self.connected_replicas.len(),
            "snapshot refreshed"
        );
    }

    pub fn observation(&self, node: &str) -> Option<&NodeObservation> {
        self.observations.get(node)
    }
}
