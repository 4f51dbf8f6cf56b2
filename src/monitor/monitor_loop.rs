use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::actions::LocalActions;
use crate::domain::{ClusterConfig, ClusterSnapshot, NodeRole};
use crate::monitor::primary_handler::PrimaryHandler;
use crate::monitor::replica_handler::ReplicaHandler;
use crate::probe::NodeProbe;

/// Periodic driver: ensures the local database is up,
/// refreshes the snapshot, dispatches to the right handler by local role,
/// and sleeps for the configured scan period. Any error from a tick is
/// logged and the loop continues - nothing in the loop is fatal.
pub struct MonitorLoop {
    local_node: String,
    scan_period: Duration,
    cluster: Arc<ClusterConfig>,
    snapshot: Arc<RwLock<ClusterSnapshot>>,
    probe: NodeProbe,
    actions: Arc<dyn LocalActions>,
    primary_handler: PrimaryHandler,
    replica_handler: ReplicaHandler,
}

impl MonitorLoop {
    pub fn new(
        local_node: String,
        scan_period: Duration,
        cluster: Arc<ClusterConfig>,
        snapshot: Arc<RwLock<ClusterSnapshot>>,
        actions: Arc<dyn LocalActions>,
        primary_handler: PrimaryHandler,
        replica_handler: ReplicaHandler,
    ) -> Self {
        MonitorLoop {
            local_node,
            scan_period,
            cluster,
            snapshot,
            probe: NodeProbe::new(),
            actions,
            primary_handler,
            replica_handler,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!("stop signal observed, monitor loop exiting");
                return;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "unexpected error in tick body, continuing");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.scan_period) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("stop signal observed during sleep, monitor loop exiting");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), crate::error::AppError> {
        if !self.actions.ensure_local_db_up().await {
            debug!("local database was not up, start issued; skipping rest of tick");
            return Ok(());
        }

        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.refresh(&self.cluster, &self.probe).await;
        }

        let snapshot = self.snapshot.read().await;

        match decide_dispatch(&self.local_node, &self.cluster, &snapshot) {
            DispatchDecision::NotInCluster => {
                warn!(node = %self.local_node, "local node is not present in the configured cluster, skipping");
            }
            DispatchDecision::NoObservation => {}
            DispatchDecision::NotConnected => {
                debug!("local node did not respond to its own probe this tick, skipping");
            }
            DispatchDecision::UnknownRole => {
                warn!("local node connected but reported an unknown role, skipping");
            }
            DispatchDecision::Role(NodeRole::Master) => {
                self.primary_handler.handle(&snapshot).await;
            }
            DispatchDecision::Role(NodeRole::Standby) => {
                self.replica_handler.handle(&snapshot).await;
            }
            DispatchDecision::Role(NodeRole::Unknown) => unreachable!(),
        }

        Ok(())
    }
}

/// What a tick should do with the local node's own observation, factored
/// out of `tick` so the skip conditions of §4.6 are testable without a
/// live `NodeProbe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchDecision {
    NotInCluster,
    NoObservation,
    NotConnected,
    UnknownRole,
    Role(NodeRole),
}

fn decide_dispatch(
    local_node: &str,
    cluster: &ClusterConfig,
    snapshot: &ClusterSnapshot,
) -> DispatchDecision {
    if !cluster.contains(local_node) {
        return DispatchDecision::NotInCluster;
    }
    let Some(local_obs) = snapshot.observation(local_node) else {
        return DispatchDecision::NoObservation;
    };
    if !local_obs.connected {
        return DispatchDecision::NotConnected;
    }
    match local_obs.role {
        NodeRole::Unknown => DispatchDecision::UnknownRole,
        role => DispatchDecision::Role(role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeObservation;

    fn snapshot_with(nodes: Vec<(&str, NodeObservation)>) -> ClusterSnapshot {
        let cluster = ClusterConfig::new(
            nodes.iter().map(|(id, _)| (id.to_string(), String::new())).collect(),
        );
        let mut snap = ClusterSnapshot::new(&cluster);
        for (id, obs) in nodes {
            snap.observations.insert(id.to_string(), obs);
        }
        snap
    }

    #[test]
    fn local_node_not_in_configured_cluster_is_skipped() {
        let cluster = ClusterConfig::new(vec![("a".to_string(), String::new())]);
        let snap = snapshot_with(vec![("a", NodeObservation::default())]);
        assert_eq!(
            decide_dispatch("missing", &cluster, &snap),
            DispatchDecision::NotInCluster
        );
    }

    #[test]
    fn local_node_with_no_observation_is_skipped_silently() {
        let cluster = ClusterConfig::new(vec![("a".to_string(), String::new())]);
        let snap = snapshot_with(vec![]);
        assert_eq!(
            decide_dispatch("a", &cluster, &snap),
            DispatchDecision::NoObservation
        );
    }

    #[test]
    fn local_node_not_connected_is_skipped() {
        let cluster = ClusterConfig::new(vec![("a".to_string(), String::new())]);
        let snap = snapshot_with(vec![("a", NodeObservation::disconnected())]);
        assert_eq!(
            decide_dispatch("a", &cluster, &snap),
            DispatchDecision::NotConnected
        );
    }

    #[test]
    fn connected_master_dispatches_to_primary_handler() {
        let cluster = ClusterConfig::new(vec![("a".to_string(), String::new())]);
        let obs = NodeObservation {
            connected: true,
            role: NodeRole::Master,
            ..NodeObservation::default()
        };
        let snap = snapshot_with(vec![("a", obs)]);
        assert_eq!(
            decide_dispatch("a", &cluster, &snap),
            DispatchDecision::Role(NodeRole::Master)
        );
    }

    #[test]
    fn connected_standby_dispatches_to_replica_handler() {
        let cluster = ClusterConfig::new(vec![("a".to_string(), String::new())]);
        let obs = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            ..NodeObservation::default()
        };
        let snap = snapshot_with(vec![("a", obs)]);
        assert_eq!(
            decide_dispatch("a", &cluster, &snap),
            DispatchDecision::Role(NodeRole::Standby)
        );
    }

    #[test]
    fn connected_unknown_role_is_skipped() {
        let cluster = ClusterConfig::new(vec![("a".to_string(), String::new())]);
        let obs = NodeObservation {
            connected: true,
            role: NodeRole::Unknown,
            ..NodeObservation::default()
        };
        let snap = snapshot_with(vec![("a", obs)]);
        assert_eq!(
            decide_dispatch("a", &cluster, &snap),
            DispatchDecision::UnknownRole
        );
    }
}
