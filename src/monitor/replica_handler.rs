use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::actions::LocalActions;
use crate::connstring;
use crate::domain::{ClusterConfig, ClusterSnapshot, NodeId};

/// Activated when the local node's observed role is STANDBY.
pub struct ReplicaHandler {
    local_node: NodeId,
    failover_timeout: Duration,
    slot_name: String,
    cluster: Arc<ClusterConfig>,
    actions: Arc<dyn LocalActions>,
}

impl ReplicaHandler {
    pub fn new(
        local_node: NodeId,
        failover_timeout: Duration,
        slot_name: String,
        cluster: Arc<ClusterConfig>,
        actions: Arc<dyn LocalActions>,
    ) -> Self {
        ReplicaHandler {
            local_node,
            failover_timeout,
            slot_name,
            cluster,
            actions,
        }
    }

    pub async fn handle(&self, snapshot: &ClusterSnapshot) {
        if !self.actions.check_network_connection().await {
            warn!("local network gate failed, skipping tick");
            return;
        }

        match snapshot.connected_primaries.len() {
            1 => self.check_following_master(snapshot).await,
            0 => self.consider_failover(snapshot).await,
            _ => {} // wait for primary-side arbitration to converge
        }
    }

    async fn check_following_master(&self, snapshot: &ClusterSnapshot) {
        let Some(local) = snapshot.observation(&self.local_node) else {
            return;
        };
        let primary_id = snapshot
            .connected_primaries
            .iter()
            .next()
            .expect("exactly one connected primary");
        let Some(primary_connstr) = self.cluster.connection_string(primary_id) else {
            return;
        };

        let local_fields = match connstring::parse(&local.primary_conninfo) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "could not parse local primary_conninfo, skipping follow-check");
                return;
            }
        };
        let primary_fields = match connstring::parse(primary_connstr) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "could not parse configured primary connection string, skipping follow-check");
                return;
            }
        };

        let matches = ["host", "user", "password"]
            .iter()
            .all(|k| local_fields.get(*k) == primary_fields.get(*k));

        if matches {
            return;
        }

        info!(primary = %primary_id, "local replica is not following the observed primary, rewriting primary_conninfo");
        if let Err(e) = self
            .actions
            .alter_and_reload("primary_conninfo", primary_connstr)
            .await
        {
            warn!(error = %e, "failed to rewrite primary_conninfo");
        }
    }

    async fn consider_failover(&self, snapshot: &ClusterSnapshot) {
        let Some(since) = snapshot.no_primary_since else {
            return;
        };
        let Ok(timeout) = chrono::Duration::from_std(self.failover_timeout) else {
            return;
        };
        if Utc::now() - since < timeout {
            return; // hysteresis
        }

        let Some(winner) = highest_replication_position(snapshot, &self.cluster, &snapshot.connected_replicas) else {
            return;
        };

        if winner != self.local_node {
            return;
        }

        info!("local replica holds the highest replication position after the failover timeout, promoting");
        if let Err(e) = self.actions.promote(&self.slot_name).await {
            warn!(error = %e, "promotion failed");
        }
    }
}

/// Determines which connected replica has the unique highest
/// `replication_position_number`. Iterates in configuration order so that,
/// on a tie, the first-seen node wins deterministically: a later
/// candidate matching (not exceeding) the running best does not
/// displace it.
fn highest_replication_position(
    snapshot: &ClusterSnapshot,
    cluster: &ClusterConfig,
    candidates: &std::collections::HashSet<NodeId>,
) -> Option<NodeId> {
    let mut best: Option<(NodeId, u64)> = None;
    for (id, _) in cluster.iter() {
        if !candidates.contains(id) {
            continue;
        }
        let Some(obs) = snapshot.observation(id) else {
            continue;
        };
        match &best {
            None => best = Some((id.clone(), obs.replication_position_number)),
            Some((_, best_pos)) if obs.replication_position_number > *best_pos => {
                best = Some((id.clone(), obs.replication_position_number))
            }
            _ => {}
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeObservation, NodeRole};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingActions {
        network_ok: std::sync::atomic::AtomicBool,
        alters: Mutex<Vec<(String, String)>>,
        promotions: Mutex<Vec<String>>,
    }

    impl RecordingActions {
        fn online() -> Self {
            RecordingActions {
                network_ok: std::sync::atomic::AtomicBool::new(true),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl LocalActions for RecordingActions {
        async fn ensure_local_db_up(&self) -> bool {
            true
        }
        async fn check_network_connection(&self) -> bool {
            self.network_ok.load(std::sync::atomic::Ordering::SeqCst)
        }
        async fn alter_and_reload(&self, name: &str, value: &str) -> Result<(), crate::error::AppError> {
            self.alters.lock().unwrap().push((name.to_string(), value.to_string()));
            Ok(())
        }
        async fn promote(&self, slot_name: &str) -> Result<(), crate::error::AppError> {
            self.promotions.lock().unwrap().push(slot_name.to_string());
            Ok(())
        }
        async fn downgrade_by_resync(&self, _master_connstr: &str, _slot_name: &str) {}
    }

    fn snapshot_with(nodes: Vec<(&str, NodeObservation)>) -> ClusterSnapshot {
        let cluster = ClusterConfig::new(nodes.iter().map(|(id, _)| (id.to_string(), String::new())).collect());
        let mut snap = ClusterSnapshot::new(&cluster);
        for (id, obs) in nodes {
            if obs.connected && obs.role == NodeRole::Master {
                snap.connected_primaries.insert(id.to_string());
            }
            if obs.connected && obs.role == NodeRole::Standby {
                snap.connected_replicas.insert(id.to_string());
            }
            snap.observations.insert(id.to_string(), obs);
        }
        snap
    }

    #[tokio::test]
    async fn scenario_1_matching_primary_conninfo_does_nothing() {
        let a = NodeObservation {
            connected: true,
            role: NodeRole::Master,
            db_size_bytes: Some(1000),
            ..NodeObservation::default()
        };
        let b = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            replication_position: Some("0/21B1A540".to_string()),
            primary_conninfo: "host=node-a user=repl password=secret".to_string(),
            ..NodeObservation::default()
        };
        let snap = snapshot_with(vec![("node-a", a), ("node-b", b)]);
        let cluster = Arc::new(ClusterConfig::new(vec![
            ("node-a".to_string(), "host=node-a user=repl password=secret".to_string()),
            ("node-b".to_string(), String::new()),
        ]));
        let actions = Arc::new(RecordingActions::online());
        let handler = ReplicaHandler::new("node-b".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster, actions.clone());
        handler.handle(&snap).await;
        assert!(actions.alters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scenario_2_mismatched_host_rewrites_primary_conninfo() {
        let a = NodeObservation {
            connected: true,
            role: NodeRole::Master,
            db_size_bytes: Some(1000),
            ..NodeObservation::default()
        };
        let b = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            primary_conninfo: "host=node-c user=repl password=secret".to_string(),
            ..NodeObservation::default()
        };
        let snap = snapshot_with(vec![("node-a", a), ("node-b", b)]);
        let cluster = Arc::new(ClusterConfig::new(vec![
            ("node-a".to_string(), "host=node-a user=repl password=secret".to_string()),
            ("node-b".to_string(), String::new()),
        ]));
        let actions = Arc::new(RecordingActions::online());
        let handler = ReplicaHandler::new("node-b".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster, actions.clone());
        handler.handle(&snap).await;
        assert_eq!(
            actions.alters.lock().unwrap().as_slice(),
            &[("primary_conninfo".to_string(), "host=node-a user=repl password=secret".to_string())]
        );
    }

    #[tokio::test]
    async fn scenario_3_promotes_winner_not_loser() {
        let b = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            replication_position: Some("0/100".to_string()),
            replication_position_number: 0x100,
            ..NodeObservation::default()
        };
        let c = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            replication_position: Some("0/200".to_string()),
            replication_position_number: 0x200,
            ..NodeObservation::default()
        };
        let mut snap = snapshot_with(vec![("b", b), ("c", c)]);
        snap.no_primary_since = Some(Utc::now() - chrono::Duration::seconds(30));
        let cluster = Arc::new(ClusterConfig::new(vec![("b".to_string(), String::new()), ("c".to_string(), String::new())]));

        let actions_c = Arc::new(RecordingActions::online());
        ReplicaHandler::new("c".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster.clone(), actions_c.clone())
            .handle(&snap)
            .await;
        assert_eq!(actions_c.promotions.lock().unwrap().as_slice(), &["slot1".to_string()]);

        let actions_b = Arc::new(RecordingActions::online());
        ReplicaHandler::new("b".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster, actions_b.clone())
            .handle(&snap)
            .await;
        assert!(actions_b.promotions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scenario_4_tied_position_first_configured_node_wins() {
        let b = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            replication_position_number: 0x200,
            ..NodeObservation::default()
        };
        let c = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            replication_position_number: 0x200,
            ..NodeObservation::default()
        };
        let mut snap = snapshot_with(vec![("b", b), ("c", c)]);
        snap.no_primary_since = Some(Utc::now() - chrono::Duration::seconds(30));
        let cluster = Arc::new(ClusterConfig::new(vec![("b".to_string(), String::new()), ("c".to_string(), String::new())]));

        let actions_b = Arc::new(RecordingActions::online());
        ReplicaHandler::new("b".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster.clone(), actions_b.clone())
            .handle(&snap)
            .await;
        assert_eq!(actions_b.promotions.lock().unwrap().len(), 1);

        let actions_c = Arc::new(RecordingActions::online());
        ReplicaHandler::new("c".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster, actions_c.clone())
            .handle(&snap)
            .await;
        assert!(actions_c.promotions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn network_gate_skips_tick_entirely() {
        let b = NodeObservation {
            connected: true,
            role: NodeRole::Standby,
            replication_position_number: 0x200,
            ..NodeObservation::default()
        };
        let mut snap = snapshot_with(vec![("b", b)]);
        snap.no_primary_since = Some(Utc::now() - chrono::Duration::seconds(30));
        let cluster = Arc::new(ClusterConfig::new(vec![("b".to_string(), String::new())]));
        let actions = Arc::new(RecordingActions::default()); // network_ok = false
        ReplicaHandler::new("b".to_string(), Duration::from_secs(20), "slot1".to_string(), cluster, actions.clone())
            .handle(&snap)
            .await;
        assert!(actions.promotions.lock().unwrap().is_empty());
    }
}
