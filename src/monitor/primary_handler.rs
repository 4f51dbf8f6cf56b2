use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::actions::LocalActions;
use crate::domain::{ClusterConfig, ClusterSnapshot, NodeId};

/// Activated when the local node's observed role is MASTER.
/// Constructed once at startup with its injected timeout and dependencies;
/// dispatch between this and `ReplicaHandler` happens by value on the
/// local node's observed role, not by polymorphism.
pub struct PrimaryHandler {
    local_node: NodeId,
    downgrade_timeout: Duration,
    slot_name: String,
    cluster: Arc<ClusterConfig>,
    actions: Arc<dyn LocalActions>,
}

impl PrimaryHandler {
    pub fn new(
        local_node: NodeId,
        downgrade_timeout: Duration,
        slot_name: String,
        cluster: Arc<ClusterConfig>,
        actions: Arc<dyn LocalActions>,
    ) -> Self {
        PrimaryHandler {
            local_node,
            downgrade_timeout,
            slot_name,
            cluster,
            actions,
        }
    }

    pub async fn handle(&self, snapshot: &ClusterSnapshot) {
        self.maintain_synchronous_replication(snapshot).await;
        if snapshot.connected_primaries.len() > 1 {
            self.consider_downgrade(snapshot).await;
        }
    }

    async fn maintain_synchronous_replication(&self, snapshot: &ClusterSnapshot) {
        let Some(local) = snapshot.observation(&self.local_node) else {
            return;
        };
        let current = local.synchronous_standby_names.as_str();
        if snapshot.connected_replicas.is_empty() {
            if current != "" {
                if let Err(e) = self.actions.alter_and_reload("synchronous_standby_names", "").await {
                    warn!(error = %e, "failed to clear synchronous_standby_names");
                }
            }
        } else if current != "*" {
            if let Err(e) = self.actions.alter_and_reload("synchronous_standby_names", "*").await {
                warn!(error = %e, "failed to set synchronous_standby_names to *");
            }
        }
    }

    async fn consider_downgrade(&self, snapshot: &ClusterSnapshot) {
        let Some(since) = snapshot.multi_primary_since else {
            return;
        };
        let Ok(timeout) = chrono::Duration::from_std(self.downgrade_timeout) else {
            return;
        };
        if Utc::now() - since < timeout {
            return; // hysteresis: tolerate transient duplicate primaries
        }

        let Some(leader) = find_leader_by_size(snapshot, &self.cluster, &snapshot.connected_primaries) else {
            return; // no connected primary reports a size
        };

        if leader == self.local_node {
            return; // local primary is authoritative
        }

        let Some(local_obs) = snapshot.observation(&self.local_node) else {
            return;
        };
        let Some(local_size) = local_obs.db_size_bytes else {
            return;
        };
        let leader_size = snapshot
            .observation(&leader)
            .and_then(|o| o.db_size_bytes)
            .unwrap_or(local_size);

        if leader_size > local_size {
            let Some(master_connstr) = self.cluster.connection_string(&leader) else {
                warn!(leader = %leader, "leader has no configured connection string, skipping downgrade");
                return;
            };
            info!(leader = %leader, "downgrading local primary to replica of strictly-largest peer");
            self.actions
                .downgrade_by_resync(master_connstr, &self.slot_name)
                .await;
        }
        // leader_size == local_size: tie, neither side yields.
    }
}

/// Finds the node with the greatest `db_size_bytes` among `candidates`,
/// ignoring nodes with a null size. Iterates in configuration order and
/// keeps the first node whose size *strictly exceeds* the best seen so
/// far - a later candidate tying the current best does not replace it.
/// This is what makes scenario (5) deterministic: among `{A:100, B:200,
/// C:200}` in that configuration order, B (the first 200) is the leader
/// and C's equal size never displaces it. Returns `None` only when no
/// candidate reports a size at all.
fn find_leader_by_size(
    snapshot: &ClusterSnapshot,
    cluster: &ClusterConfig,
    candidates: &std::collections::HashSet<NodeId>,
) -> Option<NodeId> {
    let mut leader: Option<(NodeId, i64)> = None;
    for (id, _) in cluster.iter() {
        if !candidates.contains(id) {
            continue;
        }
        let Some(size) = snapshot.observation(id).and_then(|o| o.db_size_bytes) else {
            continue;
        };
        match &leader {
            None => leader = Some((id.clone(), size)),
            Some((_, best)) if size > *best => leader = Some((id.clone(), size)),
            _ => {}
        }
    }
    leader.map(|(id, _)| id)
}
