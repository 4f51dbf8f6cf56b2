use thiserror::Error;

use super::settings::Settings;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cluster_scan_period_sec must be greater than zero")]
    ZeroScanPeriod,

    #[error("timeout_to_failover_sec must be greater than zero")]
    ZeroFailoverTimeout,

    #[error("timeout_to_downgrade_master_sec must be greater than zero")]
    ZeroDowngradeTimeout,

    #[error("the cluster section must declare at least one node")]
    EmptyClusterMap,

    #[error("local_node_host_name '{0}' is not present in the cluster section")]
    LocalNodeNotInCluster(String),

    #[error("webserver_port must be nonzero")]
    ZeroWebserverPort,
}

/// Rejects impossible configuration values before the monitor loop starts.
/// Timeouts of zero would make every tick act immediately instead of
/// honoring hysteresis; an empty or mismatched node map would make the
/// local node's own role undecidable.
pub fn validate(settings: &Settings) -> Result<(), ValidationError> {
    if settings.main.cluster_scan_period_sec == 0 {
        return Err(ValidationError::ZeroScanPeriod);
    }
    if settings.main.timeout_to_failover_sec == 0 {
        return Err(ValidationError::ZeroFailoverTimeout);
    }
    if settings.main.timeout_to_downgrade_master_sec == 0 {
        return Err(ValidationError::ZeroDowngradeTimeout);
    }
    if settings.main.webserver_port == 0 {
        return Err(ValidationError::ZeroWebserverPort);
    }
    if settings.cluster.is_empty() {
        return Err(ValidationError::EmptyClusterMap);
    }
    if !settings
        .cluster
        .iter()
        .any(|e| e.node_id == settings.main.local_node_host_name)
    {
        return Err(ValidationError::LocalNodeNotInCluster(
            settings.main.local_node_host_name.clone(),
        ));
    }
    Ok(())
}
