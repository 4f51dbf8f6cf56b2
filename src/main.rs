use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use pg_cluster_monitor::actions::PgLocalActions;
use pg_cluster_monitor::config::{self, Settings};
use pg_cluster_monitor::domain::ClusterSnapshot;
use pg_cluster_monitor::monitor::{MonitorLoop, PrimaryHandler, ReplicaHandler};
use pg_cluster_monitor::shell::RealShellExecutor;
use pg_cluster_monitor::web;
use tokio::sync::{watch, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Retries configuration load indefinitely with a fixed short delay, so
/// the service can be started before its config file is placed.
/// This is deliberately not exponential backoff: there is no remote
/// service to protect from a retry storm here, just a local file that may
/// not exist yet.
async fn load_settings_with_retry() -> Settings {
    loop {
        match Settings::load() {
            Ok(settings) => return settings,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load configuration, retrying in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings_with_retry().await;

    if let Err(e) = config::validate(&settings) {
        error!(error = %e, "configuration failed validation");
        return ExitCode::FAILURE;
    }

    info!(
        local_node = %settings.main.local_node_host_name,
        scan_period_sec = settings.main.cluster_scan_period_sec,
        "configuration loaded"
    );

    let cluster = Arc::new(settings.cluster_config());
    let local_connstr = match cluster.connection_string(&settings.main.local_node_host_name) {
        Some(cs) => cs.to_string(),
        None => {
            error!("local node has no configured connection string");
            return ExitCode::FAILURE;
        }
    };

    let shell = Arc::new(RealShellExecutor);
    let local_actions = match PgLocalActions::new(
        settings.commands.clone(),
        settings.main.pg_data_path.clone(),
        Duration::from_secs(settings.main.timeout_to_check_replication_status_after_start_sec),
        shell,
        &local_connstr,
    ) {
        Ok(actions) => Arc::new(actions),
        Err(e) => {
            error!(error = %e, "failed to initialize local database actions");
            return ExitCode::FAILURE;
        }
    };

    let snapshot = Arc::new(RwLock::new(ClusterSnapshot::new(&cluster)));

    let primary_handler = PrimaryHandler::new(
        settings.main.local_node_host_name.clone(),
        Duration::from_secs(settings.main.timeout_to_downgrade_master_sec),
        settings.main.replication_slot_name.clone(),
        cluster.clone(),
        local_actions.clone(),
    );
    let replica_handler = ReplicaHandler::new(
        settings.main.local_node_host_name.clone(),
        Duration::from_secs(settings.main.timeout_to_failover_sec),
        settings.main.replication_slot_name.clone(),
        cluster.clone(),
        local_actions.clone(),
    );

    let monitor_loop = MonitorLoop::new(
        settings.main.local_node_host_name.clone(),
        Duration::from_secs(settings.main.cluster_scan_period_sec),
        cluster,
        snapshot.clone(),
        local_actions,
        primary_handler,
        replica_handler,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let web_addr = format!(
        "{}:{}",
        settings.main.webserver_address, settings.main.webserver_port
    );
    let listener = match tokio::net::TcpListener::bind(&web_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, address = %web_addr, "failed to bind status endpoint");
            return ExitCode::FAILURE;
        }
    };
    info!(address = %web_addr, "status endpoint listening");

    let app = web::router(snapshot);
    let mut web_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = web_shutdown.changed().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "status endpoint server error");
        }
    });

    let mut monitor_task = tokio::spawn(async move {
        monitor_loop.run(shutdown_rx).await;
    });

    // The control task and the status-server task are the crate's only two
    // top-level units of concurrency. A Ctrl-C, or the monitor
    // loop exiting on its own after observing the stop flag, both lead to
    // the same graceful shutdown: flip the watch channel and let the
    // server finish any in-flight request before returning.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = &mut monitor_task => {
            info!("monitor loop exited on its own");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = monitor_task.await;
    let _ = server_task.await;

    ExitCode::SUCCESS
}
