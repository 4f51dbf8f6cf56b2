//! `NodeProbe`: opens a short-lived connection to one database node and
//! fetches the fixed attribute set that defines its observable state.
//! Never fails the caller; any failure is encoded as
//! `connected = false` and logged.

use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection, Row};
use tracing::{debug, warn};

use crate::connstring;
use crate::domain::node::{NodeObservation, NodeRole};

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeProbe;

impl NodeProbe {
    pub fn new() -> Self {
        NodeProbe
    }

    pub async fn probe(&self, conn_str: &str) -> NodeObservation {
        let opts = match build_connect_options(conn_str) {
            Ok(opts) => opts,
            Err(e) => {
                warn!(error = %e, "could not parse connection string for probe");
                return NodeObservation::disconnected();
            }
        };

        let mut conn = match PgConnection::connect_with(&opts).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(error = %e, "node unreachable");
                return NodeObservation::disconnected();
            }
        };

        if let Err(e) = sqlx::query("SELECT 1").execute(&mut conn).await {
            debug!(error = %e, "liveness query failed");
            return NodeObservation::disconnected();
        }

        let role = match fetch_scalar::<bool>(&mut conn, "SELECT pg_is_in_recovery()").await {
            Some(true) => NodeRole::Standby,
            Some(false) => NodeRole::Master,
            None => {
                // The recovery-flag sub-query is promoted to liveness-equivalent
                // status: a connected node's role is never UNKNOWN, so a
                // failure here degrades the whole probe.
                warn!("recovery-flag query failed on an otherwise-live connection");
                return NodeObservation::disconnected();
            }
        };

        let mut obs = NodeObservation {
            connected: true,
            last_successful_probe_time: Some(chrono::Utc::now()),
            role,
            ..NodeObservation::default()
        };

        obs.db_time = fetch_scalar::<String>(
            &mut conn,
            "select to_char(now(), 'YYYY.MM.DD HH:MI:SS')",
        )
        .await;

        obs.db_size_bytes = fetch_scalar::<i64>(
            &mut conn,
            "SELECT SUM(pg_database_size(pg_database.datname))::bigint FROM pg_database",
        )
        .await;

        obs.replication_position =
            fetch_scalar::<String>(&mut conn, "SELECT pg_last_wal_receive_lsn()::text").await;
        obs.replication_position_number =
            replication_position_to_number(obs.replication_position.as_deref());

        obs.synchronous_standby_names =
            fetch_scalar::<String>(&mut conn, "SHOW synchronous_standby_names")
                .await
                .unwrap_or_default();
        obs.primary_conninfo = fetch_scalar::<String>(&mut conn, "SHOW primary_conninfo")
            .await
            .unwrap_or_default();
        obs.primary_slot_name = fetch_scalar::<String>(&mut conn, "SHOW primary_slot_name")
            .await
            .unwrap_or_default();
        obs.replication_slot_count =
            fetch_scalar::<i64>(&mut conn, "SELECT count(*) from pg_replication_slots")
                .await
                .unwrap_or(0);
        obs.wal_file_count = fetch_scalar::<i64>(
            &mut conn,
            "SELECT count(*) FROM pg_ls_waldir()",
        )
        .await
        .unwrap_or(0);
        obs.wal_size_pretty = fetch_scalar::<String>(
            &mut conn,
            "SELECT pg_size_pretty(COALESCE(SUM(size), 0)) FROM pg_ls_waldir()",
        )
        .await
        .unwrap_or_default();

        obs
    }
}

async fn fetch_scalar<T>(conn: &mut PgConnection, query: &str) -> Option<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + Unpin,
{
    match sqlx::query(query).fetch_one(conn).await {
        Ok(row) => row.try_get::<T, _>(0).ok(),
        Err(e) => {
            debug!(query, error = %e, "sub-query failed, field left unset");
            None
        }
    }
}

fn build_connect_options(conn_str: &str) -> Result<PgConnectOptions, crate::error::AppError> {
    let fields = connstring::parse(conn_str)?;
    let mut opts = PgConnectOptions::new();
    if let Some(host) = fields.get("host") {
        opts = opts.host(host);
    }
    if let Some(port) = fields.get("port") {
        if let Ok(port) = port.parse::<u16>() {
            opts = opts.port(port);
        }
    }
    if let Some(user) = fields.get("user") {
        opts = opts.username(user);
    }
    if let Some(password) = fields.get("password") {
        opts = opts.password(password);
    }
    if let Some(dbname) = fields.get("dbname") {
        opts = opts.database(dbname);
    }
    Ok(opts)
}

/// `HI/LO` hexadecimal WAL position -> unsigned 64-bit integer, via
/// `(HI << 32) | LO`. Empty or null input maps to 0.
pub fn replication_position_to_number(position: Option<&str>) -> u64 {
    let Some(position) = position else {
        return 0;
    };
    if position.is_empty() {
        return 0;
    }
    let Some((hi, lo)) = position.split_once('/') else {
        return 0;
    };
    let hi = u32::from_str_radix(hi, 16).unwrap_or(0) as u64;
    let lo = u32::from_str_radix(lo, 16).unwrap_or(0) as u64;
    (hi << 32) | lo
}
