//! Shell command execution with placeholder substitution.
//!
//! The configured commands are opaque shell strings; the design
//! deliberately does not tokenize them and trusts the operator. Do not
//! interpolate untrusted values into these strings.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Runs `command` through a shell and returns its combined stdout+stderr
    /// as text. Never fails the caller - a spawn failure is reported as
    /// empty output with a logged warning, so callers can always treat the
    /// result as plain text.
    async fn run(&self, command: &str) -> String;
}

pub struct RealShellExecutor;

#[async_trait]
impl ShellExecutor for RealShellExecutor {
    async fn run(&self, command: &str) -> String {
        let output = Command::new("sh").arg("-c").arg(command).output().await;
        match output {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                text
            }
            Err(e) => {
                warn!(command, error = %e, "failed to spawn shell command");
                String::new()
            }
        }
    }
}

/// Replaces the named placeholders in a configured command string with
/// their concrete values. Unknown placeholders are left untouched.
pub fn substitute(
    template: &str,
    pg_data_path: Option<&str>,
    master_connstr: Option<&str>,
    slot_name: Option<&str>,
) -> String {
    let mut result = template.to_string();
    if let Some(v) = pg_data_path {
        result = result.replace("%pg_data_path%", v);
    }
    if let Some(v) = master_connstr {
        result = result.replace("%master_connstr%", v);
    }
    if let Some(v) = slot_name {
        result = result.replace("%slot_name%", v);
    }
    result
}
