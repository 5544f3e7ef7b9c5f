//! Seams to the supervisor's external collaborators: config validation,
//! audit logging, and the fire-and-forget notification fan-out that runs on
//! lifecycle transitions.

use std::path::Path;

use warden_process::{ConsoleLineKind, ServerEvent, SessionToken};

/// Result of validating the managed server's own configuration file.
/// Validation itself is a collaborator concern; the supervisor only needs
/// the verdict and the detected endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub errors: Option<String>,
    pub warnings: Option<String>,
    pub connect_endpoint: Option<String>,
}

pub trait SpawnValidator: Send + Sync {
    fn validate(&self, cfg_path: &Path, data_path: &Path) -> anyhow::Result<ValidationOutcome>;
}

/// Minimal built-in validator: checks the cfg file is readable and reports
/// a caller-supplied endpoint. Real deployments plug in their own.
pub struct CfgFileValidator {
    pub connect_endpoint: String,
}

impl SpawnValidator for CfgFileValidator {
    fn validate(&self, cfg_path: &Path, _data_path: &Path) -> anyhow::Result<ValidationOutcome> {
        match std::fs::metadata(cfg_path) {
            Ok(m) if m.is_file() => Ok(ValidationOutcome {
                errors: None,
                warnings: None,
                connect_endpoint: Some(self.connect_endpoint.clone()),
            }),
            Ok(_) => Ok(ValidationOutcome {
                errors: Some(format!("{} is not a file", cfg_path.display())),
                ..Default::default()
            }),
            Err(err) => Ok(ValidationOutcome {
                errors: Some(format!("cfg file unreadable ({}): {err}", cfg_path.display())),
                ..Default::default()
            }),
        }
    }
}

/// Structured sinks for everything the managed server prints or receives.
pub trait ServerLogger: Send + Sync {
    fn log_spawn(&self, pid: u32);
    fn log_system_command(&self, command: &str);
    fn log_admin_command(&self, author: &str, command: &str);
    fn write_console(&self, kind: ConsoleLineKind, line: &str);
}

/// Default logger backed by `tracing`.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl ServerLogger for TracingLogger {
    fn log_spawn(&self, pid: u32) {
        tracing::info!(pid, "managed server spawned");
    }

    fn log_system_command(&self, command: &str) {
        tracing::debug!(command, "system command sent");
    }

    fn log_admin_command(&self, author: &str, command: &str) {
        tracing::info!(author, command, "admin command sent");
    }

    fn write_console(&self, kind: ConsoleLineKind, line: &str) {
        tracing::trace!(?kind, line, "console output");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementKind {
    Success,
    Warning,
    Danger,
}

/// Outward-facing announcement (Discord or similar), best-effort only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub kind: AnnouncementKind,
    pub message: String,
}

/// Lifecycle notification hooks. Every method is best-effort: the
/// supervisor wraps each call with [`best_effort`] and never lets a failure
/// here affect the primary operation. Default implementations are no-ops so
/// hosts implement only what they consume.
pub trait SupervisorHooks: Send + Sync {
    /// A new session is about to start; invalidate the outward-facing auth
    /// token used by the web layer.
    fn reset_web_token(&self) {}

    /// Reset internal monitoring statistics for the new session.
    fn reset_monitor_state(&self) {}

    /// Reset buffered player-list state, keyed by the new session token.
    fn reset_player_list(&self, _session: &SessionToken) {}

    fn announce(&self, _announcement: &Announcement) -> anyhow::Result<()> {
        Ok(())
    }

    /// Push a status refresh to connected admin UIs.
    fn broadcast_status(&self) {}

    fn scheduler_server_closed(&self) {}

    fn resources_server_closed(&self) {}

    fn player_list_server_closed(&self, _session: &SessionToken) {}

    /// Metrics recorder for the closed session.
    fn record_server_close(&self, _reason: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Structured event arrived on the auxiliary pipe.
    fn handle_server_event(&self, _event: &ServerEvent, _session: &SessionToken) {}

    /// Autostart is skipped when no admin accounts exist yet.
    fn has_admins(&self) -> bool {
        true
    }

    /// Runtime settings to re-push into the live server after a config
    /// change, as `(set_command, key, value)` triples.
    fn mutable_settings(&self) -> Vec<(String, String, String)> {
        Vec::new()
    }
}

/// No-op hooks for hosts (and tests) that don't care.
#[derive(Debug, Default)]
pub struct NoopHooks;

impl SupervisorHooks for NoopHooks {}

/// Runs a best-effort collaborator call: failures are logged with context
/// and swallowed, never propagated to the primary operation.
pub fn best_effort(label: &str, result: anyhow::Result<()>) {
    if let Err(err) = result {
        tracing::warn!(label, error = format!("{err:#}"), "best-effort call failed");
    }
}
