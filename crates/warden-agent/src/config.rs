//! Configuration value objects for the managed server. The supervisor only
//! reads these; ownership stays with the host's config store, which shares
//! them behind a lock and pings `Supervisor::handle_config_update` with the
//! changed key set.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Config key for the restart-script block, as reported by the host's
/// change notifications.
pub const KEY_RESTART_SCRIPT: &str = "server.restartScript";

const MAX_SHUTDOWN_NOTICE_DELAY_MS: u64 = 60_000;
const MAX_RESTART_SPAWN_DELAY_MS: u64 = 15_000;
const MAX_RESTART_SCRIPT_DELAY_MS: u64 = 300_000;

/// Post-shutdown auxiliary script settings. Consumed read-only by the
/// script launcher.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RestartScriptConfig {
    pub enabled: bool,
    pub script_path: String,
    pub working_directory: String,
    pub args: String,
    pub message_pattern: String,
    pub delay_ms: u64,
}

impl Default for RestartScriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            script_path: String::new(),
            working_directory: String::new(),
            args: String::new(),
            message_pattern: "restart".to_string(),
            delay_ms: 2000,
        }
    }
}

fn clean_str(s: &str) -> String {
    s.trim().replace('\0', "")
}

impl RestartScriptConfig {
    /// Normalizes externally-sourced values: trimmed strings, no NUL
    /// characters, delay clamped to the schema range.
    pub fn sanitize(&self) -> Self {
        Self {
            enabled: self.enabled,
            script_path: clean_str(&self.script_path),
            working_directory: clean_str(&self.working_directory),
            args: clean_str(&self.args),
            message_pattern: clean_str(&self.message_pattern),
            delay_ms: self.delay_ms.min(MAX_RESTART_SCRIPT_DELAY_MS),
        }
    }
}

/// Managed-server settings the supervisor consumes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server_name: String,
    /// Path to the managed server executable.
    pub server_binary: Option<PathBuf>,
    /// Server data directory; also the child's working directory.
    pub data_path: Option<PathBuf>,
    /// Main config file, absolute or relative to `data_path`.
    pub cfg_path: String,
    pub startup_args: Vec<String>,
    pub auto_start: bool,
    pub quiet: bool,
    pub shutdown_notice_delay_ms: u64,
    pub restart_spawn_delay_ms: u64,
    pub restart_script: RestartScriptConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "unnamed server".to_string(),
            server_binary: None,
            data_path: None,
            cfg_path: "server.cfg".to_string(),
            startup_args: Vec::new(),
            auto_start: true,
            quiet: false,
            shutdown_notice_delay_ms: 5000,
            restart_spawn_delay_ms: 500,
            restart_script: RestartScriptConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn sanitize(&self) -> Self {
        Self {
            shutdown_notice_delay_ms: self.shutdown_notice_delay_ms.min(MAX_SHUTDOWN_NOTICE_DELAY_MS),
            restart_spawn_delay_ms: self.restart_spawn_delay_ms.min(MAX_RESTART_SPAWN_DELAY_MS),
            restart_script: self.restart_script.sanitize(),
            ..self.clone()
        }
    }

    /// Both the data path and the cfg path must be set before a spawn is
    /// even attempted.
    pub fn is_configured(&self) -> bool {
        self.data_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
            && !self.cfg_path.is_empty()
    }

    /// The cfg file path resolved against the data directory.
    pub fn resolved_cfg_path(&self) -> Option<PathBuf> {
        let data_path = self.data_path.as_ref()?;
        let cfg = Path::new(&self.cfg_path);
        if cfg.is_absolute() {
            Some(cfg.to_path_buf())
        } else {
            Some(data_path.join(cfg))
        }
    }

    /// Resolves everything needed to spawn the child, or a human-readable
    /// message describing what is missing.
    pub fn spawn_variables(&self) -> Result<SpawnVariables, String> {
        let bin = self
            .server_binary
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| "server binary path is not set".to_string())?;
        let data_path = self
            .data_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| "server data path is not set".to_string())?;
        let cfg_path = self
            .resolved_cfg_path()
            .ok_or_else(|| "cfg file path is not set".to_string())?;

        Ok(SpawnVariables {
            bin,
            args: self.startup_args.clone(),
            data_path,
            cfg_path,
            server_name: self.server_name.clone(),
        })
    }
}

/// Everything resolved at spawn time, captured before the child starts so
/// later config edits cannot race the spawn sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnVariables {
    pub bin: PathBuf,
    pub args: Vec<String>,
    pub data_path: PathBuf,
    pub cfg_path: PathBuf,
    pub server_name: String,
}

/// Top-level host config file.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub server: ServerConfig,
}

impl HostConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let mut cfg: HostConfig =
            toml::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))?;
        cfg.server = cfg.server.sanitize();
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_schema() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.shutdown_notice_delay_ms, 5000);
        assert_eq!(cfg.restart_spawn_delay_ms, 500);
        assert_eq!(cfg.restart_script.message_pattern, "restart");
        assert_eq!(cfg.restart_script.delay_ms, 2000);
        assert!(!cfg.restart_script.enabled);
        assert!(cfg.auto_start);
    }

    #[test]
    fn sanitize_clamps_delays() {
        let cfg = ServerConfig {
            shutdown_notice_delay_ms: 120_000,
            restart_spawn_delay_ms: 60_000,
            restart_script: RestartScriptConfig {
                delay_ms: 1_000_000,
                ..Default::default()
            },
            ..Default::default()
        }
        .sanitize();
        assert_eq!(cfg.shutdown_notice_delay_ms, 60_000);
        assert_eq!(cfg.restart_spawn_delay_ms, 15_000);
        assert_eq!(cfg.restart_script.delay_ms, 300_000);
    }

    #[test]
    fn sanitize_strips_nul_and_whitespace() {
        let script = RestartScriptConfig {
            script_path: "  C:\\scripts\\after.bat\0 ".to_string(),
            ..Default::default()
        }
        .sanitize();
        assert_eq!(script.script_path, "C:\\scripts\\after.bat");
    }

    #[test]
    fn is_configured_needs_both_paths() {
        let mut cfg = ServerConfig::default();
        assert!(!cfg.is_configured());
        cfg.data_path = Some(PathBuf::from("/srv/data"));
        assert!(cfg.is_configured());
        cfg.cfg_path = String::new();
        assert!(!cfg.is_configured());
    }

    #[test]
    fn cfg_path_resolves_relative_to_data_path() {
        let cfg = ServerConfig {
            data_path: Some(PathBuf::from("/srv/data")),
            cfg_path: "server.cfg".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_cfg_path(), Some(PathBuf::from("/srv/data/server.cfg")));

        let abs = ServerConfig {
            data_path: Some(PathBuf::from("/srv/data")),
            cfg_path: "/etc/srv/server.cfg".to_string(),
            ..Default::default()
        };
        assert_eq!(abs.resolved_cfg_path(), Some(PathBuf::from("/etc/srv/server.cfg")));
    }

    #[test]
    fn spawn_variables_reports_missing_binary() {
        let cfg = ServerConfig {
            data_path: Some(PathBuf::from("/srv/data")),
            ..Default::default()
        };
        let err = cfg.spawn_variables().unwrap_err();
        assert!(err.contains("binary"));
    }
}
