//! Supervisor for a single managed game-server process: spawn, watch,
//! command, kill, restart. Hosts embed [`Supervisor`] and plug their own
//! collaborators in through the traits in [`hooks`].

pub mod channel;
pub mod config;
pub mod console;
pub mod encoder;
pub mod error;
pub mod hooks;
pub mod restart_script;
pub mod session;
pub mod supervisor;

pub use config::{HostConfig, RestartScriptConfig, ServerConfig};
pub use encoder::{CommandArg, encode_command};
pub use error::{CommandError, SupervisorError};
pub use hooks::{
    Announcement, AnnouncementKind, CfgFileValidator, NoopHooks, ServerLogger, SpawnValidator,
    SupervisorHooks, TracingLogger, ValidationOutcome,
};
pub use supervisor::{RespawnDelay, Supervisor};
