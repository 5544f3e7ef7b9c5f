/// Failures of the supervisor's primary operations.
///
/// These originate from user-editable external state (configuration, cfg
/// files, concurrent admin actions) or from the OS, so they are returned as
/// values whose `Display` text is shown verbatim to the admin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("Cannot start the server while the host is shutting down.")]
    HostShuttingDown,

    #[error("The server has already started.")]
    AlreadyRunning,

    #[error("Error setting up spawn variables: {0}")]
    SpawnVariables(String),

    #[error("Cannot start the server with missing configuration (dataPath || cfgPath).")]
    NotConfigured,

    #[error("Unable to start the server due to error(s) in your config file(s):\n{0}")]
    ConfigValidation(String),

    #[error("Failed to run {0}")]
    SpawnFailed(String),

    #[error("A shutdown is already in progress, with a delay of {delay}.")]
    ShutdownInProgress { delay: String },

    #[error("A restart is already in progress, with a delay of {delay}.")]
    RestartInProgress { delay: String },

    #[error("Couldn't kill the server.")]
    KillFailed,
}

/// Programmer errors on the command-sending path. These indicate a bug in
/// the calling code, never an operational condition, and are kept separate
/// from the `Ok(false)` "no live process" fast-fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("command name is empty")]
    EmptyCommandName,

    #[error("invalid command name: {0}")]
    InvalidCommandName(String),

    #[error("author must be the system marker or a non-empty admin name")]
    InvalidAuthor,
}
