//! The process supervisor: owns at most one live managed-server process,
//! drives the spawn / notice-delay / kill / respawn-delay state machine,
//! and fans lifecycle transitions out to the host's collaborators.
//!
//! All state transitions happen on one logical control path: the inner
//! state lock is never held across an await point, and the only suspension
//! points are the two named delays plus the spawn itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use warden_process::{CommandAuthor, ConsoleLineKind, SessionInfo, SessionToken, SupervisorPhase};

use crate::channel;
use crate::config::{KEY_RESTART_SCRIPT, ServerConfig};
use crate::console::{ConsoleBuffer, ConsoleSink, spawn_console_file_task};
use crate::encoder::{CommandArg, encode_command};
use crate::error::{CommandError, SupervisorError};
use crate::hooks::{
    Announcement, AnnouncementKind, ServerLogger, SpawnValidator, SupervisorHooks, best_effort,
};
use crate::restart_script::{self, ShutdownContext};
use crate::session::SessionTracker;

/// Floor for the shutdown notice delay, so the shutdown event always has a
/// chance to flush to the server before the process dies.
const MIN_KILL_DELAY_MS: u64 = 250;

const BACKOFF_STEP_MS: u64 = 5_000;
const BACKOFF_CAP_MS: u64 = 45_000;

/// Fixed command name carrying structured events into the server.
const EVENT_COMMAND: &str = "wardenEvent";

/// Effective delay between killing a session and spawning the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnDelay {
    pub ms: u64,
    pub is_backoff: bool,
}

struct LiveProcess {
    pgid: i32,
    token: SessionToken,
    stdin: Arc<Mutex<ChildStdin>>,
    /// Fires `Child::start_kill` in the wait task; pgid signaling is the
    /// primary mechanism, this is the portable backstop.
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<ExitSignal>,
}

#[derive(Default)]
struct ExitSignal {
    seen: AtomicBool,
    notify: Notify,
}

struct Inner {
    phase: SupervisorPhase,
    proc: Option<LiveProcess>,
    tracker: SessionTracker,
    backoff_ms: u64,
    console_file_tx: Option<mpsc::UnboundedSender<(ConsoleLineKind, String)>>,
}

/// Resets the phase on drop unless disarmed, giving `finally`-grade
/// cleanup to the delay windows.
///
/// The phase is written through the caller's already-held lock so that a
/// precondition check and the transition it protects form one critical
/// section.
struct PhaseGuard<'a> {
    state: &'a StdMutex<Inner>,
    restore: SupervisorPhase,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn set(
        state: &'a StdMutex<Inner>,
        held: &mut Inner,
        phase: SupervisorPhase,
        restore: SupervisorPhase,
    ) -> Self {
        held.phase = phase;
        Self {
            state,
            restore,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().unwrap().phase = self.restore;
        }
    }
}

pub struct Supervisor {
    config: Arc<RwLock<ServerConfig>>,
    validator: Arc<dyn SpawnValidator>,
    logger: Arc<dyn ServerLogger>,
    hooks: Arc<dyn SupervisorHooks>,
    host_shutting_down: AtomicBool,
    inner: StdMutex<Inner>,
    console: Arc<Mutex<ConsoleBuffer>>,
}

impl Supervisor {
    pub fn new(
        config: Arc<RwLock<ServerConfig>>,
        validator: Arc<dyn SpawnValidator>,
        logger: Arc<dyn ServerLogger>,
        hooks: Arc<dyn SupervisorHooks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            validator,
            logger,
            hooks,
            host_shutting_down: AtomicBool::new(false),
            inner: StdMutex::new(Inner {
                phase: SupervisorPhase::Idle,
                proc: None,
                tracker: SessionTracker::default(),
                backoff_ms: 0,
                console_file_tx: None,
            }),
            console: Arc::new(Mutex::new(ConsoleBuffer::default())),
        })
    }

    // MARK: signals

    /// Autostart entry point, called once the host finished booting.
    pub async fn signal_start_ready(self: &Arc<Self>) {
        let cfg = self.config.read().unwrap().clone();
        if !cfg.auto_start {
            return;
        }
        if !self.is_configured() {
            tracing::warn!("server not configured yet, open the admin panel to finish setup");
            return;
        }
        if !self.hooks.has_admins() {
            tracing::warn!("the server will not auto start because there are no admins configured");
            return;
        }
        if cfg.quiet {
            tracing::warn!("quiet mode is enabled, use the live console to see server output");
        }
        if let Err(err) = self.spawn_server(true).await {
            tracing::error!(error = %err, "autostart failed");
        }
    }

    /// Reports a bind outcome from the boot monitor. Bind failures grow the
    /// respawn backoff by a fixed step up to a cap; a successful bind
    /// resets it. Returns the new backoff in ms.
    pub fn signal_bind_outcome(&self, backoff_required: bool) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        if backoff_required {
            inner.backoff_ms = (inner.backoff_ms + BACKOFF_STEP_MS).min(BACKOFF_CAP_MS);
        } else {
            if inner.backoff_ms > 0 {
                tracing::debug!("server bound successfully, resetting spawn backoff");
            }
            inner.backoff_ms = 0;
        }
        inner.backoff_ms
    }

    /// Host-exit path: no announcements, no delays. Asks the server to quit
    /// via its own console and waits for it to finish on its own.
    pub async fn handle_shutdown(&self) {
        self.host_shutting_down.store(true, Ordering::SeqCst);
        let live = {
            let inner = self.inner.lock().unwrap();
            if !inner.tracker.is_alive() {
                return;
            }
            inner
                .proc
                .as_ref()
                .map(|p| (p.stdin.clone(), p.exited.clone()))
        };
        let Some((stdin, exited)) = live else {
            return;
        };

        {
            let mut stdin = stdin.lock().await;
            let _ = stdin.write_all(b"quit \"host shutting down\"\n").await;
            let _ = stdin.flush().await;
        }

        // Register interest before checking the flag, otherwise an exit
        // landing in between would be missed and we would wait forever.
        let notified = exited.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if exited.seen.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    /// Config-store change notification.
    pub async fn handle_config_update(&self, changed_keys: &[String]) {
        self.push_mutable_settings().await;
        if changed_keys.iter().any(|k| k == KEY_RESTART_SCRIPT) {
            self.sync_restart_script_config().await;
        }
    }

    // MARK: spawn

    /// Spawns the managed server. Every precondition failure is a distinct,
    /// admin-readable error; success wires the four child streams exactly
    /// once and leaves the supervisor in `Running`.
    pub async fn spawn_server(self: &Arc<Self>, announce: bool) -> Result<(), SupervisorError> {
        if self.host_shutting_down.load(Ordering::SeqCst) {
            return Err(SupervisorError::HostShuttingDown);
        }

        let notice_ms = self.notice_delay_ms();
        let respawn_ms = self.effective_respawn_delay().ms;
        let guard = {
            let mut inner = self.inner.lock().unwrap();
            match inner.phase {
                SupervisorPhase::Idle => {}
                SupervisorPhase::Spawning | SupervisorPhase::Running => {
                    return Err(SupervisorError::AlreadyRunning);
                }
                SupervisorPhase::ShuttingDown => {
                    return Err(SupervisorError::ShutdownInProgress {
                        delay: fmt_short_duration(notice_ms),
                    });
                }
                SupervisorPhase::RespawnDelay => {
                    return Err(SupervisorError::RestartInProgress {
                        delay: fmt_short_duration(respawn_ms),
                    });
                }
            }
            if inner.proc.is_some() {
                return Err(SupervisorError::AlreadyRunning);
            }
            PhaseGuard::set(
                &self.inner,
                &mut inner,
                SupervisorPhase::Spawning,
                SupervisorPhase::Idle,
            )
        };

        let cfg = self.config.read().unwrap().clone();
        let token = SessionToken::generate();

        // A new session invalidates the web layer's outward-facing token.
        self.hooks.reset_web_token();

        let vars = cfg
            .spawn_variables()
            .map_err(SupervisorError::SpawnVariables)?;

        if !cfg.is_configured() {
            return Err(SupervisorError::NotConfigured);
        }

        let outcome = self
            .validator
            .validate(&vars.cfg_path, &vars.data_path)
            .map_err(|err| SupervisorError::ConfigValidation(format!("{err:#}")))?;
        if let Some(errors) = outcome.errors {
            return Err(SupervisorError::ConfigValidation(errors));
        }
        let Some(net_endpoint) = outcome.connect_endpoint else {
            return Err(SupervisorError::ConfigValidation(
                "no connect endpoint detected".to_string(),
            ));
        };
        if let Some(warnings) = outcome.warnings {
            tracing::warn!(warnings, "configuration file warnings");
        }

        self.hooks.reset_monitor_state();
        self.hooks.reset_player_list(&token);

        if announce {
            best_effort(
                "spawn announcement",
                self.hooks.announce(&Announcement {
                    kind: AnnouncementKind::Success,
                    message: format!("{} is starting up!", vars.server_name),
                }),
            );
        }

        let mut cmd = Command::new(&vars.bin);
        cmd.args(&vars.args)
            .current_dir(&vars.data_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    // New session so the whole process tree can be signaled.
                    set_parent_death_signal()?;
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        #[cfg(unix)]
        let aux = match channel::AuxPipe::create(&mut cmd) {
            Ok(aux) => Some(aux),
            Err(err) => {
                tracing::warn!(error = %err, "could not create auxiliary event pipe");
                None
            }
        };
        #[cfg(not(unix))]
        {
            tracing::warn!("auxiliary event pipe is not wired on this platform");
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| {
                tracing::error!(bin = %vars.bin.display(), error = %err, "spawn failed");
                SupervisorError::SpawnFailed(vars.bin.display().to_string())
            })?;
        let Some(pid) = child.id() else {
            return Err(SupervisorError::SpawnFailed(vars.bin.display().to_string()));
        };
        let pgid = pid as i32;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SupervisorError::SpawnFailed(vars.bin.display().to_string()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let sink = self.console_sink(&vars.data_path);
        self.logger.log_spawn(pid);
        sink.emit(
            ConsoleLineKind::Info,
            format!("spawned server session {token} (pid {pid})"),
        )
        .await;

        if let Some(out) = stdout {
            tokio::spawn(channel::read_console_lines(
                out,
                sink.clone(),
                ConsoleLineKind::StdOut,
            ));
        }
        if let Some(err) = stderr {
            tokio::spawn(channel::read_console_lines(
                err,
                sink.clone(),
                ConsoleLineKind::StdErr,
            ));
        }
        #[cfg(unix)]
        if let Some(aux) = aux {
            match aux.into_receiver() {
                Ok(rx) => {
                    tokio::spawn(channel::read_structured_events(
                        rx,
                        self.hooks.clone(),
                        token.clone(),
                    ));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "could not open auxiliary event pipe reader");
                }
            }
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let exited = Arc::new(ExitSignal::default());

        // Phase and process are published atomically, before the wait task
        // exists, so a child that dies instantly is seen as a crash of a
        // running server rather than a half-finished spawn.
        {
            let mut inner = self.inner.lock().unwrap();
            inner.tracker.record_spawn(pid, token.clone(), &net_endpoint);
            inner.proc = Some(LiveProcess {
                pgid,
                token: token.clone(),
                stdin: Arc::new(Mutex::new(stdin)),
                kill_tx: Some(kill_tx),
                exited: exited.clone(),
            });
            inner.phase = SupervisorPhase::Running;
        }
        guard.disarm();

        self.spawn_wait_task(child, token.clone(), kill_rx, exited, sink);

        self.hooks.broadcast_status();
        self.sync_restart_script_config().await;
        Ok(())
    }

    fn spawn_wait_task(
        self: &Arc<Self>,
        mut child: tokio::process::Child,
        token: SessionToken,
        mut kill_rx: oneshot::Receiver<()>,
        exited: Arc<ExitSignal>,
        sink: ConsoleSink,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                res = child.wait() => res,
                _ = &mut kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = status.ok().and_then(|s| s.code());

            let crashed = {
                let mut inner = this.inner.lock().unwrap();
                inner.tracker.record_exit(&token, code);
                let owns_live = inner.proc.as_ref().is_some_and(|p| p.token == token);
                let crashed = owns_live
                    && matches!(
                        inner.phase,
                        SupervisorPhase::Running | SupervisorPhase::Spawning
                    );
                if crashed {
                    inner.proc = None;
                    inner.tracker.archive_live();
                    inner.phase = SupervisorPhase::Idle;
                }
                crashed
            };

            exited.seen.store(true, Ordering::SeqCst);
            exited.notify.notify_waiters();

            if crashed {
                sink.emit(
                    ConsoleLineKind::Info,
                    format!("server process exited unexpectedly (code {code:?})"),
                )
                .await;
                this.hooks.broadcast_status();
            }
        });
    }

    fn console_sink(&self, data_path: &std::path::Path) -> ConsoleSink {
        let file_tx = {
            let mut inner = self.inner.lock().unwrap();
            if inner.console_file_tx.is_none() {
                inner.console_file_tx = Some(spawn_console_file_task(data_path.join("logs")));
            }
            inner.console_file_tx.clone()
        };
        ConsoleSink::new(self.console.clone(), file_tx, self.logger.clone())
    }

    // MARK: control

    /// Kills the managed server. A no-op success when nothing is running;
    /// rejected while another shutdown's notice delay is pending. The
    /// notice delay always runs to completion once started.
    pub async fn kill_server(
        &self,
        reason: &str,
        author: &CommandAuthor,
        is_restarting: bool,
    ) -> Result<(), SupervisorError> {
        let notice_ms = self.notice_delay_ms();
        let cfg = self.config.read().unwrap().clone();
        let reason = if reason.trim().is_empty() {
            "no reason provided"
        } else {
            reason
        };

        let (alive, guard) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.proc.is_none() {
                return Ok(());
            }
            if inner.phase == SupervisorPhase::ShuttingDown {
                return Err(SupervisorError::ShutdownInProgress {
                    delay: fmt_short_duration(notice_ms),
                });
            }
            let alive = inner.tracker.is_alive();
            let guard = PhaseGuard::set(
                &self.inner,
                &mut inner,
                SupervisorPhase::ShuttingDown,
                SupervisorPhase::Idle,
            );
            (alive, guard)
        };

        let verb = if is_restarting {
            "restarting"
        } else {
            "shutting down"
        };
        let announcement = alive.then(|| format!("{} is {verb}: {reason}", cfg.server_name));

        let sequence: Result<(), anyhow::Error> = async {
            if let Some(message) = &announcement {
                self.send_event(
                    "serverShuttingDown",
                    json!({
                        "delay": cfg.shutdown_notice_delay_ms,
                        "author": author.display_name(),
                        "message": message,
                    }),
                )
                .await;
                tokio::time::sleep(Duration::from_millis(notice_ms)).await;
            }

            let (session, kill_result) = {
                let mut inner = self.inner.lock().unwrap();
                let mut kill_result = Ok(());
                if let Some(mut proc) = inner.proc.take() {
                    #[cfg(unix)]
                    {
                        kill_result = signal_group_kill(proc.pgid);
                    }
                    if let Some(tx) = proc.kill_tx.take() {
                        let _ = tx.send(());
                    }
                }
                inner.phase = SupervisorPhase::Idle;
                (inner.tracker.archive_live(), kill_result)
            };
            kill_result.context("failed to signal the server process group")?;

            restart_script::maybe_launch(
                &cfg.restart_script.sanitize(),
                cfg.data_path.as_deref(),
                &ShutdownContext {
                    announcement: announcement.as_deref(),
                    reason,
                    is_restarting,
                },
            );

            // Each close notification runs even if the previous one failed.
            self.hooks.scheduler_server_closed();
            self.hooks.resources_server_closed();
            if let Some(session) = &session {
                self.hooks.player_list_server_closed(&session.token);
            }
            best_effort("close metrics", self.hooks.record_server_close(reason));
            best_effort(
                "shutdown announcement",
                self.hooks.announce(&Announcement {
                    kind: if is_restarting {
                        AnnouncementKind::Warning
                    } else {
                        AnnouncementKind::Danger
                    },
                    message: format!("{} is {verb}: {reason}", cfg.server_name),
                }),
            );
            self.hooks.broadcast_status();
            Ok(())
        }
        .await;

        guard.disarm();

        match sequence {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(error = format!("{err:#}"), "kill sequence failed");
                // Recovery guarantee: never leave a stuck intermediate state.
                let mut inner = self.inner.lock().unwrap();
                inner.proc = None;
                inner.tracker.archive_live();
                inner.phase = SupervisorPhase::Idle;
                Err(SupervisorError::KillFailed)
            }
        }
    }

    /// Restarts the managed server: kill, wait out the effective respawn
    /// delay, spawn. Rejected while another restart's delay is pending.
    pub async fn restart_server(
        self: &Arc<Self>,
        reason: &str,
        author: &CommandAuthor,
    ) -> Result<(), SupervisorError> {
        let respawn = self.effective_respawn_delay();
        {
            let inner = self.inner.lock().unwrap();
            if inner.phase == SupervisorPhase::RespawnDelay {
                return Err(SupervisorError::RestartInProgress {
                    delay: fmt_short_duration(respawn.ms),
                });
            }
        }

        self.kill_server(reason, author, true).await?;

        if respawn.is_backoff {
            tracing::warn!(delay_ms = respawn.ms, "restarting with bind-failure backoff delay");
        }

        // Give the OS time to release the server's ports.
        let guard = {
            let mut inner = self.inner.lock().unwrap();
            PhaseGuard::set(
                &self.inner,
                &mut inner,
                SupervisorPhase::RespawnDelay,
                SupervisorPhase::Idle,
            )
        };
        tokio::time::sleep(Duration::from_millis(respawn.ms)).await;
        self.inner.lock().unwrap().phase = SupervisorPhase::Idle;
        guard.disarm();

        self.spawn_server(false).await
    }

    // MARK: commands

    /// Fires a structured event inside the server. Returns whether it was
    /// written; failures are logged, never propagated.
    pub async fn send_event(&self, event_type: &str, data: serde_json::Value) -> bool {
        if event_type.is_empty() {
            tracing::error!("send_event called with an empty event type");
            return false;
        }
        match self
            .send_command(
                EVENT_COMMAND,
                &[event_type.into(), data.into()],
                &CommandAuthor::System,
            )
            .await
        {
            Ok(sent) => sent,
            Err(err) => {
                tracing::error!(event_type, error = %err, "failed to fire server event");
                false
            }
        }
    }

    /// Encodes and writes a command to the server's stdin. `Ok(false)`
    /// means no live process; `Err` means the caller passed a malformed
    /// command, which is a bug.
    pub async fn send_command(
        &self,
        name: &str,
        args: &[CommandArg],
        author: &CommandAuthor,
    ) -> Result<bool, CommandError> {
        if !self.is_alive() {
            return Ok(false);
        }
        let line = encode_command(name, args)?;
        self.send_raw_command(&line, author).await
    }

    /// Writes a raw line to the server's stdin, appending the newline.
    pub async fn send_raw_command(
        &self,
        command: &str,
        author: &CommandAuthor,
    ) -> Result<bool, CommandError> {
        // Liveness is checked before author validity: a dead server is an
        // operational fast-fail, not a caller bug.
        let stdin = {
            let inner = self.inner.lock().unwrap();
            if !inner.tracker.is_alive() {
                return Ok(false);
            }
            inner.proc.as_ref().map(|p| p.stdin.clone())
        };
        let Some(stdin) = stdin else {
            return Ok(false);
        };

        if let CommandAuthor::Admin(name) = author {
            if name.is_empty() {
                return Err(CommandError::InvalidAuthor);
            }
        }

        let mut stdin = stdin.lock().await;
        let write = async {
            stdin.write_all(command.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;

        match write {
            Ok(()) => {
                match author {
                    CommandAuthor::System => self.logger.log_system_command(command),
                    CommandAuthor::Admin(name) => self.logger.log_admin_command(name, command),
                }
                Ok(true)
            }
            Err(err) => {
                tracing::error!(error = %err, "error writing to the server's stdin");
                Ok(false)
            }
        }
    }

    async fn sync_restart_script_config(&self) {
        if !self.is_alive() {
            return;
        }
        let script = self.config.read().unwrap().restart_script.sanitize();
        self.send_event(
            "restartScriptConfig",
            json!({
                "enabled": script.enabled,
                "scriptPath": script.script_path,
                "workingDirectory": script.working_directory,
                "args": script.args,
                "messagePattern": script.message_pattern,
                "delayMs": script.delay_ms,
            }),
        )
        .await;
    }

    /// Re-pushes host-managed runtime settings into the live server.
    async fn push_mutable_settings(&self) {
        if !self.is_alive() {
            return;
        }
        for (set_cmd, key, value) in self.hooks.mutable_settings() {
            match self
                .send_command(
                    &set_cmd,
                    &[key.as_str().into(), value.as_str().into()],
                    &CommandAuthor::System,
                )
                .await
            {
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(set_cmd, key, error = %err, "failed to push setting");
                }
            }
        }
        self.send_event("configChanged", json!({})).await;
    }

    // MARK: getters

    pub fn is_configured(&self) -> bool {
        self.config.read().unwrap().is_configured()
    }

    /// True when the server is _supposed to_ not be running: no live
    /// process and no respawn delay pending.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.proc.is_none() && inner.phase != SupervisorPhase::RespawnDelay
    }

    pub fn is_alive(&self) -> bool {
        self.inner.lock().unwrap().tracker.is_alive()
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.inner.lock().unwrap().phase
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.inner.lock().unwrap().tracker.live().cloned()
    }

    /// Terminated sessions, newest first.
    pub fn history(&self) -> Vec<SessionInfo> {
        self.inner
            .lock()
            .unwrap()
            .tracker
            .history()
            .iter()
            .cloned()
            .collect()
    }

    /// `max(configured respawn delay, bind-failure backoff)`.
    pub fn effective_respawn_delay(&self) -> RespawnDelay {
        let configured = self.config.read().unwrap().restart_spawn_delay_ms;
        let backoff = self.inner.lock().unwrap().backoff_ms;
        if backoff > configured {
            RespawnDelay {
                ms: backoff,
                is_backoff: true,
            }
        } else {
            RespawnDelay {
                ms: configured,
                is_backoff: false,
            }
        }
    }

    /// Console lines after the given cursor (0 means "most recent").
    pub async fn tail_console(
        &self,
        cursor: u64,
        limit: usize,
    ) -> (Vec<(ConsoleLineKind, String)>, u64) {
        self.console.lock().await.tail_after(cursor, limit)
    }

    fn notice_delay_ms(&self) -> u64 {
        self.config
            .read()
            .unwrap()
            .shutdown_notice_delay_ms
            .max(MIN_KILL_DELAY_MS)
    }
}

/// `SIGKILL` to the child's whole process group. A group that is already
/// gone is a success, not an error.
#[cfg(unix)]
fn signal_group_kill(pgid: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(all(unix, target_os = "linux"))]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    // If the supervisor dies, take the server down with it.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

fn fmt_short_duration(ms: u64) -> String {
    if ms >= 60_000 {
        let m = ms / 60_000;
        let s = (ms % 60_000) / 1000;
        if s > 0 {
            format!("{m}m{s}s")
        } else {
            format!("{m}m")
        }
    } else if ms >= 1000 {
        let s = ms / 1000;
        let rem = ms % 1000;
        if rem > 0 {
            format!("{s}s{rem}ms")
        } else {
            format!("{s}s")
        }
    } else {
        format!("{ms}ms")
    }
}
