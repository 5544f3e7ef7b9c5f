//! Tracks the identity and fate of managed-server sessions: the live one,
//! plus a bounded history of terminated ones for diagnostics.

use std::collections::VecDeque;

use warden_process::{SessionExit, SessionInfo, SessionToken, now_unix_ms};

const HISTORY_RETENTION: usize = 50;

/// Liveness probe against the OS, never cached. `kill(pid, 0)` checks for
/// existence without delivering a signal; once the child is reaped the pid
/// stops answering.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}

/// All mutations happen on the supervisor's single control path; no internal
/// locking here.
#[derive(Debug, Default)]
pub struct SessionTracker {
    live: Option<SessionInfo>,
    history: VecDeque<SessionInfo>,
}

impl SessionTracker {
    /// Captures identifying metadata the instant a spawn attempt yields a
    /// valid OS process handle.
    pub fn record_spawn(&mut self, pid: u32, token: SessionToken, net_endpoint: &str) -> SessionInfo {
        let info = SessionInfo {
            pid,
            token,
            spawned_at_unix_ms: now_unix_ms(),
            net_endpoint: net_endpoint.to_string(),
            exit: None,
        };
        self.live = Some(info.clone());
        info
    }

    /// Sets the exit record exactly once. A second call for the same session
    /// logs the anomaly and does nothing.
    pub fn record_exit(&mut self, token: &SessionToken, code: Option<i32>) {
        let entry = self
            .live
            .iter_mut()
            .chain(self.history.iter_mut())
            .find(|s| &s.token == token);
        match entry {
            Some(session) if session.exit.is_none() => {
                session.exit = Some(SessionExit {
                    code,
                    at_unix_ms: now_unix_ms(),
                });
            }
            Some(_) => {
                tracing::debug!(%token, "exit recorded twice for session, ignoring");
            }
            None => {
                tracing::debug!(%token, "exit recorded for unknown session, ignoring");
            }
        }
    }

    pub fn live(&self) -> Option<&SessionInfo> {
        self.live.as_ref()
    }

    /// Live OS process status for the current session.
    pub fn is_alive(&self) -> bool {
        match &self.live {
            Some(s) => s.exit.is_none() && pid_alive(s.pid),
            None => false,
        }
    }

    /// Moves the live session into history (newest first), discarding the
    /// oldest entries beyond the retention bound.
    pub fn archive_live(&mut self) -> Option<SessionInfo> {
        let session = self.live.take()?;
        self.history.push_front(session.clone());
        while self.history.len() > HISTORY_RETENTION {
            self.history.pop_back();
        }
        Some(session)
    }

    /// Terminated sessions, newest first.
    pub fn history(&self) -> &VecDeque<SessionInfo> {
        &self.history
    }
}
