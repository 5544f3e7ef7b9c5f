//! Transport between the supervisor and the managed child process: three
//! inherited streams (stdin for commands, stdout/stderr for console lines)
//! plus a fourth pipe on fd 3 carrying newline-delimited JSON events out of
//! the server. Each stream gets exactly one dedicated reader task per
//! session; the tasks end when their stream does.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use warden_process::{ConsoleLineKind, ServerEvent, SessionToken};

use crate::console::ConsoleSink;
use crate::hooks::SupervisorHooks;

/// Parses one auxiliary-pipe line. Pure; the reader task decides what to do
/// with failures.
pub fn parse_event_line(line: &str) -> Result<ServerEvent, serde_json::Error> {
    serde_json::from_str(line)
}

pub async fn read_console_lines<R: AsyncRead + Unpin>(
    reader: R,
    sink: ConsoleSink,
    kind: ConsoleLineKind,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.emit(kind, line).await;
    }
}

/// Reads the structured-event stream. Malformed lines are dropped with a
/// warning; they must never terminate the reader.
pub async fn read_structured_events<R: AsyncRead + Unpin>(
    reader: R,
    hooks: Arc<dyn SupervisorHooks>,
    session: SessionToken,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_event_line(trimmed) {
            Ok(event) => hooks.handle_server_event(&event, &session),
            Err(err) => {
                tracing::warn!(%session, error = %err, line = trimmed, "dropping malformed event line");
            }
        }
    }
}

#[cfg(unix)]
pub use aux_pipe::AuxPipe;

#[cfg(unix)]
mod aux_pipe {
    use std::os::fd::{FromRawFd, OwnedFd};

    use tokio::net::unix::pipe;

    /// The fd-3 auxiliary pipe. Created before spawn; the write end is
    /// `dup2`'d onto fd 3 inside the child. Both ends are owned, so an
    /// `AuxPipe` dropped after a failed spawn closes them and leaks
    /// nothing.
    pub struct AuxPipe {
        read: OwnedFd,
        write: OwnedFd,
    }

    impl AuxPipe {
        /// Creates the pipe and registers the child-side `dup2`. Follow a
        /// successful spawn with [`AuxPipe::into_receiver`]; drop on the
        /// failure paths.
        pub fn create(cmd: &mut tokio::process::Command) -> std::io::Result<Self> {
            let mut fds = [0 as libc::c_int; 2];
            if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
                return Err(std::io::Error::last_os_error());
            }
            let read_raw = fds[0];
            let write_raw = fds[1];

            // The read end must not leak into the child, and tokio's pipe
            // reader requires it to be non-blocking.
            unsafe {
                libc::fcntl(read_raw, libc::F_SETFD, libc::FD_CLOEXEC);
                let flags = libc::fcntl(read_raw, libc::F_GETFL);
                libc::fcntl(read_raw, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }

            unsafe {
                cmd.pre_exec(move || {
                    if write_raw != 3 {
                        if libc::dup2(write_raw, 3) == -1 {
                            return Err(std::io::Error::last_os_error());
                        }
                        libc::close(write_raw);
                    }
                    Ok(())
                });
            }

            Ok(Self {
                read: unsafe { OwnedFd::from_raw_fd(read_raw) },
                write: unsafe { OwnedFd::from_raw_fd(write_raw) },
            })
        }

        /// Closes the parent's write end and hands back the async read end.
        /// Closing is what lets the reader observe EOF when the child dies.
        pub fn into_receiver(self) -> std::io::Result<pipe::Receiver> {
            drop(self.write);
            pipe::Receiver::from_owned_fd(self.read)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[cfg(target_os = "linux")]
        fn open_fd_count() -> usize {
            std::fs::read_dir("/proc/self/fd").unwrap().count()
        }

        // An admin retrying a broken spawn must not chew through the fd
        // table: every created-then-abandoned pipe has to close both ends.
        #[cfg(target_os = "linux")]
        #[test]
        fn repeated_create_and_drop_does_not_leak_fds() {
            for _ in 0..4 {
                let mut cmd = tokio::process::Command::new("true");
                let _ = AuxPipe::create(&mut cmd).unwrap();
            }
            let before = open_fd_count();
            for _ in 0..32 {
                let mut cmd = tokio::process::Command::new("true");
                let _ = AuxPipe::create(&mut cmd).unwrap();
            }
            let after = open_fd_count();
            assert!(
                after <= before + 2,
                "open fd count grew from {before} to {after}"
            );
        }

        #[tokio::test]
        async fn receiver_sees_eof_once_the_write_end_is_closed() {
            // No child was spawned, so after into_receiver closes the
            // parent's write end there are no writers left at all.
            let mut cmd = tokio::process::Command::new("true");
            let pipe = AuxPipe::create(&mut cmd).unwrap();
            let mut rx = pipe.into_receiver().unwrap();
            let mut buf = [0u8; 8];
            let n = tokio::time::timeout(
                std::time::Duration::from_secs(1),
                tokio::io::AsyncReadExt::read(&mut rx, &mut buf),
            )
            .await
            .expect("read should resolve immediately at EOF")
            .unwrap();
            assert_eq!(n, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<(ServerEvent, SessionToken)>>,
    }

    impl SupervisorHooks for RecordingHooks {
        fn handle_server_event(&self, event: &ServerEvent, session: &SessionToken) {
            self.events
                .lock()
                .unwrap()
                .push((event.clone(), session.clone()));
        }
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(parse_event_line("{not json").is_err());
        assert!(parse_event_line("").is_err());
    }

    #[test]
    fn parse_accepts_resource_event() {
        let ev = parse_event_line(
            r#"{"type":"resourceEvent","resource":"mapmanager","event":"onResourceStarting"}"#,
        )
        .unwrap();
        assert!(matches!(ev, ServerEvent::Resource { .. }));
    }

    #[tokio::test]
    async fn malformed_lines_do_not_kill_the_reader() {
        let input = concat!(
            "{broken\n",
            "\n",
            r#"{"type":"resourceEvent","resource":"chat","event":"onResourceStart"}"#,
            "\n",
            "also not json\n",
            r#"{"type":"resourceEvent","resource":"chat","event":"onResourceStop"}"#,
            "\n",
        );
        let hooks = Arc::new(RecordingHooks::default());
        let session = SessionToken::generate();
        read_structured_events(input.as_bytes(), hooks.clone(), session.clone()).await;

        let events = hooks.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(_, s)| s == &session));
    }

    #[tokio::test]
    async fn unknown_event_types_still_reach_the_hook() {
        let input = "{\"type\":\"futureEventKind\",\"whatever\":true}\n";
        let hooks = Arc::new(RecordingHooks::default());
        read_structured_events(input.as_bytes(), hooks.clone(), SessionToken::generate()).await;

        let events = hooks.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, ServerEvent::Unknown);
    }
}
