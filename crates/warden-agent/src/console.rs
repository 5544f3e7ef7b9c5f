//! Console retention for the managed server: a bounded in-memory ring the
//! admin UI polls with a cursor, plus a rotating on-disk console log. Lines
//! keep their classification (stdout/stderr/injected command) end to end.

use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use tokio::{io::AsyncWriteExt, sync::Mutex, sync::mpsc};
use warden_process::ConsoleLineKind;

use crate::hooks::ServerLogger;

const DEFAULT_LOG_MAX_LINES: usize = 1000;
const DEFAULT_LOG_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB
const DEFAULT_LOG_FILE_MAX_FILES: usize = 3;

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

fn log_max_lines() -> usize {
    env_usize("WARDEN_LOG_MAX_LINES")
        .map(|v| v.clamp(100, 50_000))
        .unwrap_or(DEFAULT_LOG_MAX_LINES)
}

fn log_file_limits() -> (u64, usize) {
    let max_bytes = env_u64("WARDEN_LOG_FILE_MAX_BYTES")
        .map(|v| v.clamp(256 * 1024, 1024 * 1024 * 1024))
        .unwrap_or(DEFAULT_LOG_FILE_MAX_BYTES);
    let max_files = env_usize("WARDEN_LOG_FILE_MAX_FILES")
        .map(|v| v.clamp(1, 20))
        .unwrap_or(DEFAULT_LOG_FILE_MAX_FILES);
    (max_bytes, max_files)
}

fn kind_prefix(kind: ConsoleLineKind) -> &'static str {
    match kind {
        ConsoleLineKind::StdOut => "[stdout]",
        ConsoleLineKind::StdErr => "[stderr]",
        ConsoleLineKind::SystemCmd => "[cmd:system]",
        ConsoleLineKind::AdminCmd => "[cmd:admin]",
        ConsoleLineKind::Info => "[warden]",
    }
}

#[derive(Debug)]
pub struct ConsoleBuffer {
    next_seq: u64,
    max_lines: usize,
    lines: VecDeque<(u64, ConsoleLineKind, String)>,
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self {
            next_seq: 1,
            max_lines: log_max_lines(),
            lines: VecDeque::new(),
        }
    }
}

impl ConsoleBuffer {
    fn push_line(&mut self, kind: ConsoleLineKind, line: String) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.lines.push_back((seq, kind, line));
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Cursor-based polling: cursor 0 returns the most recent lines.
    pub fn tail_after(
        &self,
        cursor: u64,
        limit: usize,
    ) -> (Vec<(ConsoleLineKind, String)>, u64) {
        if cursor == 0 {
            let start = self.lines.len().saturating_sub(limit);
            let mut out = Vec::new();
            let mut last = 0;
            for (seq, kind, line) in self.lines.iter().skip(start) {
                out.push((*kind, line.clone()));
                last = *seq;
            }
            return (out, last);
        }

        let mut out = Vec::new();
        let mut last = cursor;
        for (seq, kind, line) in self.lines.iter() {
            if *seq > cursor {
                out.push((*kind, line.clone()));
                last = *seq;
                if out.len() >= limit {
                    break;
                }
            }
        }
        (out, last)
    }
}

/// Fan-out point for console lines: ring buffer, optional file writer task,
/// and the logger collaborator.
#[derive(Clone)]
pub struct ConsoleSink {
    buffer: Arc<Mutex<ConsoleBuffer>>,
    file_tx: Option<mpsc::UnboundedSender<(ConsoleLineKind, String)>>,
    logger: Arc<dyn ServerLogger>,
}

impl ConsoleSink {
    pub fn new(
        buffer: Arc<Mutex<ConsoleBuffer>>,
        file_tx: Option<mpsc::UnboundedSender<(ConsoleLineKind, String)>>,
        logger: Arc<dyn ServerLogger>,
    ) -> Self {
        Self {
            buffer,
            file_tx,
            logger,
        }
    }

    pub async fn emit(&self, kind: ConsoleLineKind, line: impl Into<String>) {
        let line = line.into();
        self.logger.write_console(kind, &line);
        self.buffer.lock().await.push_line(kind, line.clone());
        if let Some(tx) = &self.file_tx {
            let _ = tx.send((kind, line));
        }
    }
}

/// The on-disk console log. Owns the whole file concern: line formatting
/// with the kind prefix, size tracking, rotation, and error reporting (a
/// broken log file must never take the console pipeline down with it).
struct ConsoleLogFile {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    written: u64,
    file: tokio::fs::File,
}

impl ConsoleLogFile {
    async fn open(path: PathBuf, max_bytes: u64, max_files: usize) -> std::io::Result<Self> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let written = file.metadata().await.map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path,
            max_bytes,
            max_files,
            written,
            file,
        })
    }

    fn numbered(&self, n: usize) -> PathBuf {
        PathBuf::from(format!("{}.{n}", self.path.display()))
    }

    async fn append(&mut self, kind: ConsoleLineKind, line: &str) {
        let entry = format!("{} {}\n", kind_prefix(kind), line.trim_end_matches('\n'));

        if self.max_bytes > 0 && self.written.saturating_add(entry.len() as u64) > self.max_bytes {
            if let Err(err) = self.rotate().await {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "console log rotation failed, continuing in the current file"
                );
            }
        }

        match self.file.write_all(entry.as_bytes()).await {
            Ok(()) => self.written = self.written.saturating_add(entry.len() as u64),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "console log write failed");
            }
        }
    }

    /// Ages every numbered file up one slot, moves the active log into
    /// slot 1, and reopens fresh. Missing slots are skipped silently; the
    /// oldest slot falls off the end by being renamed over.
    async fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush().await?;
        let mut slot = self.max_files;
        while slot > 1 {
            let _ = tokio::fs::rename(self.numbered(slot - 1), self.numbered(slot)).await;
            slot -= 1;
        }
        tokio::fs::rename(&self.path, self.numbered(1)).await?;

        self.file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        self.written = 0;
        Ok(())
    }
}

/// Starts the background writer task for `console.log` under the given
/// directory and returns its input channel.
pub fn spawn_console_file_task(
    log_dir: PathBuf,
) -> mpsc::UnboundedSender<(ConsoleLineKind, String)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(ConsoleLineKind, String)>();
    let (max_bytes, max_files) = log_file_limits();
    tokio::spawn(async move {
        let path = log_dir.join("console.log");
        let mut log = match ConsoleLogFile::open(path, max_bytes, max_files).await {
            Ok(log) => log,
            Err(err) => {
                tracing::warn!(dir = %log_dir.display(), error = %err, "could not open console log");
                return;
            }
        };
        while let Some((kind, line)) = rx.recv().await {
            log.append(kind, &line).await;
        }
        let _ = log.file.flush().await;
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_bounded() {
        let mut buf = ConsoleBuffer {
            next_seq: 1,
            max_lines: 3,
            lines: VecDeque::new(),
        };
        for i in 0..5 {
            buf.push_line(ConsoleLineKind::StdOut, format!("line {i}"));
        }
        assert_eq!(buf.lines.len(), 3);
        assert_eq!(buf.lines[0].2, "line 2");
    }

    #[test]
    fn tail_after_cursor_zero_returns_recent() {
        let mut buf = ConsoleBuffer::default();
        for i in 0..10 {
            buf.push_line(ConsoleLineKind::StdOut, format!("line {i}"));
        }
        let (lines, cursor) = buf.tail_after(0, 3);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].1, "line 7");
        assert_eq!(cursor, 10);
    }

    #[test]
    fn tail_after_resumes_from_cursor() {
        let mut buf = ConsoleBuffer::default();
        for i in 0..10 {
            buf.push_line(ConsoleLineKind::StdErr, format!("line {i}"));
        }
        let (lines, cursor) = buf.tail_after(4, 100);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].1, "line 4");
        assert_eq!(cursor, 10);

        let (rest, _) = buf.tail_after(cursor, 100);
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn log_file_rotates_at_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let mut log = ConsoleLogFile::open(path.clone(), 64, 2).await.unwrap();
        for i in 0..20 {
            log.append(ConsoleLineKind::StdOut, &format!("some console line {i}"))
                .await;
        }
        drop(log);
        assert!(std::fs::metadata(&path).is_ok());
        let rotated = PathBuf::from(format!("{}.1", path.display()));
        assert!(std::fs::metadata(&rotated).is_ok());
    }

    #[tokio::test]
    async fn log_file_lines_carry_the_kind_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let mut log = ConsoleLogFile::open(path.clone(), 0, 2).await.unwrap();
        log.append(ConsoleLineKind::StdErr, "oops").await;
        log.append(ConsoleLineKind::AdminCmd, "status\n").await;
        log.file.flush().await.unwrap();
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[stderr] oops\n[cmd:admin] status\n");
    }

    #[tokio::test]
    async fn sink_feeds_buffer_and_logger() {
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct RecordingLogger(StdMutex<Vec<(ConsoleLineKind, String)>>);
        impl ServerLogger for RecordingLogger {
            fn log_spawn(&self, _pid: u32) {}
            fn log_system_command(&self, _command: &str) {}
            fn log_admin_command(&self, _author: &str, _command: &str) {}
            fn write_console(&self, kind: ConsoleLineKind, line: &str) {
                self.0.lock().unwrap().push((kind, line.to_string()));
            }
        }

        let buffer = Arc::new(Mutex::new(ConsoleBuffer::default()));
        let logger = Arc::new(RecordingLogger::default());
        let sink = ConsoleSink::new(buffer.clone(), None, logger.clone());

        sink.emit(ConsoleLineKind::StdErr, "oops").await;

        let (lines, _) = buffer.lock().await.tail_after(0, 10);
        assert_eq!(lines, vec![(ConsoleLineKind::StdErr, "oops".to_string())]);
        assert_eq!(
            logger.0.lock().unwrap().as_slice(),
            &[(ConsoleLineKind::StdErr, "oops".to_string())]
        );
    }
}
