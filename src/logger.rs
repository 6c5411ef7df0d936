//! Per-module asynchronous logger.
//!
//! Each module owns one [`Logger`]: a bounded queue drained by a single
//! worker task that appends `[LEVEL] message` lines to the module's log file
//! and mirrors a trimmed copy into an in-memory tail buffer. Logging calls
//! enqueue and return; the queue capacity is a safety valve, not a primary
//! mechanism. [`Logger::exit`] drains everything still queued before the
//! file is flushed and closed, so trailing lines are never lost on a clean
//! shutdown.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::Error;

/// Queue slots between the logging call sites and the worker.
const QUEUE_CAPACITY: usize = 64;

/// Severity of a log record, most severe first.
///
/// `Off` and `All` are threshold sentinels; records themselves only carry
/// `Fatal` through `Trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Off = 0,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    All,
}

impl Priority {
    const NAMES: [&'static str; 8] = [
        "OFF", "FATAL", "ERROR", "WARN", "INFO", "DEBUG", "TRACE", "ALL",
    ];

    /// Uppercase label used in log lines.
    pub fn label(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    /// Numeric form, `Off` = 0 through `All` = 7.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Priority from its numeric form.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Off),
            1 => Some(Self::Fatal),
            2 => Some(Self::Error),
            3 => Some(Self::Warn),
            4 => Some(Self::Info),
            5 => Some(Self::Debug),
            6 => Some(Self::Trace),
            7 => Some(Self::All),
            _ => None,
        }
    }

    /// Case-insensitive lookup by level name.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let upper = name.to_ascii_uppercase();
        Self::NAMES
            .iter()
            .position(|n| *n == upper)
            .and_then(|i| Self::from_index(i as u8))
            .ok_or_else(|| Error::UnknownPriority(name.to_string()))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

struct Record {
    priority: Priority,
    message: String,
    /// Already mirrored into the tail buffer by a synchronous caller.
    mirrored: bool,
}

/// Channel plumbing between call sites and the worker task.
///
/// `tx`/`rx` exist from construction so records logged before the worker
/// starts are buffered rather than lost.
struct ChanState {
    tx: Option<mpsc::Sender<Record>>,
    rx: Option<mpsc::Receiver<Record>>,
    worker: Option<JoinHandle<std::io::Result<()>>>,
}

/// Leveled, queue-backed log sink with an in-memory tail of recent lines.
pub struct Logger {
    priority: AtomicU8,
    lines: Arc<RwLock<Vec<String>>>,
    chan: Mutex<ChanState>,
}

impl Logger {
    /// A logger with the given threshold. No worker runs until
    /// [`start`](Self::start); records enqueued before then wait in the
    /// queue.
    pub fn new(priority: Priority) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            priority: AtomicU8::new(priority.index()),
            lines: Arc::new(RwLock::new(Vec::new())),
            chan: Mutex::new(ChanState {
                tx: Some(tx),
                rx: Some(rx),
                worker: None,
            }),
        }
    }

    /// Open (creating directories as needed) the append-only log file and
    /// spawn the worker. No-op if the worker is already running.
    pub async fn start(&self, path: &Path) -> Result<(), Error> {
        {
            let ch = self.chan.lock();
            if ch.worker.is_some() {
                return Ok(());
            }
        }

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;

        let mut ch = self.chan.lock();
        if ch.worker.is_some() {
            // Lost a start race; the winner's worker owns the queue.
            return Ok(());
        }
        if ch.tx.is_none() {
            // Restart after exit: the old queue was consumed to completion.
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            ch.tx = Some(tx);
            ch.rx = Some(rx);
        }
        let rx = ch.rx.take().ok_or_else(|| {
            Error::LogWorker("log queue receiver missing".to_string())
        })?;
        ch.worker = Some(tokio::spawn(drain(rx, file, Arc::clone(&self.lines))));

        Ok(())
    }

    /// Whether a worker task currently owns the queue.
    pub fn is_running(&self) -> bool {
        self.chan.lock().worker.is_some()
    }

    /// Signal the worker to drain the queue and stop, then wait for the
    /// drain to complete. The file is flushed and closed before this
    /// returns. No-op if never started.
    pub async fn exit(&self) -> Result<(), Error> {
        let (tx, worker) = {
            let mut ch = self.chan.lock();
            (ch.tx.take(), ch.worker.take())
        };
        // Closing the sender is the stop signal; the worker exits once the
        // queue is empty.
        drop(tx);
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| Error::LogWorker(e.to_string()))??;
        }
        Ok(())
    }

    pub fn priority(&self) -> Priority {
        // Only valid indices are ever stored.
        Priority::from_index(self.priority.load(Ordering::Relaxed)).unwrap_or(Priority::Info)
    }

    pub fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.index(), Ordering::Relaxed);
    }

    /// Set the threshold by level name, case-insensitively.
    pub fn set_priority_by_name(&self, name: &str) -> Result<(), Error> {
        self.set_priority(Priority::from_name(name)?);
        Ok(())
    }

    /// Whether a record at `priority` would be kept. Lets hot paths skip
    /// formatting for records that would be dropped anyway.
    pub fn enabled(&self, priority: Priority) -> bool {
        priority <= self.priority()
    }

    /// Enqueue a record and return without waiting on the worker.
    pub fn log(&self, priority: Priority, message: impl Into<String>) {
        if !self.enabled(priority) {
            return;
        }
        self.enqueue(Record {
            priority,
            message: message.into(),
            mirrored: false,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Priority::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Priority::Warn, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Priority::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Priority::Debug, message);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(Priority::Trace, message);
    }

    /// Fatal records bypass the queue: the tail buffer and the tracing
    /// stream see them synchronously, so they survive even if the worker
    /// never drains again. The file sink still gets a copy via the queue.
    pub fn fatal(&self, message: impl Into<String>) {
        let message = message.into();
        self.lines.write().push(format_line(Priority::Fatal, &message));
        tracing::error!(target: "botmux::log", "{message}");
        self.enqueue(Record {
            priority: Priority::Fatal,
            message,
            mirrored: true,
        });
    }

    fn enqueue(&self, record: Record) {
        let Some(tx) = self.chan.lock().tx.clone() else {
            return;
        };
        match tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                // Safety valve: never drop a record the threshold accepted.
                // Inside a runtime the send finishes on a spawned task; the
                // caller still does not block.
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = tx.send(record).await;
                    });
                } else {
                    let _ = tx.blocking_send(record);
                }
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// First `n` retained lines. `n` = 0 returns everything; `n` < 0 is the
    /// same as `tail_logs(-n)`.
    pub fn logs(&self, n: isize) -> Vec<String> {
        if n < 0 {
            return self.tail_logs(-n);
        }

        let lines = self.lines.read();
        let n = if n == 0 {
            lines.len()
        } else {
            lines.len().min(n as usize)
        };
        lines[..n].to_vec()
    }

    /// Last `n` retained lines. `n` = 0 returns nothing; `n` < 0 is the
    /// same as `logs(-n)`.
    pub fn tail_logs(&self, n: isize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }
        if n < 0 {
            return self.logs(-n);
        }

        let lines = self.lines.read();
        let n = lines.len().min(n as usize);
        lines[lines.len() - n..].to_vec()
    }

    pub fn len_logs(&self) -> usize {
        self.lines.read().len()
    }

    /// Clear the in-memory tail. Lines already written to disk stay there.
    pub fn clear_logs(&self) {
        self.lines.write().clear();
    }
}

fn format_line(priority: Priority, message: &str) -> String {
    format!("[{:>5}] {}", priority.label(), message.trim_end())
}

/// Worker loop: drain the queue into the file, mirroring each line into the
/// tail buffer. Runs until the sender side closes, then flushes.
async fn drain(
    mut rx: mpsc::Receiver<Record>,
    file: tokio::fs::File,
    lines: Arc<RwLock<Vec<String>>>,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(file);
    while let Some(record) = rx.recv().await {
        let line = format_line(record.priority, &record.message);
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        if !record.mirrored {
            lines.write().push(line);
        }
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_names_round_trip() {
        for i in 0..=7u8 {
            let p = Priority::from_index(i).unwrap();
            assert_eq!(Priority::from_name(p.label()).unwrap(), p);
        }
        assert_eq!(Priority::from_name("warn").unwrap(), Priority::Warn);
        assert!(matches!(
            Priority::from_name("verbose"),
            Err(Error::UnknownPriority(_))
        ));
    }

    #[test]
    fn severity_ordering() {
        assert!(Priority::Fatal < Priority::Error);
        assert!(Priority::Error < Priority::Trace);
        assert!(Priority::Off < Priority::Fatal);
        assert!(Priority::Trace < Priority::All);
    }

    #[tokio::test]
    async fn drains_queue_before_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.log");
        let logger = Logger::new(Priority::Info);
        logger.start(&path).await.unwrap();

        for i in 0..5 {
            logger.info(format!("message {i}"));
        }
        logger.exit().await.unwrap();

        let tail = logger.tail_logs(5);
        assert_eq!(tail.len(), 5);
        for (i, line) in tail.iter().enumerate() {
            assert_eq!(line, &format!("[ INFO] message {i}"));
        }
        assert_eq!(logger.logs(3), tail[..3].to_vec());

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 5);
        assert!(on_disk.starts_with("[ INFO] message 0\n"));
    }

    #[tokio::test]
    async fn records_below_threshold_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(Priority::Warn);
        logger.start(&dir.path().join("mod.log")).await.unwrap();

        logger.info("dropped");
        logger.debug("dropped");
        logger.error("kept");
        logger.exit().await.unwrap();

        assert_eq!(logger.len_logs(), 1);
        assert_eq!(logger.tail_logs(1), vec!["[ERROR] kept".to_string()]);
    }

    #[tokio::test]
    async fn records_enqueued_before_start_survive() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(Priority::Info);
        logger.info("early bird");
        logger.start(&dir.path().join("mod.log")).await.unwrap();
        logger.exit().await.unwrap();

        assert_eq!(logger.tail_logs(1), vec!["[ INFO] early bird".to_string()]);
    }

    #[tokio::test]
    async fn head_and_tail_sign_reinterpretation() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(Priority::Info);
        logger.start(&dir.path().join("mod.log")).await.unwrap();
        for i in 0..4 {
            logger.info(format!("m{i}"));
        }
        logger.exit().await.unwrap();

        assert_eq!(logger.logs(-2), logger.tail_logs(2));
        assert_eq!(logger.tail_logs(-2), logger.logs(2));
        assert!(logger.tail_logs(0).is_empty());
        assert_eq!(logger.logs(0).len(), 4);
    }

    #[tokio::test]
    async fn clear_logs_is_idempotent() {
        let logger = Logger::new(Priority::Info);
        logger.clear_logs();
        logger.clear_logs();
        assert_eq!(logger.len_logs(), 0);
    }

    #[tokio::test]
    async fn restart_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.log");
        let logger = Logger::new(Priority::Info);

        logger.start(&path).await.unwrap();
        logger.info("first run");
        logger.exit().await.unwrap();

        logger.start(&path).await.unwrap();
        logger.info("second run");
        logger.exit().await.unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 2);
    }
}
