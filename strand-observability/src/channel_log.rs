//! Asynchronous, rolling channel timing log.
//!
//! Request threads call [`ChannelLog::log`], which only enqueues. A single
//! worker thread drains the bounded queue in order, formats each event and
//! appends it to a [`ChannelAppender`] (normally a [`RollingFileWriter`]).
//! What happens when the queue is full is decided by [`QueueFullPolicy`].

use crate::channel_event::ChannelTimingEvent;
use crate::layout;
use crate::metrics::ChannelLogMetrics;
use crate::rolling_writer::{
    LOG_FILE_EXTENSION, RollingFileConfig, RollingFileWriter, TEMP_FILE_EXTENSION,
};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use strand_core::StrandError;
use strand_core::config::{ChannelLogConfig, QueueFullPolicy};
use tracing::{debug, error, info, warn};

/// Destination for formatted channel log lines. Owned by the worker thread.
pub trait ChannelAppender: Send + 'static {
    /// Append one newline-terminated line.
    fn append(&mut self, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

impl ChannelAppender for RollingFileWriter {
    fn append(&mut self, line: &str) -> io::Result<()> {
        RollingFileWriter::append(self, line)
    }

    fn flush(&mut self) -> io::Result<()> {
        RollingFileWriter::flush(self)
    }
}

enum Message {
    Event(Box<ChannelTimingEvent>),
    Shutdown,
}

/// Process-wide channel timing log.
pub struct ChannelLog {
    sender: Sender<Message>,
    policy: QueueFullPolicy,
    /// `true` once shutdown has queued its stop marker. Producers hold the
    /// read lock while enqueuing so nothing lands behind the marker.
    closed: RwLock<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<ChannelLogMetrics>,
}

impl ChannelLog {
    /// Recover temp files, open the rolling file and start the worker.
    pub fn start(config: &ChannelLogConfig) -> Result<Self, StrandError> {
        recover_temp_files(&config.path);

        let metrics = Arc::new(
            ChannelLogMetrics::new().map_err(|e| StrandError::Metrics(e.to_string()))?,
        );
        let writer = RollingFileWriter::open(RollingFileConfig::from(config))?
            .with_rotation_counter(metrics.rotations.clone())
            .with_rotation_failure_counter(metrics.rotation_failures.clone());

        let log = Self::with_appender(writer, config.queue_size, config.queue_full_policy, metrics)?;
        info!(
            path = %config.path.display(),
            queue_size = config.queue_size,
            policy = ?config.queue_full_policy,
            "Channel log started"
        );
        Ok(log)
    }

    /// Start a log over any appender.
    pub fn with_appender<A: ChannelAppender>(
        appender: A,
        queue_size: usize,
        policy: QueueFullPolicy,
        metrics: Arc<ChannelLogMetrics>,
    ) -> Result<Self, StrandError> {
        let (sender, receiver) = crossbeam_channel::bounded(queue_size.max(1));
        let worker_metrics = Arc::clone(&metrics);
        let worker = std::thread::Builder::new()
            .name("strand-channel-log".to_string())
            .spawn(move || run_worker(receiver, appender, worker_metrics))?;

        Ok(Self {
            sender,
            policy,
            closed: RwLock::new(false),
            worker: Mutex::new(Some(worker)),
            metrics,
        })
    }

    /// Queue one event. Never performs file I/O on the calling thread.
    ///
    /// With [`QueueFullPolicy::Block`] this waits for a free slot when the
    /// queue is full; with [`QueueFullPolicy::Discard`] the event is dropped
    /// and counted. Events logged after [`shutdown`](Self::shutdown) are
    /// dropped and counted.
    pub fn log(&self, event: ChannelTimingEvent) {
        let closed = self.closed.read().unwrap_or_else(|e| e.into_inner());
        if *closed {
            self.metrics.events_dropped.inc();
            return;
        }

        let message = Message::Event(Box::new(event));
        let accepted = match self.policy {
            QueueFullPolicy::Block => self.sender.send(message).is_ok(),
            QueueFullPolicy::Discard => match self.sender.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Channel log queue full, discarding event");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        };
        drop(closed);

        if accepted {
            self.metrics.events_enqueued.inc();
        } else {
            self.metrics.events_dropped.inc();
        }
        self.metrics.queue_depth.set(self.sender.len() as i64);
    }

    pub fn policy(&self) -> QueueFullPolicy {
        self.policy
    }

    pub fn metrics(&self) -> &ChannelLogMetrics {
        &self.metrics
    }

    /// Events dropped so far (queue full or log closed).
    pub fn dropped(&self) -> u64 {
        self.metrics.events_dropped.get()
    }

    /// Stop accepting events, drain everything already queued, flush and
    /// join the worker. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut closed = self.closed.write().unwrap_or_else(|e| e.into_inner());
            if !*closed {
                *closed = true;
                // Lands behind every accepted event.
                let _ = self.sender.send(Message::Shutdown);
            }
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Channel log worker panicked");
        }
    }
}

impl Drop for ChannelLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<A: ChannelAppender>(
    receiver: Receiver<Message>,
    mut appender: A,
    metrics: Arc<ChannelLogMetrics>,
) {
    debug!("Channel log worker running");
    for message in receiver.iter() {
        let event = match message {
            Message::Event(event) => event,
            Message::Shutdown => break,
        };
        write_event(&mut appender, &event, &metrics);

        metrics.queue_depth.set(receiver.len() as i64);
        if receiver.is_empty() {
            flush(&mut appender, &metrics);
        }
    }
    flush(&mut appender, &metrics);
    info!(
        written = metrics.events_written.get(),
        dropped = metrics.events_dropped.get(),
        "Channel log worker stopped"
    );
}

fn write_event<A: ChannelAppender>(
    appender: &mut A,
    event: &ChannelTimingEvent,
    metrics: &ChannelLogMetrics,
) {
    let line = match layout::format_event(event) {
        Ok(line) => line,
        Err(e) => {
            metrics.format_errors.inc();
            warn!(stream_id = event.stream_id(), error = %e, "Skipping unformattable channel event");
            return;
        }
    };
    match appender.append(&line) {
        Ok(()) => metrics.events_written.inc(),
        Err(e) => {
            metrics.write_errors.inc();
            error!(error = %e, "Failed to append channel log line");
        }
    }
}

fn flush<A: ChannelAppender>(appender: &mut A, metrics: &ChannelLogMetrics) {
    if let Err(e) = appender.flush() {
        metrics.write_errors.inc();
        error!(error = %e, "Failed to flush channel log");
    }
}

// ── Temp file recovery ───────────────────────────────────────────────────────

/// Outcome of [`recover_temp_files`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// New names of recovered files.
    pub recovered: Vec<PathBuf>,
    /// Temp files left in place.
    pub skipped: Vec<PathBuf>,
}

/// Rename every `*.tmp` file next to `log_path` to `*.log`.
///
/// An interrupted rotation leaves the uncompressed archive behind as a temp
/// file; this keeps it from being orphaned. A file whose target already
/// exists, or that cannot be renamed, is left where it is.
pub fn recover_temp_files(log_path: &Path) -> RecoveryReport {
    let dir = match log_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut report = RecoveryReport::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "No log directory to recover");
            return report;
        }
    };

    let mut temp_files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEMP_FILE_EXTENSION))
        })
        .collect();
    temp_files.sort();

    for temp in temp_files {
        let Some(name) = temp.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let stem = &name[..name.len() - TEMP_FILE_EXTENSION.len()];
        let target = temp.with_file_name(format!("{stem}{LOG_FILE_EXTENSION}"));

        if target.exists() {
            warn!(
                temp = %temp.display(),
                target = %target.display(),
                "Could not recover temp file, target exists"
            );
            report.skipped.push(temp);
            continue;
        }
        match fs::rename(&temp, &target) {
            Ok(()) => {
                info!(temp = %temp.display(), "Recovered temp file");
                report.recovered.push(target);
            }
            Err(e) => {
                warn!(
                    temp = %temp.display(),
                    target = %target.display(),
                    error = %e,
                    "Could not rename temp file"
                );
                report.skipped.push(temp);
            }
        }
    }
    report
}
