//! Size- and day-based rolling log file with gzip archives.
//!
//! The active file keeps its configured name. On rotation it is renamed to
//! `<file>-<YYYY-MM-DD>.<index>.tmp`, compressed to
//! `<file>-<YYYY-MM-DD>.<index>.log.gz`, and the temp file removed. A `.tmp`
//! left behind by an interrupted rotation is picked up by
//! [`recover_temp_files`](crate::channel_log::recover_temp_files) on the next
//! start and becomes `<file>-<YYYY-MM-DD>.<index>.log`.
//!
//! Rotation happens before an append when the UTC date has changed since the
//! active file was opened, or when the file has reached
//! `max_file_size_bytes`.

use chrono::{DateTime, NaiveDate, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use prometheus::IntCounter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use strand_core::config::ChannelLogConfig;
use tracing::{debug, error, info, warn};

pub(crate) const TEMP_FILE_EXTENSION: &str = ".tmp";
pub(crate) const LOG_FILE_EXTENSION: &str = ".log";
const ARCHIVE_EXTENSION: &str = ".log.gz";
const BUFFER_SIZE: usize = 1024 * 1024;

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RollingFileConfig {
    /// Active file, e.g. `/var/log/strand/http-channel.log`.
    pub file_path: PathBuf,
    /// Size that forces a rotation. 0 = daily rotation only.
    pub max_file_size_bytes: u64,
    /// Archives to keep. 0 = unlimited.
    pub max_history: usize,
}

impl From<&ChannelLogConfig> for RollingFileConfig {
    fn from(config: &ChannelLogConfig) -> Self {
        Self {
            file_path: config.path.clone(),
            max_file_size_bytes: config.max_file_size_bytes,
            max_history: config.max_history,
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Rolling file owned by a single writer thread.
pub struct RollingFileWriter {
    config: RollingFileConfig,
    writer: Option<BufWriter<File>>,
    current_date: NaiveDate,
    current_size: u64,
    rotations: Option<IntCounter>,
    rotation_failures: Option<IntCounter>,
}

impl RollingFileWriter {
    /// Open (or create) the active file, appending to existing content.
    pub fn open(config: RollingFileConfig) -> io::Result<Self> {
        if let Some(parent) = config.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = open_append(&config.file_path)?;
        let metadata = file.metadata()?;
        // An existing file belongs to the day it was last written.
        let current_date = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).date_naive())
            .unwrap_or_else(|_| Utc::now().date_naive());

        info!(path = %config.file_path.display(), "Channel log file opened");

        Ok(Self {
            current_size: metadata.len(),
            writer: Some(BufWriter::with_capacity(BUFFER_SIZE, file)),
            current_date,
            config,
            rotations: None,
            rotation_failures: None,
        })
    }

    /// Count rotations on `counter`.
    pub fn with_rotation_counter(mut self, counter: IntCounter) -> Self {
        self.rotations = Some(counter);
        self
    }

    /// Count failed rotations on `counter`.
    pub fn with_rotation_failure_counter(mut self, counter: IntCounter) -> Self {
        self.rotation_failures = Some(counter);
        self
    }

    pub fn path(&self) -> &Path {
        &self.config.file_path
    }

    /// Bytes in the active file, including buffered bytes.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Append `line` as-is. Rotates first if needed.
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        self.append_on(line, Utc::now().date_naive())
    }

    pub(crate) fn append_on(&mut self, line: &str, today: NaiveDate) -> io::Result<()> {
        let needs_date_rotate = today != self.current_date;
        let needs_size_rotate = self.config.max_file_size_bytes > 0
            && self.current_size >= self.config.max_file_size_bytes;

        if (needs_date_rotate || needs_size_rotate)
            && let Err(e) = self.rotate_on(today)
        {
            // The active file stays open; the line still goes into it.
            if let Some(ref counter) = self.rotation_failures {
                counter.inc();
            }
            error!(error = %e, path = %self.config.file_path.display(), "Channel log rotation failed");
        }

        let writer = self.active()?;
        writer.write_all(line.as_bytes())?;
        self.current_size += line.len() as u64;
        Ok(())
    }

    /// Close the active file, archive it, and start a new one.
    ///
    /// Returns the archive path, or `None` when the active file was empty.
    pub fn rotate(&mut self) -> io::Result<Option<PathBuf>> {
        self.rotate_on(Utc::now().date_naive())
    }

    fn rotate_on(&mut self, today: NaiveDate) -> io::Result<Option<PathBuf>> {
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.flush()
        {
            self.writer = Some(writer);
            return Err(e);
        }

        let archived = if self.current_size > 0 {
            self.archive_active().map(Some)
        } else {
            Ok(None)
        };

        // Always reopen so logging continues even if archiving failed.
        self.writer = Some(BufWriter::with_capacity(
            BUFFER_SIZE,
            open_append(&self.config.file_path)?,
        ));
        self.current_date = today;
        // After a failed archive the file keeps its old content; count from
        // zero so the next attempt waits for another full file.
        self.current_size = match archived {
            Ok(_) => fs::metadata(&self.config.file_path).map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        };

        let archived = archived?;
        if let Some(ref path) = archived {
            if let Some(ref counter) = self.rotations {
                counter.inc();
            }
            info!(
                from = %self.config.file_path.display(),
                to = %path.display(),
                "Rotated channel log"
            );
            if self.config.max_history > 0
                && let Err(e) = prune_archives(&self.config.file_path, self.config.max_history)
            {
                warn!(error = %e, "Failed to prune old channel log archives");
            }
        }
        Ok(archived)
    }

    /// active → `.tmp` → `.log.gz`; the temp file is removed on success.
    fn archive_active(&self) -> io::Result<PathBuf> {
        let base = &self.config.file_path;
        let index = next_index(base, self.current_date)?;
        let temp = archive_path(base, self.current_date, index, TEMP_FILE_EXTENSION);
        let archive = archive_path(base, self.current_date, index, ARCHIVE_EXTENSION);

        fs::rename(base, &temp).inspect_err(|e| {
            error!(
                error = %e,
                from = %base.display(),
                to = %temp.display(),
                "Failed to rotate channel log"
            );
        })?;
        compress(&temp, &archive).inspect_err(|e| {
            error!(error = %e, path = %temp.display(), "Failed to compress rotated channel log");
        })?;
        fs::remove_file(&temp)?;
        Ok(archive)
    }

    /// Flush buffered data to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn active(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let file = open_append(&self.config.file_path)?;
            self.current_size = file.metadata()?.len();
            self.writer = Some(BufWriter::with_capacity(BUFFER_SIZE, file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("channel log writer unavailable"))
    }
}

impl Drop for RollingFileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, path = %self.config.file_path.display(), "Failed to flush channel log");
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `http-channel.log` → `http-channel.log-2025-01-15.0.log.gz`.
fn archive_path(base: &Path, date: NaiveDate, index: u32, extension: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(format!("-{}.{}{}", date.format("%Y-%m-%d"), index, extension));
    PathBuf::from(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Compressed,
    Recovered,
    Temp,
}

/// Parse `<base_name>-<date>.<index><extension>`.
fn parse_archive_name(base_name: &str, name: &str) -> Option<(NaiveDate, u32, ArchiveKind)> {
    let rest = name.strip_prefix(base_name)?.strip_prefix('-')?;
    let (rest, kind) = if let Some(r) = rest.strip_suffix(ARCHIVE_EXTENSION) {
        (r, ArchiveKind::Compressed)
    } else if let Some(r) = rest.strip_suffix(LOG_FILE_EXTENSION) {
        (r, ArchiveKind::Recovered)
    } else if let Some(r) = rest.strip_suffix(TEMP_FILE_EXTENSION) {
        (r, ArchiveKind::Temp)
    } else {
        return None;
    };
    let (date, index) = rest.split_once('.')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let index = index.parse().ok()?;
    Some((date, index, kind))
}

/// Archives (and temp files) that belong to `base`, as `(date, index, kind, path)`.
fn list_archives(base: &Path) -> io::Result<Vec<(NaiveDate, u32, ArchiveKind, PathBuf)>> {
    let parent = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base_name = base.file_name().unwrap_or_default().to_string_lossy();

    let mut archives = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some((date, index, kind)) = parse_archive_name(&base_name, &name.to_string_lossy()) {
            archives.push((date, index, kind, entry.path()));
        }
    }
    archives.sort_by_key(|&(date, index, _, _)| (date, index));
    Ok(archives)
}

/// Next free index for `date`, counting temp files so they are never clobbered.
fn next_index(base: &Path, date: NaiveDate) -> io::Result<u32> {
    Ok(list_archives(base)?
        .iter()
        .filter(|(d, _, _, _)| *d == date)
        .map(|(_, index, _, _)| index + 1)
        .max()
        .unwrap_or(0))
}

/// Keep only the newest `keep` archives, oldest first by `(date, index)`.
fn prune_archives(base: &Path, keep: usize) -> io::Result<()> {
    let archives: Vec<_> = list_archives(base)?
        .into_iter()
        .filter(|(_, _, kind, _)| *kind != ArchiveKind::Temp)
        .collect();

    if archives.len() > keep {
        let to_remove = archives.len() - keep;
        for (_, _, _, path) in archives.iter().take(to_remove) {
            debug!(path = %path.display(), "Pruning old channel log archive");
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn compress(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(src)?);
    let output = BufWriter::new(File::create(dst)?);
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()
}

// ── Tests ────────────────────────────────────────────────────────────────────
