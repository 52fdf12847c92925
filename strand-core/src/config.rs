use crate::error::StrandError;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrandConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub channel_log: ChannelLogConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
}

/// Asynchronous address resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound for one delegated DNS lookup.
    #[serde(default = "default_resolve_timeout")]
    pub timeout_ms: u64,
}

/// Per-exchange channel timing log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Active log file. Rotated files are written next to it as
    /// `<path>-<date>.<index>.log.gz`.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    /// Rotated files to keep. 0 = unlimited.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Capacity of the queue between request threads and the writer.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Size that forces a rotation. 0 = daily rotation only.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default)]
    pub queue_full_policy: QueueFullPolicy,
}

/// What `log()` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueFullPolicy {
    /// Wait for the writer to free a slot.
    #[default]
    Block,
    /// Drop the event and count it.
    Discard,
}

/// Slow-pass threshold for a host selector loop, applied through
/// `SelectionTiming::end_with`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Passes at least this long get their key timings logged.
    #[serde(default = "default_slow_selection")]
    pub slow_threshold_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_resolve_timeout() -> u64 { 5000 }
fn default_true() -> bool { true }
fn default_log_path() -> PathBuf { PathBuf::from("var/log/http-channel.log") }
fn default_max_history() -> usize { 15 }
fn default_queue_size() -> usize { 10_000 }
fn default_max_file_size() -> u64 { 100 * 1024 * 1024 }
fn default_slow_selection() -> u64 { 5000 }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_resolve_timeout(),
        }
    }
}

impl Default for ChannelLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_log_path(),
            max_history: default_max_history(),
            queue_size: default_queue_size(),
            max_file_size_bytes: default_max_file_size(),
            queue_full_policy: QueueFullPolicy::Block,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: default_slow_selection(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SelectorConfig {
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

impl StrandConfig {
    /// Load configuration from a YAML file + `STRAND_` env overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `STRAND_CHANNEL_LOG__QUEUE_SIZE=512`.
    pub fn load(path: &Path) -> Result<Self, StrandError> {
        let config: StrandConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("STRAND_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the channel log cannot run with.
    pub fn validate(&self) -> Result<(), StrandError> {
        if self.channel_log.queue_size == 0 {
            return Err(StrandError::Config(
                "channel_log.queue_size must be at least 1".into(),
            ));
        }
        if self.channel_log.path.file_name().is_none() {
            return Err(StrandError::Config(format!(
                "channel_log.path has no file name: {}",
                self.channel_log.path.display()
            )));
        }
        Ok(())
    }
}
