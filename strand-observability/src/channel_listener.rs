//! Per-exchange timing capture on a multiplexed server channel.
//!
//! The host transport drives one [`ExchangeTiming`] per stream through
//! `begin → before_dispatch → response_content* → complete`. The value is owned
//! by whoever processes the stream, so exchanges never share mutable state.
//! Completion moves it into [`ChannelListener::on_complete`], which turns it
//! into an immutable [`ChannelTimingEvent`] and queues it on the channel log.

use crate::channel_event::{ChannelTimingEvent, ContentSample};
use crate::channel_log::ChannelLog;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// Lifecycle checkpoint reported by the host transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Begin,
    BeforeDispatch,
    ResponseContent,
    Complete,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::Begin => "begin",
            Checkpoint::BeforeDispatch => "before_dispatch",
            Checkpoint::ResponseContent => "response_content",
            Checkpoint::Complete => "complete",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an exchange is in its lifecycle. Completion consumes the
/// [`ExchangeTiming`], so there is no completed phase to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Began,
    Dispatched,
    /// Number of response content writes seen so far (at least one).
    Receiving(usize),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NotStarted => f.write_str("not_started"),
            Phase::Began => f.write_str("began"),
            Phase::Dispatched => f.write_str("dispatched"),
            Phase::Receiving(n) => write!(f, "receiving({n})"),
        }
    }
}

/// A checkpoint arrived out of order. This is a contract violation by the
/// host transport; no record is produced for the exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    #[error("{checkpoint} observed in phase {phase} on stream {stream_id}")]
    OutOfOrder {
        stream_id: u32,
        checkpoint: Checkpoint,
        phase: Phase,
    },
}

/// Timing marks accumulated for one in-flight exchange.
#[derive(Debug)]
pub struct ExchangeTiming {
    stream_id: u32,
    method: String,
    uri: String,
    phase: Phase,
    timestamp: Option<DateTime<Utc>>,
    began_at: Option<Instant>,
    begin_to_dispatch: Duration,
    content: Vec<(u64, Instant)>,
}

impl ExchangeTiming {
    pub fn new(stream_id: u32, method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            stream_id,
            method: method.into(),
            uri: uri.into(),
            phase: Phase::NotStarted,
            timestamp: None,
            began_at: None,
            begin_to_dispatch: Duration::ZERO,
            content: Vec::new(),
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Request bytes started arriving.
    pub fn begin(&mut self) -> Result<(), TimingError> {
        self.begin_at(Instant::now())
    }

    pub fn begin_at(&mut self, at: Instant) -> Result<(), TimingError> {
        self.expect(Checkpoint::Begin, matches!(self.phase, Phase::NotStarted))?;
        self.timestamp = Some(Utc::now());
        self.began_at = Some(at);
        self.phase = Phase::Began;
        Ok(())
    }

    /// Request is about to be handed to application code.
    pub fn before_dispatch(&mut self) -> Result<(), TimingError> {
        self.before_dispatch_at(Instant::now())
    }

    pub fn before_dispatch_at(&mut self, at: Instant) -> Result<(), TimingError> {
        self.expect(Checkpoint::BeforeDispatch, matches!(self.phase, Phase::Began))?;
        self.begin_to_dispatch = self.elapsed_since_begin(at);
        self.phase = Phase::Dispatched;
        Ok(())
    }

    /// One response chunk of `bytes` was written.
    pub fn response_content(&mut self, bytes: usize) -> Result<(), TimingError> {
        self.response_content_at(bytes, Instant::now())
    }

    pub fn response_content_at(&mut self, bytes: usize, at: Instant) -> Result<(), TimingError> {
        let n = match self.phase {
            Phase::Dispatched => 0,
            Phase::Receiving(n) => n,
            _ => return Err(self.out_of_order(Checkpoint::ResponseContent)),
        };
        self.content.push((bytes as u64, at));
        self.phase = Phase::Receiving(n + 1);
        Ok(())
    }

    /// Response fully sent. Consumes the marks and builds the record.
    pub fn complete(self) -> Result<ChannelTimingEvent, TimingError> {
        self.complete_at(Instant::now())
    }

    pub fn complete_at(self, at: Instant) -> Result<ChannelTimingEvent, TimingError> {
        self.expect(
            Checkpoint::Complete,
            matches!(self.phase, Phase::Dispatched | Phase::Receiving(_)),
        )?;

        let total = self.elapsed_since_begin(at);
        let (first_to_last, samples) = content_timing(&self.content);
        Ok(ChannelTimingEvent::new(
            self.timestamp.unwrap_or_else(Utc::now),
            self.stream_id,
            self.method,
            self.uri,
            millis(self.begin_to_dispatch),
            millis(first_to_last),
            millis(total),
            samples,
        ))
    }

    fn elapsed_since_begin(&self, at: Instant) -> Duration {
        self.began_at
            .map(|begin| at.saturating_duration_since(begin))
            .unwrap_or_default()
    }

    fn expect(&self, checkpoint: Checkpoint, allowed: bool) -> Result<(), TimingError> {
        if allowed {
            Ok(())
        } else {
            Err(self.out_of_order(checkpoint))
        }
    }

    fn out_of_order(&self, checkpoint: Checkpoint) -> TimingError {
        TimingError::OutOfOrder {
            stream_id: self.stream_id,
            checkpoint,
            phase: self.phase,
        }
    }
}

/// First-to-last content time and per-chunk samples. Fewer than two chunks
/// carry no timing information.
fn content_timing(content: &[(u64, Instant)]) -> (Duration, Option<Vec<ContentSample>>) {
    if content.len() < 2 {
        return (Duration::ZERO, None);
    }
    let first = content[0].1;
    let last = content[content.len() - 1].1;

    let samples = content
        .iter()
        .map(|&(bytes, at)| ContentSample {
            bytes,
            offset_millis: millis(at.saturating_duration_since(first)),
        })
        .collect();
    (last.saturating_duration_since(first), Some(samples))
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Bridges host lifecycle callbacks to the channel log.
#[derive(Clone)]
pub struct ChannelListener {
    log: Arc<ChannelLog>,
}

impl ChannelListener {
    pub fn new(log: Arc<ChannelLog>) -> Self {
        Self { log }
    }

    /// Start timing a new exchange.
    pub fn on_request_begin(
        &self,
        stream_id: u32,
        method: impl Into<String>,
        uri: impl Into<String>,
    ) -> ExchangeTiming {
        self.on_request_begin_at(stream_id, method, uri, Instant::now())
    }

    pub fn on_request_begin_at(
        &self,
        stream_id: u32,
        method: impl Into<String>,
        uri: impl Into<String>,
        at: Instant,
    ) -> ExchangeTiming {
        let mut timing = ExchangeTiming::new(stream_id, method, uri);
        timing.timestamp = Some(Utc::now());
        timing.began_at = Some(at);
        timing.phase = Phase::Began;
        timing
    }

    /// Finish an exchange and queue its record.
    pub fn on_complete(&self, timing: ExchangeTiming) -> Result<(), TimingError> {
        self.on_complete_at(timing, Instant::now())
    }

    pub fn on_complete_at(&self, timing: ExchangeTiming, at: Instant) -> Result<(), TimingError> {
        match timing.complete_at(at) {
            Ok(event) => {
                self.log.log(event);
                Ok(())
            }
            Err(e) => {
                self.log.metrics().timing_violations.inc();
                error!(error = %e, "Dropping channel timing for out-of-order exchange");
                Err(e)
            }
        }
    }

    /// Release an exchange that will never complete (client reset, abort)
    /// without emitting a record.
    pub fn on_abandon(&self, timing: ExchangeTiming) {
        self.log.metrics().exchanges_abandoned.inc();
        debug!(stream_id = timing.stream_id, phase = %timing.phase, "Channel exchange abandoned");
    }

    /// Report a checkpoint failure the host observed itself.
    pub fn on_violation(&self, error: &TimingError) {
        self.log.metrics().timing_violations.inc();
        error!(error = %error, "Channel timing checkpoint out of order");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn dispatched(t0: Instant) -> ExchangeTiming {
        let mut t = ExchangeTiming::new(3, "GET", "/v1/info");
        t.begin_at(t0).unwrap();
        t.before_dispatch_at(t0 + ms(2)).unwrap();
        t
    }

    // ── Derived fields ───────────────────────────────────────────

    #[test]
    fn three_content_marks_produce_relative_samples() {
        let t0 = Instant::now();
        let mut t = dispatched(t0);
        let c0 = t0 + ms(10);
        t.response_content_at(100, c0).unwrap();
        t.response_content_at(200, c0 + ms(5)).unwrap();
        t.response_content_at(50, c0 + ms(12)).unwrap();
        let event = t.complete_at(c0 + ms(15)).unwrap();

        assert_eq!(event.begin_to_dispatch_millis(), 2);
        assert_eq!(event.first_to_last_content_millis(), 12);
        assert_eq!(event.total_processing_millis(), 25);
        assert_eq!(
            event.content_samples().unwrap(),
            &[
                ContentSample { bytes: 100, offset_millis: 0 },
                ContentSample { bytes: 200, offset_millis: 5 },
                ContentSample { bytes: 50, offset_millis: 12 },
            ]
        );
    }

    #[test]
    fn no_content_marks_have_no_samples() {
        let t0 = Instant::now();
        let event = dispatched(t0).complete_at(t0 + ms(4)).unwrap();
        assert_eq!(event.first_to_last_content_millis(), 0);
        assert!(event.content_samples().is_none());
        assert_eq!(event.total_processing_millis(), 4);
    }

    #[test]
    fn single_content_mark_has_no_samples() {
        let t0 = Instant::now();
        let mut t = dispatched(t0);
        t.response_content_at(4096, t0 + ms(3)).unwrap();
        let event = t.complete_at(t0 + ms(4)).unwrap();
        assert_eq!(event.first_to_last_content_millis(), 0);
        assert!(event.content_samples().is_none());
    }

    #[test]
    fn durations_truncate_to_milliseconds() {
        let t0 = Instant::now();
        let mut t = ExchangeTiming::new(1, "GET", "/");
        t.begin_at(t0).unwrap();
        t.before_dispatch_at(t0 + Duration::from_micros(1_999)).unwrap();
        let event = t.complete_at(t0 + Duration::from_micros(2_999)).unwrap();
        assert_eq!(event.begin_to_dispatch_millis(), 1);
        assert_eq!(event.total_processing_millis(), 2);
    }

    #[test]
    fn record_carries_request_identity() {
        let t0 = Instant::now();
        let event = dispatched(t0).complete_at(t0).unwrap();
        assert_eq!(event.stream_id(), 3);
        assert_eq!(event.method(), "GET");
        assert_eq!(event.uri(), "/v1/info");
    }

    // ── Phase transitions ────────────────────────────────────────

    #[test]
    fn phases_advance_in_order() {
        let t0 = Instant::now();
        let mut t = ExchangeTiming::new(9, "PUT", "/");
        assert_eq!(t.phase(), Phase::NotStarted);
        t.begin_at(t0).unwrap();
        assert_eq!(t.phase(), Phase::Began);
        t.before_dispatch_at(t0).unwrap();
        assert_eq!(t.phase(), Phase::Dispatched);
        t.response_content_at(1, t0).unwrap();
        t.response_content_at(1, t0).unwrap();
        assert_eq!(t.phase(), Phase::Receiving(2));
    }

    #[test]
    fn complete_without_begin_is_rejected() {
        let t = ExchangeTiming::new(11, "GET", "/");
        let err = t.complete().unwrap_err();
        assert_eq!(
            err,
            TimingError::OutOfOrder {
                stream_id: 11,
                checkpoint: Checkpoint::Complete,
                phase: Phase::NotStarted,
            }
        );
    }

    #[test]
    fn complete_before_dispatch_is_rejected() {
        let mut t = ExchangeTiming::new(1, "GET", "/");
        t.begin().unwrap();
        assert!(matches!(
            t.complete(),
            Err(TimingError::OutOfOrder { phase: Phase::Began, .. })
        ));
    }

    #[test]
    fn content_before_dispatch_is_rejected_and_state_kept() {
        let mut t = ExchangeTiming::new(1, "GET", "/");
        t.begin().unwrap();
        let err = t.response_content(10).unwrap_err();
        assert_eq!(err.to_string(), "response_content observed in phase began on stream 1");
        assert_eq!(t.phase(), Phase::Began);
    }

    #[test]
    fn begin_twice_is_rejected() {
        let mut t = ExchangeTiming::new(1, "GET", "/");
        t.begin().unwrap();
        assert!(t.begin().is_err());
    }

    #[test]
    fn dispatch_after_content_is_rejected() {
        let t0 = Instant::now();
        let mut t = dispatched(t0);
        t.response_content_at(1, t0).unwrap();
        assert!(matches!(
            t.before_dispatch_at(t0),
            Err(TimingError::OutOfOrder { phase: Phase::Receiving(1), .. })
        ));
    }
}
