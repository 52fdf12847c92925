use crate::prometheus_exporter::render_metrics;
use prometheus::{IntCounter, IntGauge, Registry};

/// Counters for the channel timing pipeline.
///
/// Every channel log owns one of these; the registry can be scraped with
/// [`ChannelLogMetrics::render`] or merged into a host registry by
/// registering the individual collectors.
pub struct ChannelLogMetrics {
    registry: Registry,
    pub events_enqueued: IntCounter,
    pub events_written: IntCounter,
    pub events_dropped: IntCounter,
    pub format_errors: IntCounter,
    pub write_errors: IntCounter,
    pub rotations: IntCounter,
    pub rotation_failures: IntCounter,
    pub exchanges_abandoned: IntCounter,
    pub timing_violations: IntCounter,
    pub queue_depth: IntGauge,
}

impl ChannelLogMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_enqueued = IntCounter::new(
            "strand_channel_events_enqueued_total",
            "Channel timing events accepted by the log queue",
        )?;
        let events_written = IntCounter::new(
            "strand_channel_events_written_total",
            "Channel timing events appended to the log file",
        )?;
        let events_dropped = IntCounter::new(
            "strand_channel_events_dropped_total",
            "Channel timing events dropped because the queue was full or closed",
        )?;
        let format_errors = IntCounter::new(
            "strand_channel_format_errors_total",
            "Channel timing events skipped because they could not be formatted",
        )?;
        let write_errors = IntCounter::new(
            "strand_channel_write_errors_total",
            "Failed appends or flushes of the channel log file",
        )?;
        let rotations = IntCounter::new(
            "strand_channel_log_rotations_total",
            "Channel log file rotations",
        )?;
        let rotation_failures = IntCounter::new(
            "strand_channel_log_rotation_failures_total",
            "Channel log rotations that could not archive the active file",
        )?;
        let exchanges_abandoned = IntCounter::new(
            "strand_channel_exchanges_abandoned_total",
            "Exchanges released without completing",
        )?;
        let timing_violations = IntCounter::new(
            "strand_channel_timing_violations_total",
            "Exchanges whose checkpoints arrived out of order",
        )?;
        let queue_depth = IntGauge::new(
            "strand_channel_log_queue_depth",
            "Events waiting for the channel log writer",
        )?;

        registry.register(Box::new(events_enqueued.clone()))?;
        registry.register(Box::new(events_written.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(format_errors.clone()))?;
        registry.register(Box::new(write_errors.clone()))?;
        registry.register(Box::new(rotations.clone()))?;
        registry.register(Box::new(rotation_failures.clone()))?;
        registry.register(Box::new(exchanges_abandoned.clone()))?;
        registry.register(Box::new(timing_violations.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            events_enqueued,
            events_written,
            events_dropped,
            format_errors,
            write_errors,
            rotations,
            rotation_failures,
            exchanges_abandoned,
            timing_violations,
            queue_depth,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        render_metrics(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_collector_starts_at_zero() {
        let m = ChannelLogMetrics::new().unwrap();
        assert_eq!(m.events_enqueued.get(), 0);
        assert_eq!(m.events_dropped.get(), 0);
        assert_eq!(m.queue_depth.get(), 0);
    }

    #[test]
    fn render_contains_all_series() {
        let m = ChannelLogMetrics::new().unwrap();
        m.events_written.inc();
        let output = m.render();
        for name in [
            "strand_channel_events_enqueued_total",
            "strand_channel_events_written_total",
            "strand_channel_events_dropped_total",
            "strand_channel_format_errors_total",
            "strand_channel_write_errors_total",
            "strand_channel_log_rotations_total",
            "strand_channel_log_rotation_failures_total",
            "strand_channel_exchanges_abandoned_total",
            "strand_channel_timing_violations_total",
            "strand_channel_log_queue_depth",
        ] {
            assert!(output.contains(name), "missing {name}");
        }
        assert!(output.contains("strand_channel_events_written_total 1"));
    }

    #[test]
    fn collectors_are_independent_per_instance() {
        let a = ChannelLogMetrics::new().unwrap();
        let b = ChannelLogMetrics::new().unwrap();
        a.events_dropped.inc_by(3);
        assert_eq!(a.events_dropped.get(), 3);
        assert_eq!(b.events_dropped.get(), 0);
    }
}
