use std::time::{Duration, Instant};
use strand_core::config::SelectorConfig;
use tracing::info;

/// Timing for a single selector pass.
///
/// The selector loop owns one of these per pass: `begin` when the pass
/// starts, `key_selected` for each ready key, `end` when it finishes. Slow
/// passes are reported with the offset of every selected key.
#[derive(Debug)]
pub struct SelectionTiming {
    started: Instant,
    keys: Vec<Instant>,
}

impl SelectionTiming {
    pub fn begin() -> Self {
        Self::begin_at(Instant::now())
    }

    pub fn begin_at(at: Instant) -> Self {
        Self {
            started: at,
            keys: Vec::new(),
        }
    }

    pub fn key_selected(&mut self) {
        self.key_selected_at(Instant::now());
    }

    pub fn key_selected_at(&mut self, at: Instant) {
        self.keys.push(at);
    }

    /// Keys selected so far.
    pub fn keys(&self) -> usize {
        self.keys.len()
    }

    /// Finish the pass. Returns the comma-separated key offsets in
    /// microseconds when the pass took at least `threshold`.
    pub fn end(self, threshold: Duration) -> Option<String> {
        self.end_at(Instant::now(), threshold)
    }

    /// [`end`](Self::end) with the configured slow-pass threshold.
    pub fn end_with(self, config: &SelectorConfig) -> Option<String> {
        self.end(config.slow_threshold())
    }

    pub fn end_at(self, at: Instant, threshold: Duration) -> Option<String> {
        let elapsed = at.saturating_duration_since(self.started);
        if elapsed < threshold {
            return None;
        }

        let mut buf = itoa::Buffer::new();
        let mut offsets = String::with_capacity(self.keys.len() * 8);
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                offsets.push(',');
            }
            let micros = key.saturating_duration_since(self.started).as_micros();
            offsets.push_str(buf.format(u64::try_from(micros).unwrap_or(u64::MAX)));
        }

        info!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            keys = self.keys.len(),
            offsets_us = %offsets,
            "Slow selector pass"
        );
        Some(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(5);

    #[test]
    fn fast_pass_reports_nothing() {
        let t0 = Instant::now();
        let mut timing = SelectionTiming::begin_at(t0);
        timing.key_selected_at(t0 + Duration::from_millis(1));
        assert_eq!(timing.end_at(t0 + Duration::from_millis(10), THRESHOLD), None);
    }

    #[test]
    fn slow_pass_lists_key_offsets_in_micros() {
        let t0 = Instant::now();
        let mut timing = SelectionTiming::begin_at(t0);
        timing.key_selected_at(t0 + Duration::from_micros(15));
        timing.key_selected_at(t0 + Duration::from_millis(3));
        timing.key_selected_at(t0 + Duration::from_secs(5));
        assert_eq!(timing.keys(), 3);

        let offsets = timing.end_at(t0 + Duration::from_secs(6), THRESHOLD);
        assert_eq!(offsets.as_deref(), Some("15,3000,5000000"));
    }

    #[test]
    fn pass_exactly_at_threshold_is_slow() {
        let t0 = Instant::now();
        let timing = SelectionTiming::begin_at(t0);
        assert_eq!(timing.end_at(t0 + THRESHOLD, THRESHOLD).as_deref(), Some(""));
    }

    #[test]
    fn configured_threshold_applies() {
        let zero: SelectorConfig = serde_json::from_str(r#"{"slow_threshold_ms": 0}"#).unwrap();
        let mut timing = SelectionTiming::begin();
        timing.key_selected();
        assert!(timing.end_with(&zero).is_some());

        let default: SelectorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(SelectionTiming::begin().end_with(&default), None);
    }

    #[test]
    fn zero_threshold_always_reports() {
        let t0 = Instant::now();
        let mut timing = SelectionTiming::begin_at(t0);
        timing.key_selected_at(t0);
        assert_eq!(timing.end_at(t0, Duration::ZERO).as_deref(), Some("0"));
    }
}
