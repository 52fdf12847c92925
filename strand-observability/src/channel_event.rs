use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One response chunk: its size and its offset from the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSample {
    pub bytes: u64,
    pub offset_millis: u64,
}

/// Timing record for one completed request/response exchange on a stream.
///
/// Built once when the exchange completes and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTimingEvent {
    timestamp: DateTime<Utc>,
    stream_id: u32,
    method: String,
    uri: String,
    begin_to_dispatch_millis: u64,
    first_to_last_content_millis: u64,
    total_processing_millis: u64,
    content_samples: Option<Vec<ContentSample>>,
}

impl ChannelTimingEvent {
    /// An empty sample list is stored as `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        stream_id: u32,
        method: impl Into<String>,
        uri: impl Into<String>,
        begin_to_dispatch_millis: u64,
        first_to_last_content_millis: u64,
        total_processing_millis: u64,
        content_samples: Option<Vec<ContentSample>>,
    ) -> Self {
        Self {
            timestamp,
            stream_id,
            method: method.into(),
            uri: uri.into(),
            begin_to_dispatch_millis,
            first_to_last_content_millis,
            total_processing_millis,
            content_samples: content_samples.filter(|s| !s.is_empty()),
        }
    }

    /// Wall-clock time the request began.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn begin_to_dispatch_millis(&self) -> u64 {
        self.begin_to_dispatch_millis
    }

    pub fn first_to_last_content_millis(&self) -> u64 {
        self.first_to_last_content_millis
    }

    pub fn total_processing_millis(&self) -> u64 {
        self.total_processing_millis
    }

    /// Present only when the response was written in two or more chunks.
    pub fn content_samples(&self) -> Option<&[ContentSample]> {
        self.content_samples.as_deref()
    }
}
