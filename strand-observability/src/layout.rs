//! Tab-delimited channel log line.
//!
//! ```text
//! timestamp  stream  method  uri  begin→dispatch  first→last content  total  samples
//! ```
//!
//! `timestamp` is RFC 3339 in UTC with millisecond precision, durations are
//! whole milliseconds, and `samples` is `bytes,offset,bytes,offset,...` or the
//! literal `[]` when the response had fewer than two content writes.

use crate::channel_event::{ChannelTimingEvent, ContentSample};
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

const FIELD_COUNT: usize = 8;
const NO_SAMPLES: &str = "[]";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{field} contains a tab or line break")]
    ForbiddenCharacter { field: &'static str },

    #[error("expected 8 tab-separated fields, found {0}")]
    FieldCount(usize),

    #[error("invalid timestamp {value:?}")]
    Timestamp { value: String },

    #[error("invalid {field} value {value:?}")]
    Integer { field: &'static str, value: String },

    #[error("invalid content samples {value:?}")]
    Samples { value: String },
}

/// Render one event as a newline-terminated line.
pub fn format_event(event: &ChannelTimingEvent) -> Result<String, LayoutError> {
    check_field("method", event.method())?;
    check_field("uri", event.uri())?;

    let mut line = String::with_capacity(96 + event.uri().len());
    let mut buf = itoa::Buffer::new();

    line.push_str(&event.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true));
    line.push('\t');
    line.push_str(buf.format(event.stream_id()));
    line.push('\t');
    line.push_str(event.method());
    line.push('\t');
    line.push_str(event.uri());
    line.push('\t');
    line.push_str(buf.format(event.begin_to_dispatch_millis()));
    line.push('\t');
    line.push_str(buf.format(event.first_to_last_content_millis()));
    line.push('\t');
    line.push_str(buf.format(event.total_processing_millis()));
    line.push('\t');

    match event.content_samples() {
        Some(samples) => {
            for (i, sample) in samples.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push_str(buf.format(sample.bytes));
                line.push(',');
                line.push_str(buf.format(sample.offset_millis));
            }
        }
        None => line.push_str(NO_SAMPLES),
    }

    line.push('\n');
    Ok(line)
}

/// Parse a line produced by [`format_event`].
pub fn parse_line(line: &str) -> Result<ChannelTimingEvent, LayoutError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != FIELD_COUNT {
        return Err(LayoutError::FieldCount(fields.len()));
    }

    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .map_err(|_| LayoutError::Timestamp {
            value: fields[0].to_string(),
        })?
        .with_timezone(&Utc);
    let stream_id = parse_int("stream_id", fields[1])?;
    let begin_to_dispatch = parse_int("begin_to_dispatch", fields[4])?;
    let first_to_last = parse_int("first_to_last_content", fields[5])?;
    let total = parse_int("total_processing", fields[6])?;
    let samples = parse_samples(fields[7])?;

    Ok(ChannelTimingEvent::new(
        timestamp,
        stream_id,
        fields[2],
        fields[3],
        begin_to_dispatch,
        first_to_last,
        total,
        samples,
    ))
}

fn check_field(field: &'static str, value: &str) -> Result<(), LayoutError> {
    if value.contains(['\t', '\r', '\n']) {
        return Err(LayoutError::ForbiddenCharacter { field });
    }
    Ok(())
}

fn parse_int<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, LayoutError> {
    value.parse().map_err(|_| LayoutError::Integer {
        field,
        value: value.to_string(),
    })
}

fn parse_samples(value: &str) -> Result<Option<Vec<ContentSample>>, LayoutError> {
    if value == NO_SAMPLES {
        return Ok(None);
    }
    let invalid = || LayoutError::Samples {
        value: value.to_string(),
    };

    let numbers = value
        .split(',')
        .map(|n| n.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    if numbers.len() % 2 != 0 {
        return Err(invalid());
    }

    Ok(Some(
        numbers
            .chunks_exact(2)
            .map(|pair| ContentSample {
                bytes: pair[0],
                offset_millis: pair[1],
            })
            .collect(),
    ))
}
