pub mod channel_event;
pub mod channel_listener;
pub mod channel_log;
pub mod layout;
pub mod metrics;
pub mod prometheus_exporter;
pub mod rolling_writer;
pub mod selector_timing;

pub use channel_event::{ChannelTimingEvent, ContentSample};
pub use channel_listener::{ChannelListener, ExchangeTiming, TimingError};
pub use channel_log::{ChannelAppender, ChannelLog, RecoveryReport, recover_temp_files};
pub use layout::LayoutError;
pub use metrics::ChannelLogMetrics;
pub use rolling_writer::{RollingFileConfig, RollingFileWriter};
pub use selector_timing::SelectionTiming;
