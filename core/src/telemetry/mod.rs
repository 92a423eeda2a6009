pub mod log;
pub mod metrics;

pub use self::log::LogSink;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
