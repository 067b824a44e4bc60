use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Exception details attached to a log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrowableInfo {
    pub class_name: String,
    pub message: String,
    pub frames: Vec<String>,
}

/// One log statement as seen by the forwarder. Immutable for the duration of
/// a forward attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    pub logger: String,
    pub thread: String,
    pub timestamp_millis: i64,
    pub throwable: Option<ThrowableInfo>,
    pub caller_frames: Vec<String>,
    pub markers: Vec<String>,
    /// Diagnostic context in source insertion order.
    pub context: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            logger: String::new(),
            thread: String::new(),
            timestamp_millis: 0,
            throwable: None,
            caller_frames: Vec::new(),
            markers: Vec::new(),
            context: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = logger.into();
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = thread.into();
        self
    }

    pub fn with_timestamp_millis(mut self, ts: i64) -> Self {
        self.timestamp_millis = ts;
        self
    }

    pub fn with_throwable(mut self, throwable: ThrowableInfo) -> Self {
        self.throwable = Some(throwable);
        self
    }

    pub fn with_caller_frame(mut self, frame: impl Into<String>) -> Self {
        self.caller_frames.push(frame.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }
}
