use riemlog_core::model::record::LogRecord;
use riemlog_core::severity::Severity;

pub fn should_forward(record: &LogRecord, minimum: Severity) -> bool {
    record.severity >= minimum
}
