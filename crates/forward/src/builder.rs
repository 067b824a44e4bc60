//! Translation of log records into collector events.
//!
//! The mapping is a pure function of the record and the configuration:
//!
//! | event field      | source                                   |
//! |------------------|------------------------------------------|
//! | `host`           | configured hostname                      |
//! | `service`        | configured service name                  |
//! | `time`           | record timestamp in whole seconds        |
//! | `description`    | formatted message                        |
//! | `state`          | severity name, e.g. `ERROR`              |
//! | `log/level`      | severity name                            |
//! | `log/logger`     | logger name                              |
//! | `log/thread`     | thread name                              |
//! | `log/message`    | formatted message                        |
//! | `log/stacktrace` | throwable or caller frames, when present |
//! | `log/<key>`      | diagnostic context, then custom attributes |
//!
//! Markers become `log/<marker>` tags.

use std::fmt::Write;

use riemlog_core::config::Config;
use riemlog_core::model::event::{MonitoringEvent, namespaced};
use riemlog_core::model::record::LogRecord;
use riemlog_core::time::millis_to_seconds;

pub fn build_event(record: &LogRecord, cfg: &Config) -> MonitoringEvent {
    let severity = record.severity.as_str();
    let mut event = MonitoringEvent {
        host: cfg.hostname.clone(),
        service: cfg.service_name.clone(),
        time: millis_to_seconds(record.timestamp_millis),
        description: record.message.clone(),
        state: severity.to_string(),
        attributes: Vec::new(),
        tags: Vec::new(),
    };

    event.set_attribute("log/level", severity);
    event.set_attribute("log/logger", record.logger.as_str());
    event.set_attribute("log/thread", record.thread.as_str());
    event.set_attribute("log/message", record.message.as_str());

    if let Some(stacktrace) = format_stacktrace(record) {
        event.set_attribute("log/stacktrace", stacktrace);
    }

    for marker in &record.markers {
        event.add_tag(namespaced(marker));
    }

    // Custom attributes go last so they win over context keys.
    for (key, value) in record.context.iter().chain(cfg.custom_attributes.iter()) {
        event.set_attribute(namespaced(key), value.as_str());
    }

    event
}

/// Renders the record's throwable as `"<class>: <message>\n"` plus one
/// tab-indented line per frame. Without a throwable the caller frames are
/// rendered alone. Returns `None` when there is nothing to render.
pub fn format_stacktrace(record: &LogRecord) -> Option<String> {
    let mut out = String::new();
    match &record.throwable {
        Some(throwable) => {
            let _ = writeln!(out, "{}: {}", throwable.class_name, throwable.message);
            push_frames(&mut out, &throwable.frames);
        }
        None if !record.caller_frames.is_empty() => push_frames(&mut out, &record.caller_frames),
        None => return None,
    }
    Some(out)
}

fn push_frames(out: &mut String, frames: &[String]) {
    for frame in frames {
        let _ = writeln!(out, "\t{frame}");
    }
}

#[cfg(test)]
mod tests {
    use riemlog_core::model::record::ThrowableInfo;
    use riemlog_core::severity::Severity;

    use super::*;

    fn cfg() -> Config {
        Config {
            service_name: "billing".into(),
            hostname: "web-1".into(),
            ..Config::default()
        }
    }

    fn record() -> LogRecord {
        LogRecord::new(Severity::Error, "payment failed")
            .with_logger("billing.api")
            .with_thread("worker-3")
            .with_timestamp_millis(1_700_000_000_750)
    }

    #[test]
    fn maps_descriptive_fields() {
        let event = build_event(&record(), &cfg());

        assert_eq!(event.host, "web-1");
        assert_eq!(event.service, "billing");
        assert_eq!(event.time, 1_700_000_000);
        assert_eq!(event.description, "payment failed");
        assert_eq!(event.state, "ERROR");
        let keys: Vec<_> = event.attributes.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["log/level", "log/logger", "log/thread", "log/message"]
        );
        assert_eq!(event.attribute("log/logger"), Some("billing.api"));
        assert_eq!(event.attribute("log/thread"), Some("worker-3"));
        assert!(event.tags.is_empty());
    }

    #[test]
    fn state_follows_record_severity() {
        let rec = LogRecord::new(Severity::Warn, "slow");
        let event = build_event(&rec, &cfg());
        assert_eq!(event.state, "WARN");
        assert_eq!(event.attribute("log/level"), Some("WARN"));
    }

    #[test]
    fn build_is_deterministic() {
        let rec = record()
            .with_context("user", "alice")
            .with_context("request", "r-1")
            .with_marker("AUDIT");
        assert_eq!(build_event(&rec, &cfg()), build_event(&rec, &cfg()));
    }

    #[test]
    fn context_keys_are_namespaced_in_source_order() {
        let rec = record()
            .with_context("user", "alice")
            .with_context("request", "r-1");
        let event = build_event(&rec, &cfg());
        let tail: Vec<_> = event.attributes[4..].iter().map(|a| a.key.as_str()).collect();
        assert_eq!(tail, vec!["log/user", "log/request"]);
        assert_eq!(event.attribute("log/user"), Some("alice"));
    }

    #[test]
    fn custom_attributes_override_context() {
        let mut cfg = cfg();
        cfg.add_custom_attributes("user:service-account,env:prod");
        let rec = record().with_context("user", "alice");

        let event = build_event(&rec, &cfg);

        assert_eq!(event.attribute("log/user"), Some("service-account"));
        assert_eq!(event.attribute("log/env"), Some("prod"));
    }

    #[test]
    fn markers_become_namespaced_tags() {
        let rec = record().with_marker("AUDIT").with_marker("PAGER");
        let event = build_event(&rec, &cfg());
        assert_eq!(event.tags, vec!["log/AUDIT", "log/PAGER"]);
    }

    #[test]
    fn throwable_renders_header_and_frames() {
        let rec = record().with_throwable(ThrowableInfo {
            class_name: "java.lang.RuntimeException".into(),
            message: "boom".into(),
            frames: vec![
                "at com.example.Billing.charge(Billing.java:42)".into(),
                "at com.example.Api.handle(Api.java:7)".into(),
            ],
        });

        let event = build_event(&rec, &cfg());

        assert_eq!(
            event.attribute("log/stacktrace"),
            Some(
                "java.lang.RuntimeException: boom\n\
                 \tat com.example.Billing.charge(Billing.java:42)\n\
                 \tat com.example.Api.handle(Api.java:7)\n"
            )
        );
    }

    #[test]
    fn throwable_without_frames_renders_header_only() {
        let rec = record().with_throwable(ThrowableInfo {
            class_name: "io".into(),
            message: "reset by peer".into(),
            frames: vec![],
        });
        assert_eq!(format_stacktrace(&rec).as_deref(), Some("io: reset by peer\n"));
    }

    #[test]
    fn throwable_without_frames_ignores_caller_frames() {
        let rec = record()
            .with_caller_frame("billing::api(src/api.rs:10)")
            .with_throwable(ThrowableInfo {
                class_name: "io".into(),
                message: "reset by peer".into(),
                frames: vec![],
            });
        assert_eq!(format_stacktrace(&rec).as_deref(), Some("io: reset by peer\n"));
    }

    #[test]
    fn caller_frames_are_the_fallback() {
        let rec = record().with_caller_frame("billing::api(src/api.rs:10)");
        assert_eq!(
            format_stacktrace(&rec).as_deref(),
            Some("\tbilling::api(src/api.rs:10)\n")
        );
    }

    #[test]
    fn no_trace_means_no_attribute() {
        let event = build_event(&record(), &cfg());
        assert_eq!(event.attribute("log/stacktrace"), None);
    }
}
