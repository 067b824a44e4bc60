//! Adapter from `tracing` to the forwarder.
//!
//! Install [`RiemannLayer`] on a subscriber and every event becomes a
//! [`LogRecord`]:
//!
//! - the `message` field is the message, `marker` is a marker
//! - a field recorded as an error becomes the throwable, with its source
//!   chain as frames
//! - other fields of the event and of every enclosing span (outermost first)
//!   become diagnostic context
//! - the event's `module_path(file:line)` is the caller frame

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::thread;

use riemlog_core::model::record::{LogRecord, ThrowableInfo};
use riemlog_core::severity::Severity;
use riemlog_core::time::now_millis;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use crate::forwarder::Forwarder;

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// Targets that are never forwarded: the forwarder's own diagnostics.
const SELF_TARGET: &str = "riemlog";

#[derive(Clone)]
pub struct RiemannLayer {
    forwarder: Arc<Forwarder>,
}

impl RiemannLayer {
    pub fn new(forwarder: Arc<Forwarder>) -> Self {
        Self { forwarder }
    }

    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }
}

#[derive(Debug, Default, Clone)]
struct SpanFields(Vec<(String, String)>);

impl<S> Layer<S> for RiemannLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        // Another RiemannLayer on the same registry may have stored them.
        span.extensions_mut()
            .replace(SpanFields(visitor.into_context()));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            for (key, value) in visitor.into_context() {
                upsert(&mut fields.0, key, value);
            }
            return;
        }
        extensions.insert(SpanFields(visitor.into_context()));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(SELF_TARGET) || FORWARDING.with(Cell::get) {
            return;
        }

        let mut context = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    for (key, value) in &fields.0 {
                        upsert(&mut context, key.clone(), value.clone());
                    }
                }
            }
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(
            Severity::from(*meta.level()),
            visitor.message.take().unwrap_or_else(|| meta.name().to_string()),
        )
        .with_logger(meta.target())
        .with_thread(current_thread_name())
        .with_timestamp_millis(now_millis());
        record.throwable = visitor.throwable.take();
        record.markers = std::mem::take(&mut visitor.markers);
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            let module = meta.module_path().unwrap_or(meta.target());
            record.caller_frames.push(format!("{module}({file}:{line})"));
        }
        for (key, value) in visitor.into_context() {
            upsert(&mut context, key, value);
        }
        record.context = context;

        let _guard = ForwardingGuard::enter();
        self.forwarder.forward(&record);
    }
}

/// Marks the current thread as forwarding until dropped, unwinding included.
struct ForwardingGuard;

impl ForwardingGuard {
    fn enter() -> Self {
        FORWARDING.with(|f| f.set(true));
        Self
    }
}

impl Drop for ForwardingGuard {
    fn drop(&mut self) {
        FORWARDING.with(|f| f.set(false));
    }
}

fn current_thread_name() -> String {
    let current = thread::current();
    current
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", current.id()))
}

fn upsert(fields: &mut Vec<(String, String)>, key: String, value: String) {
    match fields.iter_mut().find(|(k, _)| *k == key) {
        Some(existing) => existing.1 = value,
        None => fields.push((key, value)),
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    markers: Vec<String>,
    throwable: Option<ThrowableInfo>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn into_context(self) -> Vec<(String, String)> {
        self.fields
    }

    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            "marker" => self.markers.push(value),
            name => upsert(&mut self.fields, name.to_string(), value),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut frames = Vec::new();
        let mut source = value.source();
        while let Some(cause) = source {
            frames.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        self.throwable = Some(ThrowableInfo {
            class_name: field.name().to_string(),
            message: value.to_string(),
            frames,
        });
    }
}
