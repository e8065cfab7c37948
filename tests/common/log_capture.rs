#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;

/// Captures tracing events emitted on the current thread.
///
/// The subscriber is installed with `set_default`, so capture ends when the
/// value is dropped and other test threads are unaffected.
pub struct TestLogCapture {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub level: tracing::Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedLog {
    /// Value of a structured field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl TestLogCapture {
    /// Start capturing. Capture stops when the returned value is dropped.
    pub fn start() -> Self {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let layer = CaptureLayer {
            logs: Arc::clone(&logs),
        };
        let subscriber = tracing_subscriber::registry().with(layer);
        let guard = tracing::subscriber::set_default(subscriber);

        Self {
            logs,
            _guard: guard,
        }
    }

    /// Events whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<CapturedLog> {
        self.filtered(|l| l.message.contains(needle))
    }

    pub fn assert_logged(&self, needle: &str) {
        assert!(
            !self.matching(needle).is_empty(),
            "Expected log containing '{needle}'. Logged: {:#?}",
            self.messages()
        );
    }

    pub fn assert_not_logged(&self, needle: &str) {
        let hits = self.matching(needle);
        assert!(hits.is_empty(), "Unexpected log '{needle}': {hits:#?}");
    }

    pub fn assert_logged_at_level(&self, level: tracing::Level, needle: &str) {
        let hits = self.filtered(|l| l.level == level && l.message.contains(needle));
        assert!(
            !hits.is_empty(),
            "Expected {level} log containing '{needle}'. Logged: {:#?}",
            self.messages()
        );
    }

    pub fn assert_no_errors(&self) {
        let errors = self.filtered(|l| l.level == tracing::Level::ERROR);
        assert!(errors.is_empty(), "Unexpected errors: {errors:#?}");
    }

    /// Assert some event carried `name` with a value containing `value`.
    pub fn assert_field_logged(&self, name: &str, value: &str) {
        let hits = self.filtered(|l| l.field(name).is_some_and(|v| v.contains(value)));
        assert!(
            !hits.is_empty(),
            "Expected field {name}={value}. Logged: {:#?}",
            self.logs()
        );
    }

    fn filtered(&self, keep: impl Fn(&CapturedLog) -> bool) -> Vec<CapturedLog> {
        self.logs.lock().unwrap().iter().filter(|l| keep(l)).cloned().collect()
    }

    fn messages(&self) -> Vec<String> {
        self.logs().into_iter().map(|l| format!("{} {}", l.level, l.message)).collect()
    }

    pub fn logs(&self) -> Vec<CapturedLog> {
        self.logs.lock().unwrap().clone()
    }
}

struct CaptureLayer {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.logs.lock().unwrap().push(CapturedLog {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), value.to_string());
    }
}
