//! Span collaborator used to observe attempts and model runs.
//!
//! Every unit of work the harness launches is wrapped in a [`SpanGuard`],
//! which ends the underlying span exactly once on every exit path.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Begins named units of work.
pub trait Telemetry: Send + Sync {
    /// Open a span for the unit of work called `name`.
    fn begin(&self, name: &str) -> Box<dyn SpanHandle>;
}

/// An open span. Consumed when it ends.
pub trait SpanHandle: Send {
    /// The `tracing` span the unit of work should run inside.
    ///
    /// Collaborators that do not emit `tracing` spans return
    /// [`tracing::Span::none`].
    fn tracing_span(&self) -> tracing::Span {
        tracing::Span::none()
    }

    /// Mark the span complete, optionally recording a failure.
    fn end(self: Box<Self>, error: Option<&str>);
}

/// Scoped span: ends when dropped, with whatever error was recorded.
pub struct SpanGuard {
    handle: Option<Box<dyn SpanHandle>>,
    error: Option<String>,
}

impl SpanGuard {
    /// Begin a span named `name` on `telemetry`.
    pub fn begin(telemetry: &dyn Telemetry, name: &str) -> Self {
        Self {
            handle: Some(telemetry.begin(name)),
            error: None,
        }
    }

    /// `tracing` span to instrument the unit's future with, so events it
    /// emits nest under this span.
    pub fn tracing_span(&self) -> tracing::Span {
        self.handle
            .as_ref()
            .map(|h| h.tracing_span())
            .unwrap_or_else(tracing::Span::none)
    }

    /// Record a failure to report when the span ends.
    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.error = Some(error.to_string());
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.end(self.error.as_deref());
        }
    }
}

// ---------------------------------------------------------------------------
// tracing-backed collaborator
// ---------------------------------------------------------------------------

/// Default collaborator: one `tracing` span per unit of work.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn begin(&self, name: &str) -> Box<dyn SpanHandle> {
        let span = tracing::info_span!("botbench", unit = %name);
        Box::new(TracingSpan {
            span,
            name: name.to_string(),
            started: Instant::now(),
        })
    }
}

struct TracingSpan {
    span: tracing::Span,
    name: String,
    started: Instant,
}

impl SpanHandle for TracingSpan {
    fn tracing_span(&self) -> tracing::Span {
        self.span.clone()
    }

    fn end(self: Box<Self>, error: Option<&str>) {
        let _entered = self.span.enter();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match error {
            Some(error) => tracing::warn!(unit = %self.name, elapsed_ms, "{error}"),
            None => tracing::debug!(unit = %self.name, elapsed_ms, "completed"),
        }
    }
}

/// Install a global `tracing` subscriber honoring `RUST_LOG`.
///
/// `default_directive` (e.g. `"botbench=info"`) is added on top of whatever
/// the environment filter specifies.
pub fn init_subscriber(default_directive: &str) -> anyhow::Result<()> {
    let directive: Directive = default_directive
        .parse()
        .with_context(|| format!("invalid log directive: {default_directive}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

// ---------------------------------------------------------------------------
// Recording collaborator
// ---------------------------------------------------------------------------

/// Something that happened to a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanEvent {
    Begin(String),
    End { name: String, error: Option<String> },
}

/// In-memory collaborator that records every span event. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct RecordingTelemetry {
    events: Arc<Mutex<Vec<SpanEvent>>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SpanEvent> {
        self.lock().clone()
    }

    /// Names of spans that were begun, in order.
    pub fn begun(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SpanEvent::Begin(name) => Some(name.clone()),
                SpanEvent::End { .. } => None,
            })
            .collect()
    }

    /// `(name, error)` pairs for spans that ended, in order.
    pub fn ended(&self) -> Vec<(String, Option<String>)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SpanEvent::End { name, error } => Some((name.clone(), error.clone())),
                SpanEvent::Begin(_) => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SpanEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Telemetry for RecordingTelemetry {
    fn begin(&self, name: &str) -> Box<dyn SpanHandle> {
        self.lock().push(SpanEvent::Begin(name.to_string()));
        Box::new(RecordedSpan {
            name: name.to_string(),
            events: Arc::clone(&self.events),
        })
    }
}

struct RecordedSpan {
    name: String,
    events: Arc<Mutex<Vec<SpanEvent>>>,
}

impl SpanHandle for RecordedSpan {
    fn end(self: Box<Self>, error: Option<&str>) {
        let RecordedSpan { name, events } = *self;
        events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SpanEvent::End {
                name,
                error: error.map(str::to_string),
            });
    }
}

/// Subscriber writing plain-text fmt output into a shared buffer.
#[cfg(test)]
pub(crate) fn capture_subscriber() -> (
    impl tracing::Subscriber + Send + Sync + 'static,
    Arc<Mutex<Vec<u8>>>,
) {
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&buf);
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || SharedBuf(Arc::clone(&writer)))
        .finish();
    (subscriber, buf)
}

#[cfg(test)]
pub(crate) fn captured_lines(buf: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
    let bytes = buf.lock().unwrap_or_else(PoisonError::into_inner).clone();
    String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_ends_span_on_drop() {
        let telemetry = RecordingTelemetry::new();
        {
            let _guard = SpanGuard::begin(&telemetry, "attempt 1");
        }
        assert_eq!(
            telemetry.events(),
            vec![
                SpanEvent::Begin("attempt 1".into()),
                SpanEvent::End {
                    name: "attempt 1".into(),
                    error: None
                },
            ]
        );
    }

    #[test]
    fn guard_reports_recorded_error() {
        let telemetry = RecordingTelemetry::new();
        let mut guard = SpanGuard::begin(&telemetry, "model: gpt-4o");
        guard.record_error("boom");
        drop(guard);
        assert_eq!(
            telemetry.ended(),
            vec![("model: gpt-4o".to_string(), Some("boom".to_string()))]
        );
    }

    #[test]
    fn guard_ends_span_during_unwind() {
        let telemetry = RecordingTelemetry::new();
        let cloned = telemetry.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = SpanGuard::begin(&cloned, "attempt 7");
            panic!("evaluation blew up");
        });
        assert!(result.is_err());
        assert_eq!(telemetry.begun(), vec!["attempt 7"]);
        assert_eq!(telemetry.ended().len(), 1);
    }

    #[test]
    fn tracing_telemetry_spans_end_cleanly() {
        let mut guard = SpanGuard::begin(&TracingTelemetry, "attempt 1");
        guard.record_error("failed");
    }

    #[test]
    fn subscriber_installs_once() {
        assert!(init_subscriber("botbench=debug").is_ok());
        assert!(init_subscriber("botbench=debug").is_err());
    }

    #[test]
    fn events_inside_the_unit_nest_under_its_span() {
        let (subscriber, buf) = capture_subscriber();
        tracing::subscriber::with_default(subscriber, || {
            let guard = SpanGuard::begin(&TracingTelemetry, "attempt 4");
            guard
                .tracing_span()
                .in_scope(|| tracing::info!("calling the model"));
        });

        let lines = captured_lines(&buf);
        let line = lines
            .iter()
            .find(|l| l.contains("calling the model"))
            .expect("event was captured");
        assert!(line.contains("botbench{unit=attempt 4}"), "got: {line}");
    }

    #[test]
    fn recording_spans_have_no_tracing_span() {
        let guard = SpanGuard::begin(&RecordingTelemetry::new(), "attempt 1");
        assert!(guard.tracing_span().is_none());
    }
}
