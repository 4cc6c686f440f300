//! Per-call spans and log lines emitted by the orchestrator.
//!
//! The orchestrator receives a [`Telemetry`] at construction instead of
//! reaching for the global subscriber, so tests can observe exactly which
//! spans, tags and log lines one aggregate request produced.

use tracing::field::Empty;
use tracing::Span;

/// Factory for per-call spans.
pub trait Telemetry: Send + Sync {
    /// Opens the span bounding one downstream call.
    fn start_call(&self, span_name: &str) -> Box<dyn CallSpan>;
}

/// An open span around one downstream call.
pub trait CallSpan: Send {
    /// `tracing` span the downstream await is instrumented with.
    fn current(&self) -> Span {
        Span::none()
    }

    /// Logs a retrieved count at INFO inside this span.
    fn count_retrieved(&self, backend: &str, valor_atual: i64, url: &str);

    /// Attaches a tag to the span.
    fn set_tag(&mut self, key: &'static str, value: String);

    /// Closes the span.
    fn end(self: Box<Self>);
}

/// [`Telemetry`] backed by the `tracing` subscriber.
///
/// Spans are named `downstream_call` with the logical name in `otel.name`,
/// which is what OpenTelemetry bridges export as the span name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn start_call(&self, span_name: &str) -> Box<dyn CallSpan> {
        let span = tracing::info_span!(
            "downstream_call",
            otel.name = %span_name,
            api = Empty,
            url = Empty,
            content = Empty,
        );
        Box::new(TracingCallSpan { span })
    }
}

struct TracingCallSpan {
    span: Span,
}

impl CallSpan for TracingCallSpan {
    fn current(&self) -> Span {
        self.span.clone()
    }

    fn count_retrieved(&self, backend: &str, valor_atual: i64, url: &str) {
        let _entered = self.span.enter();
        tracing::info!(
            backend,
            valor_atual,
            url,
            "Valor contagem {backend}: {valor_atual} | {url}"
        );
    }

    fn set_tag(&mut self, key: &'static str, value: String) {
        self.span.record(key, value.as_str());
    }

    fn end(self: Box<Self>) {
        // The span closes once its last handle drops.
        drop(self.span);
    }
}
