//! 编排服务模块

use std::sync::Arc;

use tracing::Instrument;

use common::errors::AppResult;
use common::models::AggregateResult;

use crate::client::CountingClient;
use crate::sources::DownstreamSource;
use crate::telemetry::Telemetry;

/// Aggregates the counts of every configured backend.
pub struct Orchestrator {
    client: CountingClient,
    sources: Vec<DownstreamSource>,
    telemetry: Arc<dyn Telemetry>,
}

impl Orchestrator {
    pub fn new(
        client: CountingClient,
        sources: Vec<DownstreamSource>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            client,
            sources,
            telemetry,
        }
    }

    pub fn sources(&self) -> &[DownstreamSource] {
        &self.sources
    }

    /// Queries every source, one after the other, and builds the aggregate.
    ///
    /// The timestamp is taken before the first call. Each call gets its own
    /// span, carrying the `api`, `url` and `content` tags, plus one INFO line
    /// with the retrieved value; the span is closed before the next source is
    /// queried. The first failure aborts the whole aggregate.
    pub async fn get_aggregate(&self) -> AppResult<AggregateResult> {
        let mut aggregate = AggregateResult::stamped_now();

        for source in &self.sources {
            let mut span = self.telemetry.start_call(&source.span_name());

            let count = self
                .client
                .fetch_count(&source.url)
                .instrument(span.current())
                .await?;

            span.count_retrieved(&source.name, count.valor_atual, &source.url);
            span.set_tag("api", source.api_name());
            span.set_tag("url", source.url.clone());
            span.set_tag("content", serde_json::to_string(&count)?);
            span.end();

            aggregate.push(source.name.clone(), count);
        }

        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use common::errors::AppError;
    use common::models::CountResult;

    use crate::client::tests::{refused_url, spawn_counter};
    use crate::telemetry::recording::{Event, RecordingTelemetry};

    async fn three_sources() -> Vec<DownstreamSource> {
        vec![
            DownstreamSource::new("Postgres", spawn_counter(StatusCode::OK, r#"{"valorAtual":10}"#).await)
                .unwrap(),
            DownstreamSource::new("MySql", spawn_counter(StatusCode::OK, r#"{"valorAtual":20}"#).await)
                .unwrap(),
            DownstreamSource::new("SqlServer", spawn_counter(StatusCode::OK, r#"{"valorAtual":30}"#).await)
                .unwrap(),
        ]
    }

    fn orchestrator(sources: Vec<DownstreamSource>, telemetry: &RecordingTelemetry) -> Orchestrator {
        Orchestrator::new(
            CountingClient::default(),
            sources,
            Arc::new(telemetry.clone()),
        )
    }

    fn expected_events(sources: &[DownstreamSource], values: [i64; 3]) -> Vec<Event> {
        let mut expected = Vec::new();
        for (source, value) in sources.iter().zip(values) {
            let span = source.span_name();
            let content = format!(r#"{{"valorAtual":{value}}}"#);
            expected.push(Event::Started(span.clone()));
            expected.push(Event::Log {
                backend: source.name.clone(),
                valor_atual: value,
                url: source.url.clone(),
            });
            expected.push(Event::Tag(span.clone(), "api", source.api_name()));
            expected.push(Event::Tag(span.clone(), "url", source.url.clone()));
            expected.push(Event::Tag(span.clone(), "content", content));
            expected.push(Event::Ended(span));
        }
        expected
    }

    fn is_timestamp(value: &str) -> bool {
        chrono::NaiveDateTime::parse_from_str(value, common::models::TIMESTAMP_FORMAT).is_ok()
            && value.len() == "yyyy-MM-dd HH:mm:ss".len()
    }

    #[tokio::test]
    async fn test_aggregate_collects_every_backend() {
        let telemetry = RecordingTelemetry::default();
        let aggregate = orchestrator(three_sources().await, &telemetry)
            .get_aggregate()
            .await
            .unwrap();

        assert_eq!(aggregate.count("Postgres"), Some(&CountResult::new(10)));
        assert_eq!(aggregate.count("MySql"), Some(&CountResult::new(20)));
        assert_eq!(aggregate.count("SqlServer"), Some(&CountResult::new(30)));
        assert!(is_timestamp(aggregate.horario()), "bad horario {}", aggregate.horario());

        let order: Vec<&str> = aggregate.counts().map(|(name, _)| name).collect();
        assert_eq!(order, ["Postgres", "MySql", "SqlServer"]);
    }

    #[tokio::test]
    async fn test_each_call_is_logged_tagged_and_closed_in_order() {
        let telemetry = RecordingTelemetry::default();
        let sources = three_sources().await;
        orchestrator(sources.clone(), &telemetry)
            .get_aggregate()
            .await
            .unwrap();

        let expected = expected_events(&sources, [10, 20, 30]);
        assert_eq!(telemetry.events(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_each_stay_sequential() {
        let sources = three_sources().await;
        let mut requests = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let telemetry = RecordingTelemetry::default();
            let service = orchestrator(sources.clone(), &telemetry);
            requests.spawn(async move {
                let aggregate = service.get_aggregate().await.unwrap();
                (aggregate, telemetry)
            });
        }

        let expected = expected_events(&sources, [10, 20, 30]);
        let mut finished = 0;
        while let Some(joined) = requests.join_next().await {
            let (aggregate, telemetry) = joined.unwrap();
            let order: Vec<&str> = aggregate.counts().map(|(name, _)| name).collect();
            assert_eq!(order, ["Postgres", "MySql", "SqlServer"]);
            assert_eq!(telemetry.events(), expected);
            finished += 1;
        }
        assert_eq!(finished, 8);
    }

    #[tokio::test]
    async fn test_log_lines_carry_their_own_backend_value() {
        let telemetry = RecordingTelemetry::default();
        orchestrator(three_sources().await, &telemetry)
            .get_aggregate()
            .await
            .unwrap();

        let logged: Vec<(String, i64)> = telemetry
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Log { backend, valor_atual, .. } => Some((backend, valor_atual)),
                _ => None,
            })
            .collect();
        assert_eq!(
            logged,
            [
                ("Postgres".to_string(), 10),
                ("MySql".to_string(), 20),
                ("SqlServer".to_string(), 30)
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_without_partial_result() {
        let telemetry = RecordingTelemetry::default();
        let mut sources = three_sources().await;
        sources[1] = DownstreamSource::new("MySql", refused_url().await).unwrap();

        let err = orchestrator(sources, &telemetry)
            .get_aggregate()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownstreamUnavailable(_)));

        // Postgres completed, MySql was started and never finished, SqlServer never queried.
        let events = telemetry.events();
        assert!(events.contains(&Event::Ended("RequestApiContagemPostgres".into())));
        assert!(events.contains(&Event::Started("RequestApiContagemMySql".into())));
        assert!(!events.contains(&Event::Ended("RequestApiContagemMySql".into())));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::Started(name) if name.ends_with("SqlServer"))));
    }

    #[tokio::test]
    async fn test_non_success_status_fails_the_aggregate() {
        let telemetry = RecordingTelemetry::default();
        let mut sources = three_sources().await;
        sources[2] = DownstreamSource::new(
            "SqlServer",
            spawn_counter(StatusCode::INTERNAL_SERVER_ERROR, "boom").await,
        )
        .unwrap();

        let result = orchestrator(sources, &telemetry).get_aggregate().await;
        assert!(matches!(result, Err(AppError::DownstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_tracing_telemetry_records_span_fields_and_log_line() {
        use tracing_subscriber::layer::SubscriberExt;

        let capture = capture::CaptureLayer::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let sources = three_sources().await;
        Orchestrator::new(
            CountingClient::default(),
            sources.clone(),
            Arc::new(crate::telemetry::TracingTelemetry),
        )
        .get_aggregate()
        .await
        .unwrap();

        let closed = capture.closed.lock().unwrap().clone();
        assert_eq!(closed.len(), 3);
        for ((span, source), value) in closed.iter().zip(&sources).zip([10, 20, 30]) {
            assert_eq!(span["otel.name"], source.span_name());
            assert_eq!(span["api"], source.api_name());
            assert_eq!(span["url"], source.url);
            assert_eq!(span["content"], format!(r#"{{"valorAtual":{value}}}"#));
        }

        let logged: Vec<_> = capture
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| event.contains_key("backend"))
            .cloned()
            .collect();
        assert_eq!(logged.len(), 3);
        for ((span, event), (source, value)) in logged.iter().zip(sources.iter().zip([10, 20, 30])) {
            assert_eq!(span["otel.name"], source.span_name());
            assert_eq!(event["level"], "INFO");
            assert_eq!(
                event["message"],
                format!("Valor contagem {}: {value} | {}", source.name, source.url)
            );
        }
    }

    mod capture {
        //! Layer keeping the fields of `downstream_call` spans and of the
        //! events emitted inside them.

        use std::collections::BTreeMap;
        use std::sync::{Arc, Mutex};

        use tracing::field::{Field, Visit};
        use tracing::span::{Attributes, Id, Record};
        use tracing::Subscriber;
        use tracing_subscriber::layer::{Context, Layer};
        use tracing_subscriber::registry::LookupSpan;

        pub(super) type Fields = BTreeMap<String, String>;

        struct SpanFields(Fields);

        struct Collect<'a>(&'a mut Fields);

        impl Visit for Collect<'_> {
            fn record_str(&mut self, field: &Field, value: &str) {
                self.0.insert(field.name().to_string(), value.to_string());
            }

            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                self.0.insert(field.name().to_string(), format!("{value:?}"));
            }
        }

        #[derive(Clone, Default)]
        pub(super) struct CaptureLayer {
            /// Span fields, in close order.
            pub(super) closed: Arc<Mutex<Vec<Fields>>>,
            /// (enclosing span fields, event fields)
            pub(super) events: Arc<Mutex<Vec<(Fields, Fields)>>>,
        }

        impl<S> Layer<S> for CaptureLayer
        where
            S: Subscriber + for<'a> LookupSpan<'a>,
        {
            fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
                if attrs.metadata().name() != "downstream_call" {
                    return;
                }
                let mut fields = Fields::new();
                attrs.record(&mut Collect(&mut fields));
                if let Some(span) = ctx.span(id) {
                    span.extensions_mut().insert(SpanFields(fields));
                }
            }

            fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
                if let Some(span) = ctx.span(id) {
                    if let Some(fields) = span.extensions_mut().get_mut::<SpanFields>() {
                        values.record(&mut Collect(&mut fields.0));
                    }
                }
            }

            fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
                let Some(span) = ctx.event_span(event) else {
                    return;
                };
                let Some(span_fields) = span.extensions().get::<SpanFields>().map(|f| f.0.clone())
                else {
                    return;
                };
                let mut fields = Fields::new();
                event.record(&mut Collect(&mut fields));
                fields.insert("level".into(), event.metadata().level().to_string());
                self.events.lock().unwrap().push((span_fields, fields));
            }

            fn on_close(&self, id: Id, ctx: Context<'_, S>) {
                if let Some(span) = ctx.span(&id) {
                    if let Some(fields) = span.extensions_mut().remove::<SpanFields>() {
                        self.closed.lock().unwrap().push(fields.0);
                    }
                }
            }
        }
    }
}
