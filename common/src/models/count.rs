//! Count payloads.
//!
//! [`CountResult`] is what a counting service answers; [`AggregateResult`]
//! is what the orchestrator assembles from one count per backend.

use chrono::{DateTime, Local};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
use utoipa::openapi::{Ref, RefOr};
use utoipa::{PartialSchema, ToSchema};

/// `yyyy-MM-dd HH:mm:ss`, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current row count reported by one counting backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountResult {
    /// Number of rows currently stored by the backend.
    pub valor_atual: i64,
    /// Service that produced the count, when it identifies itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

impl CountResult {
    /// Creates an anonymous count.
    pub fn new(valor_atual: i64) -> Self {
        Self {
            valor_atual,
            producer: None,
        }
    }

    /// Tags the count with the producing service.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }
}

/// Combined answer of one aggregate request.
///
/// Serializes as `{"horario": ..., "contagem<Backend>": {...}, ...}` with the
/// backends in the order they were pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    horario: String,
    counts: Vec<(String, CountResult)>,
}

impl AggregateResult {
    /// Starts an empty aggregate stamped with `at`.
    pub fn stamped(at: DateTime<Local>) -> Self {
        Self {
            horario: at.format(TIMESTAMP_FORMAT).to_string(),
            counts: Vec::new(),
        }
    }

    /// Starts an empty aggregate stamped with the current local time.
    pub fn stamped_now() -> Self {
        Self::stamped(Local::now())
    }

    /// Appends the count of `backend`.
    pub fn push(&mut self, backend: impl Into<String>, count: CountResult) {
        self.counts.push((backend.into(), count));
    }

    pub fn horario(&self) -> &str {
        &self.horario
    }

    /// Count of `backend`, if it has been collected.
    pub fn count(&self, backend: &str) -> Option<&CountResult> {
        self.counts
            .iter()
            .find(|(name, _)| name == backend)
            .map(|(_, count)| count)
    }

    /// Backends and their counts, in collection order.
    pub fn counts(&self) -> impl Iterator<Item = (&str, &CountResult)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), count))
    }

    /// JSON key under which `backend`'s count is serialized.
    pub fn field_name(backend: &str) -> String {
        format!("contagem{backend}")
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len() + 1))?;
        map.serialize_entry("horario", &self.horario)?;
        for (backend, count) in &self.counts {
            map.serialize_entry(&Self::field_name(backend), count)?;
        }
        map.end()
    }
}

impl PartialSchema for AggregateResult {
    fn schema() -> RefOr<Schema> {
        ObjectBuilder::new()
            .schema_type(Type::Object)
            .description(Some(
                "`horario` followed by one `contagem<Backend>` entry per backend, in query order",
            ))
            .property(
                "horario",
                ObjectBuilder::new()
                    .schema_type(Type::String)
                    .description(Some("Local time, `yyyy-MM-dd HH:mm:ss`")),
            )
            .required("horario")
            .additional_properties(Some(Ref::from_schema_name(CountResult::name())))
            .into()
    }
}

impl ToSchema for AggregateResult {
    fn schemas(schemas: &mut Vec<(String, RefOr<Schema>)>) {
        schemas.push((CountResult::name().into_owned(), CountResult::schema()));
        <CountResult as ToSchema>::schemas(schemas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_count_result_wire_format() {
        let json = serde_json::to_value(CountResult::new(42)).unwrap();
        assert_eq!(json, serde_json::json!({ "valorAtual": 42 }));

        let parsed: CountResult =
            serde_json::from_str(r#"{"valorAtual": 7, "producer": "counting-service"}"#).unwrap();
        assert_eq!(parsed, CountResult::new(7).with_producer("counting-service"));
    }

    #[test]
    fn test_count_result_rejects_missing_value() {
        assert!(serde_json::from_str::<CountResult>(r#"{"valor": 7}"#).is_err());
    }

    #[test]
    fn test_aggregate_schema_references_count_result() {
        let schema = serde_json::to_value(AggregateResult::schema()).unwrap();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["horario"]["type"], "string");
        assert_eq!(
            schema["additionalProperties"]["$ref"],
            "#/components/schemas/CountResult"
        );
    }

    #[test]
    fn test_aggregate_serializes_in_push_order() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap();
        let mut aggregate = AggregateResult::stamped(at);
        aggregate.push("Postgres", CountResult::new(10));
        aggregate.push("MySql", CountResult::new(20));
        aggregate.push("SqlServer", CountResult::new(30));

        let text = serde_json::to_string(&aggregate).unwrap();
        assert_eq!(
            text,
            r#"{"horario":"2024-03-05 09:07:01","contagemPostgres":{"valorAtual":10},"contagemMySql":{"valorAtual":20},"contagemSqlServer":{"valorAtual":30}}"#
        );
        assert_eq!(aggregate.count("MySql"), Some(&CountResult::new(20)));
        assert_eq!(aggregate.count("Oracle"), None);
    }
}
