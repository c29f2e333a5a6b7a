use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use quarry_engine::algebra::{Expression, ValueType};
use quarry_engine::external::{external_for, Attribute, Capability, ClickHouseExternal, External};
use quarry_engine::requester::{drain, QueryRequest, Requester, Row, RowStream};
use quarry_engine::utils::config::ExternalDescription;
use quarry_engine::utils::error::{ExternalError, QuarryError};

/// Requester backed by canned responses keyed on query text.
struct ScriptedRequester {
    responses: HashMap<String, Vec<Row>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedRequester {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn respond(mut self, query: &str, rows: Vec<Row>) -> Self {
        self.responses.insert(query.to_string(), rows);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Requester for ScriptedRequester {
    fn request(&self, request: QueryRequest) -> RowStream {
        self.log.lock().unwrap().push(request.query.clone());
        let rows = self.responses.get(&request.query).cloned().unwrap_or_default();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for row in rows {
                if tx.send(Ok(row)).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}

fn row(pairs: &[(&str, &str)]) -> Row {
    let mut row = Row::new();
    for (key, value) in pairs {
        row.insert(key.to_string(), serde_json::Value::from(*value));
    }
    row
}

#[tokio::test]
async fn test_introspection_drops_unknown_types() {
    let requester = Arc::new(ScriptedRequester::new().respond(
        "DESCRIBE `events`",
        vec![
            row(&[("name", "a"), ("type", "Int32")]),
            row(&[("name", "b"), ("type", "UnknownType")]),
            row(&[("name", "c"), ("type", "DateTime")]),
        ],
    ));
    let external = ClickHouseExternal::new("events", requester);
    let attributes = external.introspect().await.unwrap();
    assert_eq!(
        attributes,
        vec![
            Attribute::new("a", ValueType::Number, "Int32"),
            Attribute::new("c", ValueType::Time, "DateTime"),
        ]
    );
}

#[tokio::test]
async fn test_introspection_fails_on_keyless_rows() {
    let requester = Arc::new(
        ScriptedRequester::new().respond("DESCRIBE `events`", vec![Row::new()]),
    );
    let external = ClickHouseExternal::new("events", requester);
    let err = external.introspect().await.unwrap_err();
    assert!(matches!(
        err,
        QuarryError::External(ExternalError::IntrospectionFailed(_))
    ));
}

#[tokio::test]
async fn test_attributes_are_cached_after_first_introspection() {
    let requester = Arc::new(ScriptedRequester::new().respond(
        "DESCRIBE `events`",
        vec![row(&[("name", "a"), ("type", "Int32")])],
    ));
    let external = ClickHouseExternal::new("events", Arc::clone(&requester) as Arc<dyn Requester>);

    let first = external.attributes().await.unwrap();
    let second = external.attributes().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(requester.calls().len(), 1);
}

#[tokio::test]
async fn test_source_list_sorted_and_deduplicated() {
    let requester = Arc::new(ScriptedRequester::new().respond(
        "SHOW TABLES",
        vec![
            row(&[("table", "users")]),
            row(&[("table", "events")]),
            row(&[("table", "users")]),
        ],
    ));
    let external = ClickHouseExternal::new("events", requester);
    let sources = external.source_list().await.unwrap();
    assert_eq!(sources, vec!["events".to_string(), "users".to_string()]);
}

#[tokio::test]
async fn test_source_list_empty_is_not_an_error() {
    let requester = Arc::new(ScriptedRequester::new().respond("SHOW TABLES", vec![]));
    let external = ClickHouseExternal::new("events", requester);
    let sources = external.source_list().await.unwrap();
    assert!(sources.is_empty());
}

#[tokio::test]
async fn test_source_list_without_discoverable_key_fails() {
    let requester =
        Arc::new(ScriptedRequester::new().respond("SHOW TABLES", vec![Row::new()]));
    let external = ClickHouseExternal::new("events", requester);
    let err = external.source_list().await.unwrap_err();
    assert!(matches!(
        err,
        QuarryError::External(ExternalError::InvalidSourceList(_))
    ));
}

#[tokio::test]
async fn test_version_requires_exactly_one_row() {
    let requester = Arc::new(ScriptedRequester::new().respond(
        "SELECT version()",
        vec![row(&[("version()", "21.8.10.19")])],
    ));
    let external = ClickHouseExternal::new("events", requester);
    assert_eq!(external.version().await.unwrap(), "21.8.10.19");

    let requester = Arc::new(ScriptedRequester::new().respond(
        "SELECT version()",
        vec![
            row(&[("version()", "21.8.10.19")]),
            row(&[("version()", "21.8.10.19")]),
        ],
    ));
    let external = ClickHouseExternal::new("events", requester);
    let err = external.version().await.unwrap_err();
    assert!(matches!(
        err,
        QuarryError::External(ExternalError::InvalidVersionResponse(_))
    ));
}

#[tokio::test]
async fn test_capabilities_diverge_from_generic_defaults() {
    let requester = Arc::new(ScriptedRequester::new());
    let external = ClickHouseExternal::new("events", requester);
    assert!(!external.capability(Capability::FilterOnAttribute));
    assert!(!external.capability(Capability::ShortcutGroupBy));
    assert!(external.capability(Capability::StringGroupBy));
}

#[tokio::test]
async fn test_compile_and_query_through_requester() {
    let expected = "SELECT SUM(`added`) FROM `events`";
    let requester = Arc::new(
        ScriptedRequester::new().respond(expected, vec![row(&[("sum", "1234")])]),
    );
    let external =
        ClickHouseExternal::new("events", Arc::clone(&requester) as Arc<dyn Requester>);

    let tree = Expression::reference("added", ValueType::Set).sum().unwrap();
    assert_eq!(external.compile_query(&tree).unwrap(), expected);

    let rows = drain(external.query(&tree).unwrap()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(requester.calls(), vec![expected.to_string()]);
}

#[tokio::test]
async fn test_factory_builds_by_engine_name() {
    let requester: Arc<dyn Requester> = Arc::new(ScriptedRequester::new());
    let description = ExternalDescription::new("clickhouse", "events");
    let external = external_for(&description, Arc::clone(&requester)).unwrap();
    assert_eq!(external.engine(), "clickhouse");
    assert_eq!(external.source(), "events");

    let unknown = ExternalDescription::new("warehouse9000", "events");
    let err = external_for(&unknown, requester).unwrap_err();
    assert!(matches!(
        err,
        QuarryError::External(ExternalError::UnknownEngine(_))
    ));
}
