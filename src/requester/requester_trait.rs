use crate::utils::error::RequesterError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// One result row from the raw transport.
pub type Row = serde_json::Map<String, JsonValue>;

/// A row or the request's single terminal error.
pub type RowResult = Result<Row, RequesterError>;

/// Streaming output channel for one request. Zero or more rows, then at
/// most one terminal `Err`; channel close is the end signal.
pub type RowStream = mpsc::Receiver<RowResult>;

/// A query submission. Engine-specific extensions travel in `context` and
/// are opaque to this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub context: HashMap<String, JsonValue>,
}

impl QueryRequest {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: JsonValue) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

/// The raw transport contract: submit a query, get a stream of rows.
///
/// `request` must return without blocking; implementations spawn their I/O
/// and feed the returned channel.
pub trait Requester: Send + Sync {
    fn request(&self, request: QueryRequest) -> RowStream;
}

/// Collect a full stream into memory, failing on its terminal error.
pub async fn drain(mut stream: RowStream) -> Result<Vec<Row>, RequesterError> {
    let mut rows = Vec::new();
    while let Some(item) = stream.recv().await {
        rows.push(item?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_builder() {
        let request = QueryRequest::new("SHOW TABLES")
            .with_context("default_limit", JsonValue::from(10_000));
        assert_eq!(request.query, "SHOW TABLES");
        assert_eq!(
            request.context.get("default_limit"),
            Some(&JsonValue::from(10_000))
        );
    }

    #[tokio::test]
    async fn test_drain_collects_rows_until_close() {
        let (tx, rx) = mpsc::channel(4);
        let mut row = Row::new();
        row.insert("a".to_string(), JsonValue::from(1));
        tx.send(Ok(row.clone())).await.unwrap();
        tx.send(Ok(row)).await.unwrap();
        drop(tx);

        let rows = drain(rx).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_surfaces_terminal_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Err(RequesterError::Transport("boom".to_string())))
            .await
            .unwrap();
        drop(tx);

        let err = drain(rx).await.unwrap_err();
        assert_eq!(err, RequesterError::Transport("boom".to_string()));
    }
}
