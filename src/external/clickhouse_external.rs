use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::algebra::expression::Expression;
use crate::algebra::value::ValueType;
use crate::dialect::{ClickHouseDialect, SqlDialect};
use crate::external::attribute::Attribute;
use crate::external::external_trait::{Capability, External};
use crate::requester::requester_trait::{drain, QueryRequest, Requester, Row, RowStream};
use crate::utils::error::{ExternalError, QuarryResult};
use crate::utils::helpers::deduplicate_sort;

/// External source for a ClickHouse engine.
pub struct ClickHouseExternal {
    source: String,
    dialect: ClickHouseDialect,
    requester: Arc<dyn Requester>,
    attributes: RwLock<Option<Vec<Attribute>>>,
}

impl std::fmt::Debug for ClickHouseExternal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseExternal")
            .field("source", &self.source)
            .finish()
    }
}

impl ClickHouseExternal {
    pub fn new(source: &str, requester: Arc<dyn Requester>) -> Self {
        Self {
            source: source.to_string(),
            dialect: ClickHouseDialect::new(),
            requester,
            attributes: RwLock::new(None),
        }
    }

    /// Map a native type string to a type tag by prefix, longest match
    /// first. Unrecognized types yield `None` and the column is dropped.
    fn classify_native_type(native_type: &str) -> Option<ValueType> {
        let lower = native_type.to_lowercase();
        if lower.starts_with("datetime") || lower.starts_with("date") {
            Some(ValueType::Time)
        } else if lower.starts_with("fixedstring")
            || lower.starts_with("string")
            || lower.starts_with("enum")
            || lower.starts_with("uuid")
        {
            Some(ValueType::String)
        } else if lower.starts_with("bool") {
            Some(ValueType::Boolean)
        } else if lower.starts_with("uint")
            || lower.starts_with("int")
            || lower.starts_with("decimal")
            || lower.starts_with("float")
        {
            Some(ValueType::Number)
        } else {
            None
        }
    }

    fn post_process_introspect(rows: &[Row]) -> Result<Vec<Attribute>, ExternalError> {
        let mut attributes = Vec::with_capacity(rows.len());
        for row in rows {
            if row.is_empty() {
                return Err(ExternalError::IntrospectionFailed(
                    "describe row has no keys".to_string(),
                ));
            }
            let name = row.get("name").and_then(|v| v.as_str()).ok_or_else(|| {
                ExternalError::IntrospectionFailed("describe row missing 'name'".to_string())
            })?;
            let native_type = row.get("type").and_then(|v| v.as_str()).ok_or_else(|| {
                ExternalError::IntrospectionFailed("describe row missing 'type'".to_string())
            })?;
            match Self::classify_native_type(native_type) {
                Some(value_type) => {
                    attributes.push(Attribute::new(name, value_type, native_type))
                }
                None => {
                    warn!(column = name, native_type, "dropping column of unknown type");
                }
            }
        }
        Ok(attributes)
    }

    fn single_key(row: &Row) -> Option<&str> {
        row.keys().next().map(|k| k.as_str())
    }
}

#[async_trait]
impl External for ClickHouseExternal {
    fn engine(&self) -> &'static str {
        "clickhouse"
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::FilterOnAttribute | Capability::ShortcutGroupBy => false,
            Capability::StringGroupBy => true,
        }
    }

    async fn introspect(&self) -> QuarryResult<Vec<Attribute>> {
        let query = format!("DESCRIBE {}", self.dialect.escape_identifier(&self.source));
        let rows = drain(self.requester.request(QueryRequest::new(&query)))
            .await
            .map_err(|e| ExternalError::IntrospectionFailed(e.to_string()))?;
        Ok(Self::post_process_introspect(&rows)?)
    }

    async fn attributes(&self) -> QuarryResult<Vec<Attribute>> {
        if let Some(cached) = self.attributes.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let introspected = self.introspect().await?;
        let mut cache = self.attributes.write().await;
        *cache = Some(introspected.clone());
        Ok(introspected)
    }

    async fn source_list(&self) -> QuarryResult<Vec<String>> {
        let rows = drain(self.requester.request(QueryRequest::new("SHOW TABLES"))).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let key = Self::single_key(&rows[0])
            .ok_or_else(|| ExternalError::InvalidSourceList("no key".to_string()))?
            .to_string();
        let mut sources = Vec::with_capacity(rows.len());
        for row in &rows {
            let value = row.get(&key).and_then(|v| v.as_str()).ok_or_else(|| {
                ExternalError::InvalidSourceList(format!("row missing '{}'", key))
            })?;
            sources.push(value.to_string());
        }
        Ok(deduplicate_sort(sources))
    }

    async fn version(&self) -> QuarryResult<String> {
        let rows = drain(self.requester.request(QueryRequest::new("SELECT version()"))).await?;
        if rows.len() != 1 {
            return Err(ExternalError::InvalidVersionResponse(format!(
                "expected exactly one row, got {}",
                rows.len()
            ))
            .into());
        }
        let key = Self::single_key(&rows[0])
            .ok_or_else(|| ExternalError::InvalidVersionResponse("no key".to_string()))?
            .to_string();
        let version = rows[0]
            .get(&key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExternalError::InvalidVersionResponse("non-string value".to_string()))?;
        Ok(version.to_string())
    }

    fn query(&self, expression: &Expression) -> QuarryResult<RowStream> {
        let query = self.compile_query(expression)?;
        Ok(self.requester.request(QueryRequest::new(&query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_prefixes() {
        let classify = ClickHouseExternal::classify_native_type;
        assert_eq!(classify("DateTime"), Some(ValueType::Time));
        assert_eq!(classify("DateTime64(3)"), Some(ValueType::Time));
        assert_eq!(classify("Date"), Some(ValueType::Time));
        assert_eq!(classify("String"), Some(ValueType::String));
        assert_eq!(classify("FixedString(16)"), Some(ValueType::String));
        assert_eq!(classify("Enum8('a' = 1)"), Some(ValueType::String));
        assert_eq!(classify("UUID"), Some(ValueType::String));
        assert_eq!(classify("Bool"), Some(ValueType::Boolean));
        assert_eq!(classify("Int32"), Some(ValueType::Number));
        assert_eq!(classify("UInt64"), Some(ValueType::Number));
        assert_eq!(classify("Decimal(10, 2)"), Some(ValueType::Number));
        assert_eq!(classify("Float64"), Some(ValueType::Number));
        assert_eq!(classify("Array(String)"), None);
        assert_eq!(classify("Tuple(Int8, Int8)"), None);
    }

    #[test]
    fn test_capability_overrides() {
        let requester = Arc::new(NeverRequester);
        let external = ClickHouseExternal::new("events", requester);
        assert!(!external.capability(Capability::FilterOnAttribute));
        assert!(!external.capability(Capability::ShortcutGroupBy));
        assert!(external.capability(Capability::StringGroupBy));
    }

    struct NeverRequester;

    impl Requester for NeverRequester {
        fn request(&self, _request: QueryRequest) -> RowStream {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            rx
        }
    }
}
