use async_trait::async_trait;
use std::sync::Arc;

use crate::algebra::expression::Expression;
use crate::dialect::SqlDialect;
use crate::external::attribute::Attribute;
use crate::external::clickhouse_external::ClickHouseExternal;
use crate::requester::requester_trait::{Requester, RowStream};
use crate::utils::config::ExternalDescription;
use crate::utils::error::{ExternalError, QuarryResult};

/// A named boolean fact about what an external engine can execute
/// natively. The planner uses these to decide between pushdown and
/// client-side evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FilterOnAttribute,
    ShortcutGroupBy,
    StringGroupBy,
}

impl Capability {
    pub fn label(&self) -> &'static str {
        match self {
            Capability::FilterOnAttribute => "filter-on-attribute",
            Capability::ShortcutGroupBy => "shortcut-group-by",
            Capability::StringGroupBy => "string-group-by",
        }
    }
}

/// Generic capability defaults; engines override where their behavior
/// diverges. Static per engine class, not per instance.
pub fn default_capability(capability: Capability) -> bool {
    match capability {
        Capability::FilterOnAttribute => true,
        Capability::ShortcutGroupBy => true,
        Capability::StringGroupBy => false,
    }
}

/// Binds an operator tree plus a named backing dataset to a transport:
/// compiles trees through the engine's dialect, negotiates capabilities,
/// and introspects schema.
#[async_trait]
pub trait External: Send + Sync + std::fmt::Debug {
    fn engine(&self) -> &'static str;

    fn source(&self) -> &str;

    fn dialect(&self) -> &dyn SqlDialect;

    fn capability(&self, capability: Capability) -> bool {
        default_capability(capability)
    }

    /// Introspect the backing dataset's schema through the transport.
    async fn introspect(&self) -> QuarryResult<Vec<Attribute>>;

    /// Introspected schema, cached after the first call.
    async fn attributes(&self) -> QuarryResult<Vec<Attribute>>;

    /// Datasets available on the engine, deduplicated and sorted.
    async fn source_list(&self) -> QuarryResult<Vec<String>>;

    /// Engine version string.
    async fn version(&self) -> QuarryResult<String>;

    /// Render an operator tree to engine-native expression text.
    fn compile_expression(&self, expression: &Expression) -> QuarryResult<String> {
        expression.to_query_text(self.dialect())
    }

    /// Render an operator tree as a full query against the backing source.
    fn compile_query(&self, expression: &Expression) -> QuarryResult<String> {
        Ok(format!(
            "SELECT {} FROM {}",
            self.compile_expression(expression)?,
            self.dialect().escape_identifier(self.source())
        ))
    }

    /// Compile and submit, returning the transport's row stream.
    fn query(&self, expression: &Expression) -> QuarryResult<RowStream>;
}

/// Build the engine-appropriate external source from a declarative
/// description.
pub fn external_for(
    description: &ExternalDescription,
    requester: Arc<dyn Requester>,
) -> QuarryResult<Box<dyn External>> {
    match description.engine.as_str() {
        "clickhouse" => Ok(Box::new(ClickHouseExternal::new(
            &description.source,
            requester,
        ))),
        other => Err(ExternalError::UnknownEngine(other.to_string()).into()),
    }
}
