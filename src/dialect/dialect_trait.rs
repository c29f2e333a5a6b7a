use crate::algebra::value::{format_number, Value, ValueType};
use crate::utils::error::DialectError;
use crate::utils::time::{DurationSpans, Granularity, TimePartKind, Timezone};
use chrono::{DateTime, Utc};

/// Strategy object translating abstract query operations into one engine's
/// native query syntax.
///
/// Implementations are stateless aside from their constant tables; a single
/// instance serves every query against its engine. All methods take
/// pre-rendered operand text and return text, so a dialect never walks an
/// expression tree itself.
pub trait SqlDialect: Send + Sync {
    /// Engine name used in diagnostics.
    fn name(&self) -> &'static str;

    /// The dialect's spelling of the null literal.
    fn null_constant(&self) -> String {
        "NULL".to_string()
    }

    fn escape_identifier(&self, name: &str) -> String;

    fn escape_string_literal(&self, value: &str) -> String;

    fn time_to_sql(&self, t: DateTime<Utc>) -> String;

    /// Render any literal value, dispatching on its type.
    fn literal_to_sql(&self, value: &Value) -> String {
        match value {
            Value::Null => self.null_constant(),
            Value::Boolean(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Value::Number(n) => format_number(*n),
            Value::String(s) => self.escape_string_literal(s),
            Value::Time(t) => self.time_to_sql(*t),
            Value::Set(members) => {
                let rendered: Vec<String> =
                    members.iter().map(|m| self.literal_to_sql(m)).collect();
                format!("({})", rendered.join(","))
            }
        }
    }

    /// Wrap the operand in a cast from `input` to `output`. Fails when no
    /// template is registered for the pair.
    fn cast_expression(
        &self,
        input: ValueType,
        operand: &str,
        output: ValueType,
    ) -> Result<String, DialectError>;

    /// Convert a UTC operand to local wall time; identity at UTC.
    fn utc_to_walltime(&self, operand: &str, timezone: &Timezone) -> String;

    /// Reinterpret local wall time as UTC; identity at UTC.
    fn walltime_to_utc(&self, operand: &str, timezone: &Timezone) -> String;

    /// Floor a timestamp to a granularity in local wall time.
    ///
    /// The composition is: convert to local, truncate with the
    /// granularity's native function, format with its canonical format
    /// string, re-parse as a timestamp, convert back to UTC. Some engines'
    /// truncation functions return a type that must be renormalized through
    /// a fixed textual representation to yield a stable, comparable
    /// timestamp, so the round-trip is not optional.
    fn time_floor_expression(
        &self,
        operand: &str,
        granularity: Granularity,
        timezone: &Timezone,
    ) -> Result<String, DialectError>;

    /// Bucket boundaries equal floor points at this granularity set.
    fn time_bucket_expression(
        &self,
        operand: &str,
        granularity: Granularity,
        timezone: &Timezone,
    ) -> Result<String, DialectError> {
        self.time_floor_expression(operand, granularity, timezone)
    }

    /// Substitute the operand into the part's registered template, in local
    /// wall time.
    fn time_part_expression(
        &self,
        operand: &str,
        part: TimePartKind,
        timezone: &Timezone,
    ) -> Result<String, DialectError>;

    /// Shift a timestamp by decomposed duration spans. Span groups wrap
    /// successively (week, then year-month, then day-time) because each
    /// class has its own interval syntax.
    fn time_shift_expression(
        &self,
        operand: &str,
        duration: &DurationSpans,
        timezone: &Timezone,
    ) -> String;

    fn concat_expression(&self, a: &str, b: &str) -> String;

    /// True when `needle` occurs within `haystack`.
    fn contains_expression(&self, haystack: &str, needle: &str) -> String;

    /// Zero-based position of `needle` within `haystack`, -1 when absent.
    fn index_of_expression(&self, haystack: &str, needle: &str) -> String;

    /// Null-safe equality.
    fn is_not_distinct_from_expression(&self, a: &str, b: &str) -> String;

    /// Regex capture extraction. Engines without native support fail with
    /// `Unimplemented`; that is a declared capability gap, not a bug.
    fn extract_expression(&self, operand: &str, pattern: &str)
        -> Result<String, DialectError>;
}

/// Canonical `YYYY-MM-DD HH:MM:SS` rendering used inside datetime literals.
pub fn format_sql_datetime(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
