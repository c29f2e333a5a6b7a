use crate::algebra::value::ValueType;
use crate::dialect::dialect_trait::{format_sql_datetime, SqlDialect};
use crate::utils::error::DialectError;
use crate::utils::time::{DurationSpans, Granularity, TimePartKind, Timezone};
use chrono::{DateTime, Utc};

/// Dialect for ClickHouse, which speaks a MySQL-family function surface for
/// the operations this engine cares about.
///
/// The tables below are closed at compile time: an unregistered granularity,
/// part, or cast pair is unrepresentable rather than a runtime lookup miss.
#[derive(Debug, Clone, Default)]
pub struct ClickHouseDialect;

impl ClickHouseDialect {
    pub fn new() -> Self {
        ClickHouseDialect
    }

    fn bucket_format(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::Second
            | Granularity::Minute
            | Granularity::Hour
            | Granularity::Day
            | Granularity::Week
            | Granularity::Month
            | Granularity::Quarter
            | Granularity::Year => "%Y-%m-%d %H:%M:%S",
        }
    }

    fn date_time_fn(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::Second => "toStartOfSecond",
            Granularity::Minute => "toStartOfMinute",
            Granularity::Hour => "toStartOfHour",
            Granularity::Day => "toDate",
            Granularity::Week => "toStartOfWeek",
            Granularity::Month => "toStartOfMonth",
            Granularity::Quarter => "toStartOfQuarter",
            Granularity::Year => "toStartOfYear",
        }
    }

    fn part_template(part: TimePartKind) -> &'static str {
        match part {
            TimePartKind::SecondOfMinute => "SECOND($$)",
            TimePartKind::SecondOfHour => "(MINUTE($$)*60+SECOND($$))",
            TimePartKind::SecondOfDay => "((HOUR($$)*60+MINUTE($$))*60+SECOND($$))",
            TimePartKind::SecondOfWeek => {
                "((((WEEKDAY($$)-1)*24)+HOUR($$)*60+MINUTE($$))*60+SECOND($$))"
            }
            TimePartKind::SecondOfMonth => {
                "((((DAYOFMONTH($$)-1)*24)+HOUR($$)*60+MINUTE($$))*60+SECOND($$))"
            }
            TimePartKind::SecondOfYear => {
                "((((DAYOFYEAR($$)-1)*24)+HOUR($$)*60+MINUTE($$))*60+SECOND($$))"
            }
            TimePartKind::MinuteOfHour => "MINUTE($$)",
            TimePartKind::MinuteOfDay => "HOUR($$)*60+MINUTE($$)",
            TimePartKind::MinuteOfWeek => "((WEEKDAY($$)-1)*24)+HOUR($$)*60+MINUTE($$)",
            TimePartKind::MinuteOfMonth => "((DAYOFMONTH($$)-1)*24)+HOUR($$)*60+MINUTE($$)",
            TimePartKind::MinuteOfYear => "((DAYOFYEAR($$)-1)*24)+HOUR($$)*60+MINUTE($$)",
            TimePartKind::HourOfDay => "HOUR($$)",
            TimePartKind::HourOfWeek => "((WEEKDAY($$)-1)*24+HOUR($$))",
            TimePartKind::HourOfMonth => "((DAYOFMONTH($$)-1)*24+HOUR($$))",
            TimePartKind::HourOfYear => "((DAYOFYEAR($$)-1)*24+HOUR($$))",
            TimePartKind::DayOfWeek => "WEEKDAY($$)",
            TimePartKind::DayOfMonth => "DAYOFMONTH($$)",
            TimePartKind::DayOfYear => "DAYOFYEAR($$)",
            TimePartKind::WeekOfYear => "DAYOFWEEK($$)",
            TimePartKind::MonthOfYear => "MONTH($$)",
            TimePartKind::Year => "YEAR($$)",
        }
    }

    fn cast_template(output: ValueType, input: ValueType) -> Option<&'static str> {
        match (output, input) {
            (ValueType::Time, ValueType::Number) => Some("FROM_UNIXTIME($$ / 1000)"),
            (ValueType::Number, ValueType::Time) => Some("toUnixTimestamp($$) * 1000"),
            (ValueType::Number, ValueType::String) => Some("CAST($$ AS SIGNED)"),
            (ValueType::String, ValueType::Number) => Some("CAST($$ AS CHAR)"),
            _ => None,
        }
    }
}

impl SqlDialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn escape_string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn time_to_sql(&self, t: DateTime<Utc>) -> String {
        format!("toDateTime('{}')", format_sql_datetime(t))
    }

    fn cast_expression(
        &self,
        input: ValueType,
        operand: &str,
        output: ValueType,
    ) -> Result<String, DialectError> {
        let template =
            Self::cast_template(output, input).ok_or(DialectError::UnsupportedCast {
                dialect: self.name(),
                input: input.label().to_string(),
                output: output.label().to_string(),
            })?;
        Ok(template.replace("$$", operand))
    }

    fn utc_to_walltime(&self, operand: &str, timezone: &Timezone) -> String {
        if timezone.is_utc() {
            return operand.to_string();
        }
        format!("toDateTime({}, '{}')", operand, timezone)
    }

    fn walltime_to_utc(&self, operand: &str, timezone: &Timezone) -> String {
        if timezone.is_utc() {
            return operand.to_string();
        }
        format!("toDateTime({}, '{}')", operand, timezone)
    }

    fn time_floor_expression(
        &self,
        operand: &str,
        granularity: Granularity,
        timezone: &Timezone,
    ) -> Result<String, DialectError> {
        let bucket_format = Self::bucket_format(granularity);
        let truncated = format!(
            "{}({})",
            Self::date_time_fn(granularity),
            self.utc_to_walltime(operand, timezone)
        );
        let reparsed = format!(
            "toDateTime(formatDateTime({},'{}'))",
            truncated, bucket_format
        );
        Ok(self.walltime_to_utc(&reparsed, timezone))
    }

    fn time_part_expression(
        &self,
        operand: &str,
        part: TimePartKind,
        timezone: &Timezone,
    ) -> Result<String, DialectError> {
        let template = Self::part_template(part);
        Ok(template.replace("$$", &self.utc_to_walltime(operand, timezone)))
    }

    fn time_shift_expression(
        &self,
        operand: &str,
        duration: &DurationSpans,
        _timezone: &Timezone,
    ) -> String {
        if duration.week != 0 {
            return format!("DATE_ADD({}, INTERVAL {} WEEK)", operand, duration.week);
        }
        let mut shifted = operand.to_string();
        if duration.year != 0 || duration.month != 0 {
            shifted = format!(
                "DATE_ADD({}, INTERVAL '{}-{}' YEAR_MONTH)",
                shifted, duration.year, duration.month
            );
        }
        if duration.day != 0 || duration.hour != 0 || duration.minute != 0 || duration.second != 0
        {
            shifted = format!(
                "DATE_ADD({}, INTERVAL '{} {}:{}:{}' DAY_SECOND)",
                shifted, duration.day, duration.hour, duration.minute, duration.second
            );
        }
        shifted
    }

    fn concat_expression(&self, a: &str, b: &str) -> String {
        format!("CONCAT({},{})", a, b)
    }

    fn contains_expression(&self, haystack: &str, needle: &str) -> String {
        format!("LOCATE({},{})>0", needle, haystack)
    }

    fn index_of_expression(&self, haystack: &str, needle: &str) -> String {
        format!("LOCATE({}, {}) - 1", needle, haystack)
    }

    fn is_not_distinct_from_expression(&self, a: &str, b: &str) -> String {
        format!("({}={})", a, b)
    }

    fn extract_expression(
        &self,
        _operand: &str,
        _pattern: &str,
    ) -> Result<String, DialectError> {
        Err(DialectError::Unimplemented {
            dialect: self.name(),
            operation: "extractExpression",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn test_escape_identifier_doubles_backticks() {
        let dialect = ClickHouseDialect::new();
        assert_eq!(dialect.escape_identifier("events"), "`events`");
        assert_eq!(dialect.escape_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_escape_string_literal() {
        let dialect = ClickHouseDialect::new();
        assert_eq!(dialect.escape_string_literal("plain"), "'plain'");
        assert_eq!(dialect.escape_string_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_time_to_sql() {
        let dialect = ClickHouseDialect::new();
        let t = Utc.with_ymd_and_hms(2021, 3, 15, 6, 30, 0).single().unwrap();
        assert_eq!(dialect.time_to_sql(t), "toDateTime('2021-03-15 06:30:00')");
    }

    #[test]
    fn test_cast_templates() {
        let dialect = ClickHouseDialect::new();
        assert_eq!(
            dialect
                .cast_expression(ValueType::Number, "`t`", ValueType::Time)
                .unwrap(),
            "FROM_UNIXTIME(`t` / 1000)"
        );
        assert_eq!(
            dialect
                .cast_expression(ValueType::Time, "`t`", ValueType::Number)
                .unwrap(),
            "toUnixTimestamp(`t`) * 1000"
        );
        assert_eq!(
            dialect
                .cast_expression(ValueType::String, "`s`", ValueType::Number)
                .unwrap(),
            "CAST(`s` AS SIGNED)"
        );
    }

    #[test]
    fn test_cast_unsupported_pair() {
        let dialect = ClickHouseDialect::new();
        let err = dialect
            .cast_expression(ValueType::Boolean, "`b`", ValueType::Time)
            .unwrap_err();
        assert!(matches!(err, DialectError::UnsupportedCast { .. }));
    }

    #[test]
    fn test_walltime_conversion_identity_at_utc() {
        let dialect = ClickHouseDialect::new();
        let utc = Timezone::utc();
        assert_eq!(dialect.utc_to_walltime("`t`", &utc), "`t`");
        assert_eq!(dialect.walltime_to_utc("`t`", &utc), "`t`");
    }

    #[test]
    fn test_time_floor_day_in_utc() {
        let dialect = ClickHouseDialect::new();
        let sql = dialect
            .time_floor_expression("`t`", Granularity::Day, &Timezone::utc())
            .unwrap();
        assert_eq!(
            sql,
            "toDateTime(formatDateTime(toDate(`t`),'%Y-%m-%d %H:%M:%S'))"
        );
    }

    #[test]
    fn test_time_floor_day_in_offset_zone() {
        let dialect = ClickHouseDialect::new();
        let tz = Timezone::fixed("Asia/Kolkata", 330);
        let sql = dialect
            .time_floor_expression("`t`", Granularity::Day, &tz)
            .unwrap();
        assert_eq!(
            sql,
            "toDateTime(toDateTime(formatDateTime(toDate(toDateTime(`t`, 'Asia/Kolkata')),'%Y-%m-%d %H:%M:%S')), 'Asia/Kolkata')"
        );
    }

    #[test]
    fn test_time_bucket_equals_time_floor() {
        let dialect = ClickHouseDialect::new();
        let tz = Timezone::fixed("America/New_York", -300);
        for g in Granularity::ALL {
            assert_eq!(
                dialect.time_bucket_expression("`t`", g, &tz).unwrap(),
                dialect.time_floor_expression("`t`", g, &tz).unwrap()
            );
        }
    }

    #[test]
    fn test_time_part_substitutes_walltime() {
        let dialect = ClickHouseDialect::new();
        let tz = Timezone::fixed("Asia/Kolkata", 330);
        let sql = dialect
            .time_part_expression("`t`", TimePartKind::HourOfDay, &tz)
            .unwrap();
        assert_eq!(sql, "HOUR(toDateTime(`t`, 'Asia/Kolkata'))");

        let sod = dialect
            .time_part_expression("`t`", TimePartKind::SecondOfHour, &Timezone::utc())
            .unwrap();
        assert_eq!(sod, "(MINUTE(`t`)*60+SECOND(`t`))");
    }

    #[test]
    fn test_time_shift_week_short_circuits() {
        let dialect = ClickHouseDialect::new();
        let spans = DurationSpans::new().weeks(2).days(4);
        assert_eq!(
            dialect.time_shift_expression("`t`", &spans, &Timezone::utc()),
            "DATE_ADD(`t`, INTERVAL 2 WEEK)"
        );
    }

    #[test]
    fn test_time_shift_groups_compose_left_to_right() {
        let dialect = ClickHouseDialect::new();
        let spans = DurationSpans::new().years(1).months(2).days(3).hours(4);
        assert_eq!(
            dialect.time_shift_expression("`t`", &spans, &Timezone::utc()),
            "DATE_ADD(DATE_ADD(`t`, INTERVAL '1-2' YEAR_MONTH), INTERVAL '3 4:0:0' DAY_SECOND)"
        );
    }

    #[test]
    fn test_string_helpers() {
        let dialect = ClickHouseDialect::new();
        assert_eq!(dialect.concat_expression("`a`", "`b`"), "CONCAT(`a`,`b`)");
        assert_eq!(
            dialect.contains_expression("`page`", "'wiki'"),
            "LOCATE('wiki',`page`)>0"
        );
        assert_eq!(
            dialect.index_of_expression("`page`", "'wiki'"),
            "LOCATE('wiki', `page`) - 1"
        );
        assert_eq!(
            dialect.is_not_distinct_from_expression("`a`", "`b`"),
            "(`a`=`b`)"
        );
    }

    #[test]
    fn test_extract_is_a_declared_gap() {
        let dialect = ClickHouseDialect::new();
        let err = dialect.extract_expression("`s`", "(\\d+)").unwrap_err();
        assert!(matches!(err, DialectError::Unimplemented { .. }));
    }
}
