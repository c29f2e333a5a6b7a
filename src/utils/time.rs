use chrono::{
    DateTime, Datelike, Duration as TimeDelta, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone as _, Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named timezone with a fixed offset from UTC.
///
/// The name is what gets rendered into engine SQL (`toDateTime(x, 'name')`),
/// the offset is what native evaluation uses for wall-time arithmetic.
/// Minute resolution covers half-hour and 45-minute zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timezone {
    name: String,
    offset_minutes: i32,
}

impl Timezone {
    pub fn utc() -> Self {
        Self {
            name: "Etc/UTC".to_string(),
            offset_minutes: 0,
        }
    }

    pub fn fixed(name: &str, offset_minutes: i32) -> Self {
        Self {
            name: name.to_string(),
            offset_minutes,
        }
    }

    pub fn is_utc(&self) -> bool {
        self.offset_minutes == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }

    /// Convert a UTC instant to local wall time.
    pub fn to_walltime(&self, t: DateTime<Utc>) -> NaiveDateTime {
        (t + TimeDelta::minutes(self.offset_minutes as i64)).naive_utc()
    }

    /// Reinterpret local wall time as a UTC instant.
    pub fn from_walltime(&self, wall: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(wall - TimeDelta::minutes(self.offset_minutes as i64)))
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Fixed time-bucketing unit. The ISO labels are the keys the dialect
/// tables are registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 8] = [
        Granularity::Second,
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ];

    pub fn iso(&self) -> &'static str {
        match self {
            Granularity::Second => "PT1S",
            Granularity::Minute => "PT1M",
            Granularity::Hour => "PT1H",
            Granularity::Day => "P1D",
            Granularity::Week => "P1W",
            Granularity::Month => "P1M",
            Granularity::Quarter => "P3M",
            Granularity::Year => "P1Y",
        }
    }

    pub fn from_iso(label: &str) -> Option<Granularity> {
        Granularity::ALL.iter().copied().find(|g| g.iso() == label)
    }

    /// Floor a UTC instant to this granularity in the given timezone's wall
    /// time, then map the result back to UTC.
    pub fn floor(&self, t: DateTime<Utc>, timezone: &Timezone) -> DateTime<Utc> {
        let wall = timezone.to_walltime(t);
        let date = wall.date();
        let floored = match self {
            Granularity::Second => {
                NaiveDateTime::new(date, hms(wall.hour(), wall.minute(), wall.second()))
            }
            Granularity::Minute => NaiveDateTime::new(date, hms(wall.hour(), wall.minute(), 0)),
            Granularity::Hour => NaiveDateTime::new(date, hms(wall.hour(), 0, 0)),
            Granularity::Day => NaiveDateTime::new(date, NaiveTime::MIN),
            Granularity::Week => {
                let monday =
                    date - TimeDelta::days(date.weekday().num_days_from_monday() as i64);
                NaiveDateTime::new(monday, NaiveTime::MIN)
            }
            Granularity::Month => {
                NaiveDateTime::new(first_of_month(date, date.month()), NaiveTime::MIN)
            }
            Granularity::Quarter => {
                let quarter_month = (date.month0() / 3) * 3 + 1;
                NaiveDateTime::new(first_of_month(date, quarter_month), NaiveTime::MIN)
            }
            Granularity::Year => NaiveDateTime::new(first_of_month(date, 1), NaiveTime::MIN),
        };
        timezone.from_walltime(floored)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iso())
    }
}

fn hms(hour: u32, minute: u32, second: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN)
}

fn first_of_month(date: NaiveDate, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// Temporal "part" labels with registered extraction rules.
///
/// Native extraction mirrors the arithmetic of the dialect's part templates,
/// built on the MySQL-family day functions: WEEKDAY is Monday=0,
/// DAYOFWEEK is Sunday=1, DAYOFMONTH and DAYOFYEAR are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePartKind {
    SecondOfMinute,
    SecondOfHour,
    SecondOfDay,
    SecondOfWeek,
    SecondOfMonth,
    SecondOfYear,
    MinuteOfHour,
    MinuteOfDay,
    MinuteOfWeek,
    MinuteOfMonth,
    MinuteOfYear,
    HourOfDay,
    HourOfWeek,
    HourOfMonth,
    HourOfYear,
    DayOfWeek,
    DayOfMonth,
    DayOfYear,
    WeekOfYear,
    MonthOfYear,
    Year,
}

impl TimePartKind {
    pub const ALL: [TimePartKind; 21] = [
        TimePartKind::SecondOfMinute,
        TimePartKind::SecondOfHour,
        TimePartKind::SecondOfDay,
        TimePartKind::SecondOfWeek,
        TimePartKind::SecondOfMonth,
        TimePartKind::SecondOfYear,
        TimePartKind::MinuteOfHour,
        TimePartKind::MinuteOfDay,
        TimePartKind::MinuteOfWeek,
        TimePartKind::MinuteOfMonth,
        TimePartKind::MinuteOfYear,
        TimePartKind::HourOfDay,
        TimePartKind::HourOfWeek,
        TimePartKind::HourOfMonth,
        TimePartKind::HourOfYear,
        TimePartKind::DayOfWeek,
        TimePartKind::DayOfMonth,
        TimePartKind::DayOfYear,
        TimePartKind::WeekOfYear,
        TimePartKind::MonthOfYear,
        TimePartKind::Year,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TimePartKind::SecondOfMinute => "SECOND_OF_MINUTE",
            TimePartKind::SecondOfHour => "SECOND_OF_HOUR",
            TimePartKind::SecondOfDay => "SECOND_OF_DAY",
            TimePartKind::SecondOfWeek => "SECOND_OF_WEEK",
            TimePartKind::SecondOfMonth => "SECOND_OF_MONTH",
            TimePartKind::SecondOfYear => "SECOND_OF_YEAR",
            TimePartKind::MinuteOfHour => "MINUTE_OF_HOUR",
            TimePartKind::MinuteOfDay => "MINUTE_OF_DAY",
            TimePartKind::MinuteOfWeek => "MINUTE_OF_WEEK",
            TimePartKind::MinuteOfMonth => "MINUTE_OF_MONTH",
            TimePartKind::MinuteOfYear => "MINUTE_OF_YEAR",
            TimePartKind::HourOfDay => "HOUR_OF_DAY",
            TimePartKind::HourOfWeek => "HOUR_OF_WEEK",
            TimePartKind::HourOfMonth => "HOUR_OF_MONTH",
            TimePartKind::HourOfYear => "HOUR_OF_YEAR",
            TimePartKind::DayOfWeek => "DAY_OF_WEEK",
            TimePartKind::DayOfMonth => "DAY_OF_MONTH",
            TimePartKind::DayOfYear => "DAY_OF_YEAR",
            TimePartKind::WeekOfYear => "WEEK_OF_YEAR",
            TimePartKind::MonthOfYear => "MONTH_OF_YEAR",
            TimePartKind::Year => "YEAR",
        }
    }

    /// Extract this part from a UTC instant, in the given timezone's wall time.
    pub fn extract(&self, t: DateTime<Utc>, timezone: &Timezone) -> i64 {
        let wall = timezone.to_walltime(t);
        let h = wall.hour() as i64;
        let mi = wall.minute() as i64;
        let s = wall.second() as i64;
        let weekday_mon0 = wall.weekday().num_days_from_monday() as i64;
        let dayofweek_sun1 = wall.weekday().num_days_from_sunday() as i64 + 1;
        let dom = wall.day() as i64;
        let doy = wall.ordinal() as i64;

        match self {
            TimePartKind::SecondOfMinute => s,
            TimePartKind::SecondOfHour => mi * 60 + s,
            TimePartKind::SecondOfDay => (h * 60 + mi) * 60 + s,
            TimePartKind::SecondOfWeek => ((weekday_mon0 - 1) * 24 + h * 60 + mi) * 60 + s,
            TimePartKind::SecondOfMonth => ((dom - 1) * 24 + h * 60 + mi) * 60 + s,
            TimePartKind::SecondOfYear => ((doy - 1) * 24 + h * 60 + mi) * 60 + s,
            TimePartKind::MinuteOfHour => mi,
            TimePartKind::MinuteOfDay => h * 60 + mi,
            TimePartKind::MinuteOfWeek => (weekday_mon0 - 1) * 24 + h * 60 + mi,
            TimePartKind::MinuteOfMonth => (dom - 1) * 24 + h * 60 + mi,
            TimePartKind::MinuteOfYear => (doy - 1) * 24 + h * 60 + mi,
            TimePartKind::HourOfDay => h,
            TimePartKind::HourOfWeek => (weekday_mon0 - 1) * 24 + h,
            TimePartKind::HourOfMonth => (dom - 1) * 24 + h,
            TimePartKind::HourOfYear => (doy - 1) * 24 + h,
            TimePartKind::DayOfWeek => weekday_mon0,
            TimePartKind::DayOfMonth => dom,
            TimePartKind::DayOfYear => doy,
            TimePartKind::WeekOfYear => dayofweek_sun1,
            TimePartKind::MonthOfYear => wall.month() as i64,
            TimePartKind::Year => wall.year() as i64,
        }
    }
}

impl fmt::Display for TimePartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A shift duration decomposed into calendar spans.
///
/// Span groups compose left-to-right: a week span short-circuits the rest,
/// year and month apply together, then day through second. This matches how
/// the dialect layer chains interval additions, where each span class has
/// its own interval syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DurationSpans {
    pub year: i64,
    pub month: i64,
    pub week: i64,
    pub day: i64,
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
}

impl DurationSpans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn years(mut self, n: i64) -> Self {
        self.year = n;
        self
    }

    pub fn months(mut self, n: i64) -> Self {
        self.month = n;
        self
    }

    pub fn weeks(mut self, n: i64) -> Self {
        self.week = n;
        self
    }

    pub fn days(mut self, n: i64) -> Self {
        self.day = n;
        self
    }

    pub fn hours(mut self, n: i64) -> Self {
        self.hour = n;
        self
    }

    pub fn minutes(mut self, n: i64) -> Self {
        self.minute = n;
        self
    }

    pub fn seconds(mut self, n: i64) -> Self {
        self.second = n;
        self
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Shift a UTC instant by these spans, in the given timezone's wall time.
    pub fn shift(&self, t: DateTime<Utc>, timezone: &Timezone) -> DateTime<Utc> {
        let mut wall = timezone.to_walltime(t);
        if self.week != 0 {
            return timezone.from_walltime(wall + TimeDelta::weeks(self.week));
        }
        if self.year != 0 || self.month != 0 {
            wall = shift_months(wall, self.year * 12 + self.month);
        }
        if self.day != 0 || self.hour != 0 || self.minute != 0 || self.second != 0 {
            wall = wall
                + TimeDelta::days(self.day)
                + TimeDelta::hours(self.hour)
                + TimeDelta::minutes(self.minute)
                + TimeDelta::seconds(self.second);
        }
        timezone.from_walltime(wall)
    }

    pub fn to_iso(&self) -> String {
        if self.is_zero() {
            return "PT0S".to_string();
        }
        if self.week != 0 {
            return format!("P{}W", self.week);
        }
        let mut out = String::from("P");
        if self.year != 0 {
            out.push_str(&format!("{}Y", self.year));
        }
        if self.month != 0 {
            out.push_str(&format!("{}M", self.month));
        }
        if self.day != 0 {
            out.push_str(&format!("{}D", self.day));
        }
        if self.hour != 0 || self.minute != 0 || self.second != 0 {
            out.push('T');
            if self.hour != 0 {
                out.push_str(&format!("{}H", self.hour));
            }
            if self.minute != 0 {
                out.push_str(&format!("{}M", self.minute));
            }
            if self.second != 0 {
                out.push_str(&format!("{}S", self.second));
            }
        }
        out
    }
}

impl fmt::Display for DurationSpans {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso())
    }
}

fn shift_months(wall: NaiveDateTime, months: i64) -> NaiveDateTime {
    if months >= 0 {
        wall.checked_add_months(Months::new(months as u32)).unwrap_or(wall)
    } else {
        wall.checked_sub_months(Months::new((-months) as u32)).unwrap_or(wall)
    }
}
