//! Parsing and evaluation of five-field cron expressions.

use std::{fmt, str::FromStr};

use chrono::{
    DateTime,
    Datelike,
    Duration as ChronoDuration,
    LocalResult,
    NaiveDate,
    NaiveDateTime,
    TimeZone,
    Timelike,
};

use crate::error::Error;

/// How many years ahead to search before concluding that an expression never
/// fires.
const SEARCH_YEARS: i32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed cron expression of the form
/// `minute hour day-of-month month day-of-week`.
///
/// Each field accepts `*`, single values, ranges (`1-5`), steps (`*/15`,
/// `0-30/10`, `5/20`) and comma separated lists of those. Months and weekdays
/// may be given by their three-letter English names, and `7` is accepted as
/// Sunday. The descriptors `@yearly`, `@annually`, `@monthly`, `@weekly`,
/// `@daily`, `@midnight` and `@hourly` are also understood.
///
/// When both the day-of-month and day-of-week fields are restricted, a day
/// matches if either field matches.
///
/// # Examples
///
/// ```
/// use threadkit::CronExpression;
///
/// let expression: CronExpression = "*/15 9-17 * * MON-FRI".parse().unwrap();
/// assert_eq!(expression.to_string(), "*/15 9-17 * * MON-FRI");
///
/// assert!("61 * * * *".parse::<CronExpression>().is_err());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

/// The numeric bounds and aliases of one field.
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    names_offset: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_offset: 0,
};

const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_offset: 0,
};

const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    names_offset: 0,
};

const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    names_offset: 1,
};

// 7 is folded onto 0 after parsing.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    names_offset: 0,
};

impl CronExpression {
    /// Parse a cron expression.
    ///
    /// Returns [`Error::InvalidExpression`] describing the first problem found.
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let source = expression.trim();

        let expanded = match source.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            descriptor if descriptor.starts_with('@') => {
                return Err(Error::invalid_expression(format!(
                    "unknown descriptor `{}`",
                    source
                )));
            }
            _ => source,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();

        if fields.len() != 5 {
            return Err(Error::invalid_expression(format!(
                "expected 5 fields but found {} in `{}`",
                fields.len(),
                source
            )));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;

        // Sunday can be written as either 0 or 7.
        if days_of_week & (1u64 << 7) != 0 {
            days_of_week = (days_of_week & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            source: source.to_owned(),
            minutes: parse_field(fields[0], &MINUTE)?,
            hours: parse_field(fields[1], &HOUR)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            months: parse_field(fields[3], &MONTH)?,
            days_of_week,
            day_of_month_restricted: !fields[2].starts_with('*'),
            day_of_week_restricted: !fields[4].starts_with('*'),
        })
    }

    /// Create an expression firing once a day at the given wall-clock time.
    pub(crate) fn daily(hour: u32, minute: u32) -> Result<Self, Error> {
        if hour > HOUR.max {
            return Err(Error::invalid_argument(format!(
                "hour {} out of range 0-23",
                hour
            )));
        }

        if minute > MINUTE.max {
            return Err(Error::invalid_argument(format!(
                "minute {} out of range 0-59",
                minute
            )));
        }

        Self::parse(&format!("{} {} * * *", minute, hour))
    }

    /// Compute the first time strictly after `after` (at minute granularity)
    /// matching this expression.
    ///
    /// Local times skipped by a daylight saving transition are never matched;
    /// ambiguous local times resolve to their earliest instant. Returns `None`
    /// if nothing matches within the next five years, which only happens for
    /// impossible dates such as February 30th.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let timezone = after.timezone();
        let start = after.naive_local();
        let limit = start.year() + SEARCH_YEARS;

        let mut candidate = start
            .date()
            .and_hms_opt(start.hour(), start.minute(), 0)?
            + ChronoDuration::minutes(1);

        loop {
            if candidate.year() > limit {
                return None;
            }

            if !contains(self.months, candidate.month()) {
                candidate = first_of_next_month(candidate.date())?;
                continue;
            }

            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !contains(self.hours, candidate.hour()) {
                candidate = candidate.date().and_hms_opt(candidate.hour(), 0, 0)?
                    + ChronoDuration::hours(1);
                continue;
            }

            if !contains(self.minutes, candidate.minute()) {
                candidate += ChronoDuration::minutes(1);
                continue;
            }

            match timezone.from_local_datetime(&candidate) {
                LocalResult::Single(time) => return Some(time),
                LocalResult::Ambiguous(earliest, _) => return Some(earliest),
                LocalResult::None => candidate += ChronoDuration::minutes(1),
            }
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let day_of_month = contains(self.days_of_month, date.day());
        let day_of_week = contains(self.days_of_week, date.weekday().num_days_from_sunday());

        if self.day_of_month_restricted && self.day_of_week_restricted {
            day_of_month || day_of_week
        } else {
            day_of_month && day_of_week
        }
    }
}

impl FromStr for CronExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl fmt::Debug for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronExpression").field(&self.source).finish()
    }
}

fn contains(set: u64, value: u32) -> bool {
    set & (1u64 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one field into a bit set of the values it matches.
fn parse_field(field: &str, spec: &FieldSpec) -> Result<u64, Error> {
    let mut set = 0;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<u32>().ok().filter(|step| *step > 0).ok_or_else(|| {
                    Error::invalid_expression(format!(
                        "invalid step `{}` in {} field",
                        step, spec.name
                    ))
                })?;

                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((start, end)) = range.split_once('-') {
            (parse_value(start, spec)?, parse_value(end, spec)?)
        } else {
            let value = parse_value(range, spec)?;

            // `5/20` means every 20 starting at 5.
            if step.is_some() {
                (value, spec.max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(Error::invalid_expression(format!(
                "range `{}` in {} field is reversed",
                range, spec.name
            )));
        }

        let step = step.unwrap_or(1) as usize;

        for value in (start..=end).step_by(step) {
            set |= 1u64 << value;
        }
    }

    Ok(set)
}

fn parse_value(value: &str, spec: &FieldSpec) -> Result<u32, Error> {
    let parsed = match value.parse::<u32>() {
        Ok(number) => Some(number),
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(value))
            .map(|index| index as u32 + spec.names_offset),
    };

    match parsed {
        Some(number) if number >= spec.min && number <= spec.max => Ok(number),
        Some(number) => Err(Error::invalid_expression(format!(
            "{} {} out of range {}-{}",
            spec.name, number, spec.min, spec.max
        ))),
        None => Err(Error::invalid_expression(format!(
            "invalid {} value `{}`",
            spec.name, value
        ))),
    }
}
