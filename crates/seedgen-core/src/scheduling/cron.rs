use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Timelike};

use crate::models::{CoreError, CoreErrorKind};

const SEARCH_HORIZON_YEARS: i32 = 8;

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: MONTH_NAMES,
};
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: WEEKDAY_NAMES,
};

/// A parsed 5-field crontab expression (minute, hour, day-of-month, month,
/// day-of-week).
///
/// When both day fields are restricted a day matches if either matches, as in
/// Vixie cron; a field counts as unrestricted when it starts with `*`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CoreError> {
        let trimmed = expression.trim();
        let expanded = expand_macro(trimmed).ok_or_else(|| {
            invalid_schedule(expression, format!("unsupported macro '{trimmed}'"))
        })?;

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid_schedule(
                expression,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let parse = |raw: &str, spec: &FieldSpec| {
            parse_field(raw, spec).map_err(|reason| {
                invalid_schedule(expression, format!("{} field '{raw}': {reason}", spec.name))
            })
        };

        let minutes = parse(fields[0], &MINUTE)?;
        let hours = parse(fields[1], &HOUR)?;
        let days_of_month = parse(fields[2], &DAY_OF_MONTH)?;
        let months = parse(fields[3], &MONTH)?;
        let mut days_of_week = parse(fields[4], &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            day_of_month_restricted: !fields[2].starts_with('*'),
            day_of_week_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The normalized expression (macros expanded, whitespace collapsed).
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, evaluated in `after`'s time
    /// zone. Local times that do not exist are skipped; ambiguous local times
    /// resolve to the earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let timezone = after.timezone();
        let local = after.naive_local();
        let horizon_year = local.year().saturating_add(SEARCH_HORIZON_YEARS);
        let mut candidate =
            local.date().and_hms_opt(local.hour(), local.minute(), 0)? + Duration::minutes(1);

        while candidate.year() <= horizon_year {
            let date = candidate.date();
            if !bit_set(self.months, date.month()) {
                candidate = first_of_next_month(date)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(date) {
                candidate = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit_set(self.hours, candidate.hour()) {
                candidate = date.and_hms_opt(candidate.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !bit_set(self.minutes, candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            let resolved = match timezone.from_local_datetime(&candidate) {
                LocalResult::Single(resolved) => Some(resolved),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                LocalResult::None => None,
            };
            match resolved {
                Some(resolved) if resolved > *after => return Some(resolved),
                _ => candidate += Duration::minutes(1),
            }
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let day_of_month = bit_set(self.days_of_month, date.day());
        let day_of_week = bit_set(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.day_of_month_restricted && self.day_of_week_restricted {
            day_of_month || day_of_week
        } else {
            day_of_month && day_of_week
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for CronSchedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

fn expand_macro(expression: &str) -> Option<&str> {
    if !expression.starts_with('@') {
        return Some(expression);
    }
    match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Some("0 0 1 1 *"),
        "@monthly" => Some("0 0 1 * *"),
        "@weekly" => Some("0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 * * *"),
        "@hourly" => Some("0 * * * *"),
        _ => None,
    }
}

fn parse_field(raw: &str, spec: &FieldSpec) -> Result<u64, String> {
    let mut mask = 0u64;

    for part in raw.split(',') {
        if part.is_empty() {
            return Err("empty list element".to_string());
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("step '{step}' is not a number"))?;
                if step == 0 {
                    return Err("step must be greater than zero".to_string());
                }
                if step > spec.max {
                    return Err(format!("step {step} exceeds field maximum {}", spec.max));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, spec)?, parse_value(high, spec)?)
        } else {
            let value = parse_value(range, spec)?;
            if step.is_some() {
                (value, spec.max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(format!("range {start}-{end} is reversed"));
        }

        let step = step.unwrap_or(1);
        let mut value = start;
        while value <= end {
            mask |= 1 << value;
            let Some(next) = value.checked_add(step) else {
                break;
            };
            value = next;
        }
    }

    Ok(mask)
}

fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32, String> {
    let value = match token.parse::<u32>() {
        Ok(value) => value,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .and_then(|index| u32::try_from(index).ok())
            .map(|index| index + spec.min)
            .ok_or_else(|| format!("'{token}' is not a number or known name"))?,
    };

    if value < spec.min || value > spec.max {
        return Err(format!(
            "value {value} is outside [{}, {}]",
            spec.min, spec.max
        ));
    }
    Ok(value)
}

fn bit_set(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn invalid_schedule(expression: &str, reason: String) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidSchedule,
        format!("invalid cron expression '{expression}': {reason}"),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::CronSchedule;
    use crate::models::CoreErrorKind;

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
            .unwrap()
    }

    fn next(expression: &str, after: chrono::DateTime<Utc>) -> Option<chrono::DateTime<Utc>> {
        CronSchedule::parse(expression).unwrap().next_after(&after)
    }

    #[test]
    fn daily_schedule_fires_at_the_configured_hour() {
        assert_eq!(next("0 2 * * *", at(2026, 3, 10, 1, 0)), Some(at(2026, 3, 10, 2, 0)));
        assert_eq!(next("0 2 * * *", at(2026, 3, 10, 2, 0)), Some(at(2026, 3, 11, 2, 0)));
    }

    #[test]
    fn fire_time_is_strictly_after_reference() {
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 10, 14, 59).unwrap();
        assert_eq!(next("*/15 * * * *", after), Some(at(2026, 3, 10, 10, 15)));
        assert_eq!(next("*/15 * * * *", at(2026, 3, 10, 10, 15)), Some(at(2026, 3, 10, 10, 30)));
    }

    #[test]
    fn ranges_lists_and_offset_steps_expand() {
        assert_eq!(next("5-10/5,40 * * * *", at(2026, 3, 10, 10, 6)), Some(at(2026, 3, 10, 10, 10)));
        assert_eq!(next("5-10/5,40 * * * *", at(2026, 3, 10, 10, 10)), Some(at(2026, 3, 10, 10, 40)));
        assert_eq!(next("50/5 * * * *", at(2026, 3, 10, 10, 56)), Some(at(2026, 3, 10, 11, 50)));
    }

    #[test]
    fn sunday_accepts_zero_seven_and_name() {
        // 2026-03-11 is a Wednesday; the following Sunday is the 15th.
        let wednesday = at(2026, 3, 11, 12, 0);
        for expression in ["0 0 * * 0", "0 0 * * 7", "0 0 * * sun"] {
            assert_eq!(next(expression, wednesday), Some(at(2026, 3, 15, 0, 0)));
        }
    }

    #[test]
    fn restricted_day_fields_are_or_combined() {
        // Friday the 6th comes before the 13th.
        assert_eq!(next("0 0 13 * 5", at(2026, 3, 1, 0, 0)), Some(at(2026, 3, 6, 0, 0)));
    }

    #[test]
    fn starred_day_field_keeps_and_semantics() {
        // Mondays that are also odd days of the month: Mar 9 is the first.
        assert_eq!(next("0 0 */2 * MON", at(2026, 3, 1, 0, 0)), Some(at(2026, 3, 9, 0, 0)));
    }

    #[test]
    fn month_names_skip_to_the_matching_month() {
        assert_eq!(next("0 0 1 JUN *", at(2026, 3, 10, 0, 0)), Some(at(2026, 6, 1, 0, 0)));
        assert_eq!(next("0 0 1 dec *", at(2026, 12, 1, 0, 0)), Some(at(2027, 12, 1, 0, 0)));
    }

    #[test]
    fn macros_expand_to_standard_expressions() {
        assert_eq!(CronSchedule::parse("@daily").unwrap().as_str(), "0 0 * * *");
        assert_eq!(next("@hourly", at(2026, 3, 10, 10, 30)), Some(at(2026, 3, 10, 11, 0)));
        assert!(CronSchedule::parse("@reboot").is_err());
    }

    #[test]
    fn impossible_dates_have_no_next_fire_time() {
        assert_eq!(next("0 0 30 2 *", at(2026, 1, 1, 0, 0)), None);
    }

    #[test]
    fn leap_day_is_found_within_the_search_horizon() {
        assert_eq!(next("0 0 29 2 *", at(2026, 1, 1, 0, 0)), Some(at(2028, 2, 29, 0, 0)));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for expression in [
            "",
            "not-a-cron",
            "* * * *",
            "0 * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "1/4294967295 * * * *",
            "*/4294967295 * * * *",
            "* * */32 * *",
            "5-1 * * * *",
            "1,,2 * * * *",
            "* * * FOO *",
        ] {
            let error = CronSchedule::parse(expression).unwrap_err();
            assert_eq!(error.kind, CoreErrorKind::InvalidSchedule, "{expression}");
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let schedule: CronSchedule = "  0   2 *  * * ".parse().unwrap();
        assert_eq!(schedule.to_string(), "0 2 * * *");
    }
}
