//! ISO-8601 时长（`PnYnMnWnDTnHnMnS`）。
//!
//! 年、月按日历运算（落在月末之后的日期截断到目标月最后一天），周、日、时、分、秒按固定长度运算。
//! 不接受小数分量与负号。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid ISO-8601 period `{input}`: {detail}")]
pub struct PeriodParseError {
    pub input: String,
    pub detail: String,
}

impl PeriodParseError {
    fn new(input: &str, detail: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            detail: detail.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Period {
    pub const fn days(days: u32) -> Self {
        Self {
            years: 0,
            months: 0,
            weeks: 0,
            days,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    pub const fn months(months: u32) -> Self {
        Self {
            years: 0,
            months,
            weeks: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    fn calendar_months(&self) -> u32 {
        self.years.saturating_mul(12).saturating_add(self.months)
    }

    fn fixed_span(&self) -> Option<TimeDelta> {
        let days = i64::from(self.weeks) * 7 + i64::from(self.days);
        TimeDelta::try_days(days)?
            .checked_add(&TimeDelta::try_hours(i64::from(self.hours))?)?
            .checked_add(&TimeDelta::try_minutes(i64::from(self.minutes))?)?
            .checked_add(&TimeDelta::try_seconds(i64::from(self.seconds))?)
    }

    /// 不含年、月分量时换算为固定时长；含日历分量时返回 `None`。
    pub fn fixed_duration(&self) -> Option<std::time::Duration> {
        if self.calendar_months() != 0 {
            return None;
        }
        self.fixed_span()?.to_std().ok()
    }

    /// `at + self`；超出可表示范围时返回 `None`。
    pub fn add_to(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        at.checked_add_months(Months::new(self.calendar_months()))?
            .checked_add_signed(self.fixed_span()?)
    }

    /// `at - self`；超出可表示范围时返回 `None`。
    pub fn subtract_from(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        at.checked_sub_months(Months::new(self.calendar_months()))?
            .checked_sub_signed(self.fixed_span()?)
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let body = input
            .strip_prefix('P')
            .ok_or_else(|| PeriodParseError::new(input, "must start with `P`"))?;
        let (date_part, time_part) = match body.split_once('T') {
            Some((date, time)) => {
                if time.is_empty() {
                    return Err(PeriodParseError::new(input, "`T` must be followed by a time component"));
                }
                (date, Some(time))
            }
            None => (body, None),
        };

        let mut period = Period::default();
        let mut seen_any = false;

        let mut date_slots: [(char, &mut u32); 4] = [
            ('Y', &mut period.years),
            ('M', &mut period.months),
            ('W', &mut period.weeks),
            ('D', &mut period.days),
        ];
        seen_any |= parse_components(input, date_part, &mut date_slots)?;

        if let Some(time) = time_part {
            let mut time_slots: [(char, &mut u32); 3] = [
                ('H', &mut period.hours),
                ('M', &mut period.minutes),
                ('S', &mut period.seconds),
            ];
            seen_any |= parse_components(input, time, &mut time_slots)?;
        }

        if !seen_any {
            return Err(PeriodParseError::new(input, "no duration component"));
        }
        Ok(period)
    }
}

/// 按固定顺序解析 `<digits><designator>` 序列，返回是否至少解析到一个分量。
fn parse_components(input: &str, mut rest: &str, slots: &mut [(char, &mut u32)]) -> Result<bool, PeriodParseError> {
    let mut next_slot = 0;
    let mut seen = false;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return Err(PeriodParseError::new(input, format!("expected a number before `{rest}`")));
        }
        let (number, tail) = rest.split_at(digits);
        let mut tail_chars = tail.chars();
        let designator = tail_chars
            .next()
            .ok_or_else(|| PeriodParseError::new(input, format!("number `{number}` has no designator")))?;
        let position = slots[next_slot..]
            .iter()
            .position(|(candidate, _)| *candidate == designator)
            .ok_or_else(|| {
                PeriodParseError::new(input, format!("unexpected or out-of-order designator `{designator}`"))
            })?;
        let value = number
            .parse::<u32>()
            .map_err(|err| PeriodParseError::new(input, format!("component `{number}{designator}`: {err}")))?;
        let index = next_slot + position;
        *slots[index].1 = value;
        next_slot = index + 1;
        seen = true;
        rest = tail_chars.as_str();
    }
    Ok(seen)
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        for (value, designator) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value > 0 {
                write!(f, "{value}{designator}")?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            f.write_str("T")?;
            for (value, designator) in [(self.hours, 'H'), (self.minutes, 'M'), (self.seconds, 'S')] {
                if value > 0 {
                    write!(f, "{value}{designator}")?;
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    #[test]
    fn parses_common_forms() {
        assert_eq!("P30D".parse::<Period>().unwrap(), Period::days(30));
        assert_eq!("P2Y".parse::<Period>().unwrap().years, 2);
        let mixed: Period = "P1Y2M3W4DT5H6M7S".parse().unwrap();
        assert_eq!(mixed.to_string(), "P1Y2M3W4DT5H6M7S");
        assert_eq!("PT36H".parse::<Period>().unwrap().hours, 36);
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["", "30D", "P", "PT", "P1.5D", "P-1D", "P1D2Y", "P1DT", "PXD", "P1", "P1M1M", "banana"] {
            assert!(raw.parse::<Period>().is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn minute_and_month_designators_are_disambiguated_by_t() {
        let period: Period = "P1MT1M".parse().unwrap();
        assert_eq!((period.months, period.minutes), (1, 1));
    }

    #[test]
    fn calendar_arithmetic() {
        assert_eq!(
            Period::days(30).subtract_from(at("2019-06-01T00:00:00Z")),
            Some(at("2019-05-02T00:00:00Z"))
        );
        assert_eq!(
            Period::months(1).add_to(at("2019-01-31T10:00:00Z")),
            Some(at("2019-02-28T10:00:00Z"))
        );
        let two_years: Period = "P2Y".parse().unwrap();
        assert_eq!(two_years.add_to(at("2016-02-29T00:00:00Z")), Some(at("2018-02-28T00:00:00Z")));
    }

    #[test]
    fn fixed_duration_excludes_calendar_components() {
        let timeout: Period = "PT1M30S".parse().unwrap();
        assert_eq!(timeout.fixed_duration(), Some(std::time::Duration::from_secs(90)));
        assert_eq!(Period::months(1).fixed_duration(), None);
    }

    #[test]
    fn serde_uses_iso_text() {
        let json = serde_json::to_string(&Period::days(7)).unwrap();
        assert_eq!(json, "\"P7D\"");
        assert!(serde_json::from_str::<Period>("\"P7X\"").is_err());
    }
}
