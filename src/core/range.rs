use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Named look-back window for performance views and fleet dashboards.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DateRange {
    #[serde(rename = "1m", alias = "1M")]
    OneMonth,
    #[serde(rename = "3m", alias = "3M")]
    ThreeMonths,
    #[serde(rename = "6m", alias = "6M")]
    SixMonths,
    #[serde(rename = "1y", alias = "1Y")]
    OneYear,
    #[serde(rename = "2y", alias = "2Y")]
    TwoYears,
    #[serde(rename = "5y", alias = "5Y")]
    FiveYears,
    #[default]
    #[serde(rename = "all", alias = "ALL")]
    All,
}

impl DateRange {
    pub const ALL_TOKENS: [DateRange; 7] = [
        DateRange::OneMonth,
        DateRange::ThreeMonths,
        DateRange::SixMonths,
        DateRange::OneYear,
        DateRange::TwoYears,
        DateRange::FiveYears,
        DateRange::All,
    ];

    pub fn token(self) -> &'static str {
        match self {
            DateRange::OneMonth => "1m",
            DateRange::ThreeMonths => "3m",
            DateRange::SixMonths => "6m",
            DateRange::OneYear => "1y",
            DateRange::TwoYears => "2y",
            DateRange::FiveYears => "5y",
            DateRange::All => "all",
        }
    }

    fn months(self) -> Option<u32> {
        match self {
            DateRange::OneMonth => Some(1),
            DateRange::ThreeMonths => Some(3),
            DateRange::SixMonths => Some(6),
            DateRange::OneYear => Some(12),
            DateRange::TwoYears => Some(24),
            DateRange::FiveYears => Some(60),
            DateRange::All => None,
        }
    }

    /// Earliest date included in the window ending at `now`.
    ///
    /// Month arithmetic clamps to the end of shorter months (31 Mar - 1m = 28/29 Feb).
    /// `All` has no cutoff and returns the earliest representable date.
    pub fn cutoff(self, now: NaiveDate) -> NaiveDate {
        self.months()
            .and_then(|months| now.checked_sub_months(Months::new(months)))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn includes(self, date: NaiveDate, now: NaiveDate) -> bool {
        date >= self.cutoff(now)
    }
}

/// Anything positioned on the calendar by a single date.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

/// Tail of an ascending-by-date slice that falls inside `range`.
pub fn within_range<T: Dated>(points: &[T], range: DateRange, now: NaiveDate) -> &[T] {
    let cutoff = range.cutoff(now);
    let start = points.partition_point(|p| p.date() < cutoff);
    &points[start..]
}

impl FromStr for DateRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DateRange::ALL_TOKENS
            .into_iter()
            .find(|range| range.token() == normalized)
            .ok_or_else(|| {
                EngineError::InvalidRange(format!(
                    "'{s}' is not one of 1m, 3m, 6m, 1y, 2y, 5y, all"
                ))
            })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn cutoff_subtracts_calendar_months() {
        let now = date(2024, 6, 15);
        assert_eq!(DateRange::OneMonth.cutoff(now), date(2024, 5, 15));
        assert_eq!(DateRange::SixMonths.cutoff(now), date(2023, 12, 15));
        assert_eq!(DateRange::OneYear.cutoff(now), date(2023, 6, 15));
        assert_eq!(DateRange::TwoYears.cutoff(now), date(2022, 6, 15));
        assert_eq!(DateRange::FiveYears.cutoff(now), date(2019, 6, 15));
    }

    #[test]
    fn cutoff_clamps_to_month_end() {
        assert_eq!(
            DateRange::OneMonth.cutoff(date(2024, 3, 31)),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn all_has_no_cutoff() {
        let now = date(2024, 6, 15);
        assert_eq!(DateRange::All.cutoff(now), NaiveDate::MIN);
        assert!(DateRange::All.includes(date(1999, 1, 1), now));
        assert!(DateRange::All.includes(date(1965, 3, 1), now));
    }

    #[test]
    fn includes_is_inclusive_of_cutoff() {
        let now = date(2024, 6, 15);
        assert!(DateRange::OneMonth.includes(date(2024, 5, 15), now));
        assert!(!DateRange::OneMonth.includes(date(2024, 5, 14), now));
    }

    #[derive(Debug, PartialEq)]
    struct Stamp(NaiveDate);

    impl Dated for Stamp {
        fn date(&self) -> NaiveDate {
            self.0
        }
    }

    #[test]
    fn within_range_keeps_the_tail_from_cutoff() {
        let points = vec![
            Stamp(date(2024, 1, 1)),
            Stamp(date(2024, 3, 1)),
            Stamp(date(2024, 5, 15)),
            Stamp(date(2024, 6, 1)),
        ];
        let now = date(2024, 6, 15);

        assert_eq!(
            within_range(&points, DateRange::OneMonth, now),
            &points[2..]
        );
        assert_eq!(within_range(&points, DateRange::All, now), &points[..]);
        assert!(within_range(&points, DateRange::OneMonth, date(2030, 1, 1)).is_empty());
    }

    #[test]
    fn parses_tokens_case_insensitively() {
        assert_eq!("1Y".parse::<DateRange>(), Ok(DateRange::OneYear));
        assert_eq!(" all ".parse::<DateRange>(), Ok(DateRange::All));
        assert!(matches!(
            "7d".parse::<DateRange>(),
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[test]
    fn serde_uses_short_tokens() {
        let json = serde_json::to_string(&DateRange::SixMonths).expect("serialize");
        assert_eq!(json, "\"6m\"");
        let parsed: DateRange = serde_json::from_str("\"2Y\"").expect("alias parses");
        assert_eq!(parsed, DateRange::TwoYears);
    }
}
