//! # Water Year Calendar
//!
//! Conversions between calendar dates and the U.S. hydrological water year,
//! which runs from October 1 through September 30 and is labelled by the
//! calendar year in which it ends (October 1, 2020 starts water year 2021).
//!
//! Two day-of-water-year (DOWY) conventions are provided:
//!
//! - [`WaterYearConvention::Calendar`]: day 1 is always October 1 and the
//!   count runs to 365 or 366 depending on whether the water year contains
//!   a February 29.
//! - [`WaterYearConvention::FixedOffset`]: `ordinal - 273`, wrapped by 365.
//!   This reproduces archived climatology tables exactly, but drifts by one
//!   day after February 29 of a leap year.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use snowclim::water_year::{dowy, water_year};
//!
//! let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
//! assert_eq!(dowy(date), 93);
//! assert_eq!(water_year(date), 2021);
//! ```

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Ordinal of September 30 in a non-leap year.
pub const SEPT_30_ORDINAL: u32 = 273;

/// Month in which the water year starts.
pub const WATER_YEAR_START_MONTH: u32 = 10;

/// How a date is mapped onto a day-of-water-year index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WaterYearConvention {
    /// Days counted from October 1; leap days are honoured.
    #[default]
    Calendar,
    /// `ordinal - 273`, plus 365 when not positive.
    FixedOffset,
}

impl WaterYearConvention {
    /// Day of water year for `date` under this convention.
    pub fn dowy(self, date: NaiveDate) -> u32 {
        match self {
            WaterYearConvention::Calendar => dowy_calendar(date),
            WaterYearConvention::FixedOffset => dowy_fixed_offset(date),
        }
    }

    /// Largest DOWY this convention can produce.
    pub fn max_dowy(self) -> u32 {
        match self {
            WaterYearConvention::Calendar => 366,
            WaterYearConvention::FixedOffset => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WaterYearConvention::Calendar => "calendar",
            WaterYearConvention::FixedOffset => "fixed_offset",
        }
    }
}

impl std::fmt::Display for WaterYearConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WaterYearConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "calendar" => Ok(WaterYearConvention::Calendar),
            "fixed_offset" | "fixed" => Ok(WaterYearConvention::FixedOffset),
            other => Err(format!("Unknown water year convention: {}", other)),
        }
    }
}

/// Day of water year under the crate default ([`WaterYearConvention::Calendar`]).
pub fn dowy(date: NaiveDate) -> u32 {
    WaterYearConvention::default().dowy(date)
}

/// Fixed-offset day of water year, always in `1..=365`.
///
/// Subtracts the ordinal of September 30 (non-leap) from the date's ordinal
/// and wraps non-positive results by adding 365. Leap years are not
/// corrected, so from March 1 onwards a leap year reads one day late and
/// September 30 of a leap year maps to 1.
pub fn dowy_fixed_offset(date: NaiveDate) -> u32 {
    let shifted = date.ordinal() as i32 - SEPT_30_ORDINAL as i32;
    if shifted <= 0 {
        (shifted + 365) as u32
    } else {
        shifted as u32
    }
}

/// Calendar-correct day of water year, in `1..=366`.
pub fn dowy_calendar(date: NaiveDate) -> u32 {
    let start = water_year_start(water_year(date));
    (date - start).num_days() as u32 + 1
}

/// DOWY for every date, in input order.
pub fn dowy_batch(dates: &[NaiveDate], convention: WaterYearConvention) -> Vec<u32> {
    dates.iter().map(|&d| convention.dowy(d)).collect()
}

/// Water year label of `date`: the calendar year in which its water year ends.
pub fn water_year(date: NaiveDate) -> i32 {
    if date.month() >= WATER_YEAR_START_MONTH {
        date.year() + 1
    } else {
        date.year()
    }
}

/// October 1 of the year before `wy`.
pub fn water_year_start(wy: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(wy - 1, WATER_YEAR_START_MONTH, 1)
        .unwrap_or(NaiveDate::MIN)
}

/// September 30 of `wy`.
pub fn water_year_end(wy: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(wy, 9, 30).unwrap_or(NaiveDate::MAX)
}

/// Number of days in water year `wy` (366 when it contains February 29).
pub fn water_year_length(wy: i32) -> u32 {
    (water_year_end(wy) - water_year_start(wy)).num_days() as u32 + 1
}

/// Inverse of [`dowy_calendar`]. `None` when `dowy` falls outside water year `wy`.
pub fn date_from_dowy(wy: i32, dowy: u32) -> Option<NaiveDate> {
    if dowy == 0 || dowy > water_year_length(wy) {
        return None;
    }
    water_year_start(wy).checked_add_days(chrono::Days::new(u64::from(dowy - 1)))
}

/// The water year containing an explicitly supplied reference date.
///
/// Stands in for "this season" wherever a query window or a current-year
/// overlay is needed, so nothing depends on the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaterYearWindow {
    pub water_year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reference: NaiveDate,
}

impl WaterYearWindow {
    pub fn current(reference: NaiveDate) -> Self {
        let wy = water_year(reference);
        WaterYearWindow {
            water_year: wy,
            start: water_year_start(wy),
            end: water_year_end(wy),
            reference,
        }
    }

    /// Days from October 1 through the reference date, inclusive.
    pub fn days_elapsed(&self) -> u32 {
        dowy_calendar(self.reference)
    }

    /// True when `date` is in this water year and not after the reference date.
    pub fn contains_to_date(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_fixed_offset_boundaries_non_leap() {
        assert_eq!(dowy_fixed_offset(ymd(2021, 9, 30)), 365);
        assert_eq!(dowy_fixed_offset(ymd(2021, 10, 1)), 1);
        assert_eq!(dowy_fixed_offset(ymd(2021, 12, 31)), 92);
        assert_eq!(dowy_fixed_offset(ymd(2021, 1, 1)), 93);
    }

    #[test]
    fn test_fixed_offset_leap_year_drift() {
        // Ordinal 275 in 2020, one day late
        assert_eq!(dowy_fixed_offset(ymd(2020, 10, 1)), 2);
        assert_eq!(dowy_fixed_offset(ymd(2020, 9, 30)), 1);
        assert_eq!(dowy_fixed_offset(ymd(2020, 9, 29)), 365);
        assert_eq!(dowy_fixed_offset(ymd(2020, 12, 31)), 93);
    }

    #[test]
    fn test_fixed_offset_range_over_leap_cycle() {
        let mut d = ymd(2019, 1, 1);
        while d <= ymd(2024, 12, 31) {
            let v = dowy_fixed_offset(d);
            assert!((1..=365).contains(&v), "{} -> {}", d, v);
            d = d.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_calendar_october_first_is_always_one() {
        for year in 1990..2040 {
            assert_eq!(dowy_calendar(ymd(year, 10, 1)), 1);
        }
    }

    #[test]
    fn test_calendar_end_of_water_year() {
        assert_eq!(dowy_calendar(ymd(2021, 9, 30)), 365);
        assert_eq!(dowy_calendar(ymd(2020, 9, 30)), 366);
        assert_eq!(dowy_calendar(ymd(2020, 2, 29)), 152);
    }

    #[test]
    fn test_calendar_increments_then_wraps() {
        let mut d = ymd(2019, 10, 1);
        let mut expected = 1;
        while d < ymd(2021, 10, 1) {
            if d.month() == 10 && d.day() == 1 {
                expected = 1;
            }
            assert_eq!(dowy_calendar(d), expected, "{}", d);
            expected += 1;
            d = d.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_end_to_end_dates() {
        let dates = [ymd(2020, 10, 1), ymd(2021, 1, 1), ymd(2021, 9, 30)];
        assert_eq!(dowy_batch(&dates, WaterYearConvention::Calendar), vec![1, 93, 365]);
        assert_eq!(
            dowy_batch(&dates[1..], WaterYearConvention::FixedOffset),
            vec![93, 365]
        );
    }

    #[test]
    fn test_conventions_agree_outside_leap_years() {
        let mut d = ymd(2021, 10, 1);
        while d <= ymd(2023, 9, 30) {
            assert_eq!(dowy_calendar(d), dowy_fixed_offset(d), "{}", d);
            d = d.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_water_year_label_and_bounds() {
        assert_eq!(water_year(ymd(2020, 10, 1)), 2021);
        assert_eq!(water_year(ymd(2021, 9, 30)), 2021);
        assert_eq!(water_year_start(2021), ymd(2020, 10, 1));
        assert_eq!(water_year_end(2021), ymd(2021, 9, 30));
        assert_eq!(water_year_length(2021), 365);
        assert_eq!(water_year_length(2020), 366);
    }

    #[test]
    fn test_date_from_dowy_inverts_calendar() {
        assert_eq!(date_from_dowy(2021, 93), Some(ymd(2021, 1, 1)));
        assert_eq!(date_from_dowy(2020, 366), Some(ymd(2020, 9, 30)));
        assert_eq!(date_from_dowy(2021, 366), None);
        assert_eq!(date_from_dowy(2021, 0), None);
    }

    #[test]
    fn test_window_uses_reference_date() {
        let window = WaterYearWindow::current(ymd(2023, 3, 15));
        assert_eq!(window.water_year, 2023);
        assert_eq!(window.start, ymd(2022, 10, 1));
        assert_eq!(window.days_elapsed(), 166);
        assert!(window.contains_to_date(ymd(2022, 12, 1)));
        assert!(!window.contains_to_date(ymd(2023, 3, 16)));
        assert!(!window.contains_to_date(ymd(2022, 9, 30)));
    }

    #[test]
    fn test_convention_parsing() {
        assert_eq!("calendar".parse::<WaterYearConvention>(), Ok(WaterYearConvention::Calendar));
        assert_eq!(
            "fixed-offset".parse::<WaterYearConvention>(),
            Ok(WaterYearConvention::FixedOffset)
        );
        assert!("julian".parse::<WaterYearConvention>().is_err());
    }
}
