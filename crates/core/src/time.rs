//! Timestamps with unbounded signed years, and time precision levels.
//!
//! The index covers deep time (geologic and astronomic eras), so timestamps
//! carry a signed year far outside what calendar crates support. The string
//! form is ISO-8601 with the year zero-padded to at least four digits and an
//! explicit `-` for BCE. Conversion to and from epoch seconds uses
//! proleptic-Gregorian civil-day arithmetic.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TimeError, TimePrecisionError};

static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)(\d{4,})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})Z$")
        .expect("timestamp regex is well-formed")
});

/// A UTC timestamp with second resolution and an unbounded signed year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    pub fn new(
        year: i64,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, TimeError> {
        let t = Timestamp { year, month, day, hour, minute, second };
        t.check_ranges()?;
        Ok(t)
    }

    /// Parse the signed-year ISO-8601 form, e.g. `2006-01-02T15:04:05Z` or
    /// `-13800000000-01-01T00:00:00Z`.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let captures = TIMESTAMP_REGEX.captures(s).ok_or_else(|| TimeError::Syntax(s.to_string()))?;
        let year: i64 = captures[2].parse().map_err(|_| TimeError::YearOverflow)?;
        let year = if &captures[1] == "-" { -year } else { year };
        // Two-digit captures always parse.
        let t = Timestamp {
            year,
            month: captures[3].parse().unwrap(),
            day: captures[4].parse().unwrap(),
            hour: captures[5].parse().unwrap(),
            minute: captures[6].parse().unwrap(),
            second: captures[7].parse().unwrap(),
        };
        t.check_ranges()?;
        Ok(t)
    }

    fn check_ranges(&self) -> Result<(), TimeError> {
        if self.month < 1 || self.month > 12 {
            return Err(TimeError::Range(format!("month {}", self.month)));
        }
        if self.day < 1 || self.day > days_in_month(self.year, self.month) {
            return Err(TimeError::Range(format!("day {}", self.day)));
        }
        if self.hour > 23 {
            return Err(TimeError::Range(format!("hour {}", self.hour)));
        }
        if self.minute > 59 {
            return Err(TimeError::Range(format!("minute {}", self.minute)));
        }
        if self.second > 59 {
            return Err(TimeError::Range(format!("second {}", self.second)));
        }
        Ok(())
    }

    /// Seconds since the Unix epoch, proleptic Gregorian.
    pub fn to_epoch_seconds(&self) -> i64 {
        days_from_civil(self.year, self.month, self.day) * 86_400
            + i64::from(self.hour) * 3_600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    /// The timestamp for a Unix epoch second count.
    pub fn from_epoch_seconds(seconds: i64) -> Self {
        let days = seconds.div_euclid(86_400);
        let rest = seconds.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        Timestamp {
            year,
            month,
            day,
            hour: (rest / 3_600) as u8,
            minute: (rest % 3_600 / 60) as u8,
            second: (rest % 60) as u8,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.year < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year.unsigned_abs(),
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second
        )
    }
}

impl FromStr for Timestamp {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timestamp::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s).map_err(de::Error::custom)
    }
}

fn is_leap_year(year: i64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i64, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since 1970-01-01 for a proleptic-Gregorian civil date.
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400; // [0, 399]
    let mp = if month > 2 { i64::from(month) - 3 } else { i64::from(month) + 9 }; // [0, 11]
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8; // [1, 31]
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8; // [1, 12]
    (if month <= 2 { y + 1 } else { y }, month, day)
}

/// Time precision levels, giga-years down to seconds. Ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimePrecision {
    #[serde(rename = "G")]
    GigaYears,
    #[serde(rename = "100M")]
    HundredMegaYears,
    #[serde(rename = "10M")]
    TenMegaYears,
    #[serde(rename = "M")]
    MegaYears,
    #[serde(rename = "100k")]
    HundredKiloYears,
    #[serde(rename = "10k")]
    TenKiloYears,
    #[serde(rename = "k")]
    KiloYears,
    #[serde(rename = "100y")]
    HundredYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "y")]
    Year,
    #[serde(rename = "m")]
    Month,
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "min")]
    Minute,
    #[serde(rename = "s")]
    Second,
}

impl TimePrecision {
    pub const ALL: [TimePrecision; 15] = [
        TimePrecision::GigaYears,
        TimePrecision::HundredMegaYears,
        TimePrecision::TenMegaYears,
        TimePrecision::MegaYears,
        TimePrecision::HundredKiloYears,
        TimePrecision::TenKiloYears,
        TimePrecision::KiloYears,
        TimePrecision::HundredYears,
        TimePrecision::TenYears,
        TimePrecision::Year,
        TimePrecision::Month,
        TimePrecision::Day,
        TimePrecision::Hour,
        TimePrecision::Minute,
        TimePrecision::Second,
    ];

    /// The canonical short tag.
    pub fn tag(&self) -> &'static str {
        match self {
            TimePrecision::GigaYears => "G",
            TimePrecision::HundredMegaYears => "100M",
            TimePrecision::TenMegaYears => "10M",
            TimePrecision::MegaYears => "M",
            TimePrecision::HundredKiloYears => "100k",
            TimePrecision::TenKiloYears => "10k",
            TimePrecision::KiloYears => "k",
            TimePrecision::HundredYears => "100y",
            TimePrecision::TenYears => "10y",
            TimePrecision::Year => "y",
            TimePrecision::Month => "m",
            TimePrecision::Day => "d",
            TimePrecision::Hour => "h",
            TimePrecision::Minute => "min",
            TimePrecision::Second => "s",
        }
    }
}

impl fmt::Display for TimePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TimePrecision {
    type Err = TimePrecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimePrecision::ALL
            .iter()
            .find(|p| p.tag() == s)
            .copied()
            .ok_or_else(|| TimePrecisionError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(s: &str) {
        let t = Timestamp::parse(s).unwrap();
        assert_eq!(t.to_string(), s);
        assert_eq!(Timestamp::parse(&t.to_string()).unwrap(), t);
    }

    #[test]
    fn parse_format_round_trips() {
        round_trip("2006-01-02T15:04:05Z");
        round_trip("0001-01-01T00:00:00Z");
        round_trip("9999-12-31T23:59:59Z");
        round_trip("-0044-03-15T12:00:00Z");
        round_trip("-13800000000-01-01T00:00:00Z");
        round_trip("123456-06-01T00:00:00Z");
    }

    #[test]
    fn explicit_plus_is_accepted_but_not_emitted() {
        let t = Timestamp::parse("+2006-01-02T15:04:05Z").unwrap();
        assert_eq!(t.to_string(), "2006-01-02T15:04:05Z");
    }

    #[test]
    fn year_pads_to_four_digits() {
        let t = Timestamp::new(7, 3, 2, 1, 0, 0).unwrap();
        assert_eq!(t.to_string(), "0007-03-02T01:00:00Z");
        let t = Timestamp::new(-7, 3, 2, 1, 0, 0).unwrap();
        assert_eq!(t.to_string(), "-0007-03-02T01:00:00Z");
    }

    #[test]
    fn syntax_errors() {
        for bad in [
            "",
            "2006-01-02",
            "2006-01-02 15:04:05Z",
            "2006-01-02T15:04:05",
            "06-01-02T15:04:05Z",
            "2006-1-02T15:04:05Z",
            "garbage",
        ] {
            assert!(matches!(Timestamp::parse(bad), Err(TimeError::Syntax(_))), "{bad:?}");
        }
    }

    #[test]
    fn range_errors() {
        assert!(matches!(Timestamp::parse("2006-13-01T00:00:00Z"), Err(TimeError::Range(_))));
        assert!(matches!(Timestamp::parse("2006-02-29T00:00:00Z"), Err(TimeError::Range(_))));
        assert!(matches!(Timestamp::parse("2006-01-01T24:00:00Z"), Err(TimeError::Range(_))));
        assert!(matches!(Timestamp::parse("2006-01-01T00:60:00Z"), Err(TimeError::Range(_))));
        // 2004 is a leap year
        assert!(Timestamp::parse("2004-02-29T00:00:00Z").is_ok());
    }

    #[test]
    fn epoch_conversion_known_values() {
        assert_eq!(Timestamp::parse("1970-01-01T00:00:00Z").unwrap().to_epoch_seconds(), 0);
        assert_eq!(Timestamp::parse("1970-01-02T00:00:00Z").unwrap().to_epoch_seconds(), 86_400);
        assert_eq!(Timestamp::parse("1969-12-31T23:59:59Z").unwrap().to_epoch_seconds(), -1);
        assert_eq!(
            Timestamp::parse("2000-03-01T00:00:00Z").unwrap().to_epoch_seconds(),
            951_868_800
        );
    }

    #[test]
    fn epoch_round_trips() {
        for s in [
            "1970-01-01T00:00:00Z",
            "2006-01-02T15:04:05Z",
            "1900-02-28T23:59:59Z",
            "-0044-03-15T12:00:00Z",
            "-13800000000-01-01T00:00:00Z",
            "123456-06-01T00:00:00Z",
        ] {
            let t = Timestamp::parse(s).unwrap();
            assert_eq!(Timestamp::from_epoch_seconds(t.to_epoch_seconds()), t, "{s}");
        }
        for seconds in [0i64, 1, -1, 86_399, 86_400, -86_400, 951_868_800, -62_135_596_800] {
            let t = Timestamp::from_epoch_seconds(seconds);
            assert_eq!(t.to_epoch_seconds(), seconds, "{seconds}");
        }
    }

    #[test]
    fn precision_tags_round_trip() {
        for p in TimePrecision::ALL {
            assert_eq!(p.tag().parse::<TimePrecision>().unwrap(), p);
        }
        assert!("year".parse::<TimePrecision>().is_err());
        assert_eq!(serde_json::to_string(&TimePrecision::Minute).unwrap(), "\"min\"");
        assert_eq!(serde_json::from_str::<TimePrecision>("\"100M\"").unwrap(), TimePrecision::HundredMegaYears);
    }
}
