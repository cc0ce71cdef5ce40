use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DbResult, Error};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

const MICROS_PER_SEC: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SEC;

// Newtype names used to carry these types through the cell codec without
// losing their identity. Human-readable formats see plain strings instead.
pub(crate) const DATE_TOKEN: &str = "$duckbridge::Date";
pub(crate) const TIME_TOKEN: &str = "$duckbridge::Time";
pub(crate) const TIMESTAMP_TOKEN: &str = "$duckbridge::Timestamp";
pub(crate) const INTERVAL_TOKEN: &str = "$duckbridge::Interval";
pub(crate) const DECIMAL_TOKEN: &str = "$duckbridge::Decimal";
pub(crate) const UUID_TOKEN: &str = "$duckbridge::Uuid";

/// A calendar date, stored as days since 1970-01-01.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    days: i32,
}

impl Date {
    pub const fn from_days(days: i32) -> Date {
        Date { days }
    }

    pub const fn days(self) -> i32 {
        self.days
    }

    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(self.days.checked_add(UNIX_EPOCH_CE_DAYS)?)
    }
}

impl From<NaiveDate> for Date {
    fn from(date: NaiveDate) -> Date {
        Date::from_days(date.num_days_from_ce() - UNIX_EPOCH_CE_DAYS)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None => write!(f, "{} days", self.days),
        }
    }
}

impl FromStr for Date {
    type Err = Error;

    fn from_str(s: &str) -> DbResult<Date> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Date::from)
            .map_err(|_| Error::mismatch("VARCHAR", "DATE"))
    }
}

/// A time of day, stored as microseconds since midnight.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    micros: i64,
}

impl Time {
    pub const fn from_micros(micros: i64) -> Time {
        Time { micros }
    }

    pub const fn micros(self) -> i64 {
        self.micros
    }

    pub fn to_naive(self) -> Option<NaiveTime> {
        if !(0..MICROS_PER_DAY).contains(&self.micros) {
            return None;
        }
        let secs = u32::try_from(self.micros / MICROS_PER_SEC).ok()?;
        let nanos = u32::try_from(self.micros % MICROS_PER_SEC * 1_000).ok()?;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
    }
}

impl From<NaiveTime> for Time {
    fn from(time: NaiveTime) -> Time {
        let micros = i64::from(time.num_seconds_from_midnight()) * MICROS_PER_SEC
            + i64::from(time.nanosecond() / 1_000);
        Time::from_micros(micros)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_clock(f, self.micros)
    }
}

impl FromStr for Time {
    type Err = Error;

    fn from_str(s: &str) -> DbResult<Time> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map(Time::from)
            .map_err(|_| Error::mismatch("VARCHAR", "TIME"))
    }
}

/// A point in time, stored as microseconds since the Unix epoch (UTC).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    micros: i64,
}

impl Timestamp {
    pub const fn from_micros(micros: i64) -> Timestamp {
        Timestamp { micros }
    }

    pub const fn micros(self) -> i64 {
        self.micros
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.micros)
    }

    pub fn to_naive(self) -> Option<NaiveDateTime> {
        self.to_datetime().map(|dt| dt.naive_utc())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Timestamp {
        Timestamp::from_micros(dt.timestamp_micros())
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(dt: NaiveDateTime) -> Timestamp {
        Timestamp::from(dt.and_utc())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.micros.div_euclid(MICROS_PER_DAY);
        let rest = self.micros.rem_euclid(MICROS_PER_DAY);
        match i32::try_from(days) {
            Ok(days) => write!(f, "{} ", Date::from_days(days))?,
            Err(_) => return write!(f, "{} microseconds", self.micros),
        }
        write_clock(f, rest)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> DbResult<Timestamp> {
        let s = s.trim();
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(Timestamp::from)
            .ok_or_else(|| Error::mismatch("VARCHAR", "TIMESTAMP"))
    }
}

/// A calendar interval.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, micros: i64) -> Interval {
        Interval {
            months,
            days,
            micros,
        }
    }

    pub(crate) fn pack(self) -> u128 {
        (u128::from(self.months as u32) << 96)
            | (u128::from(self.days as u32) << 64)
            | u128::from(self.micros as u64)
    }

    pub(crate) fn unpack(packed: u128) -> Interval {
        Interval {
            months: (packed >> 96) as u32 as i32,
            days: (packed >> 64) as u32 as i32,
            micros: packed as u64 as i64,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn unit(f: &mut fmt::Formatter<'_>, n: i32, name: &str, first: &mut bool) -> fmt::Result {
            if n == 0 {
                return Ok(());
            }
            if !*first {
                f.write_str(" ")?;
            }
            *first = false;
            let plural = if n.abs() == 1 { "" } else { "s" };
            write!(f, "{n} {name}{plural}")
        }

        let mut first = true;
        unit(f, self.months / 12, "year", &mut first)?;
        unit(f, self.months % 12, "month", &mut first)?;
        unit(f, self.days, "day", &mut first)?;
        if self.micros != 0 || first {
            if !first {
                f.write_str(" ")?;
            }
            if self.micros < 0 {
                f.write_str("-")?;
            }
            write_clock(f, self.micros.unsigned_abs().min(i64::MAX as u64) as i64)?;
        }
        Ok(())
    }
}

/// A fixed-point decimal: `value / 10^scale`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    value: i128,
    scale: u8,
}

impl Decimal {
    pub const fn new(value: i128, scale: u8) -> Decimal {
        Decimal { value, scale }
    }

    /// The unscaled integer.
    pub const fn value(self) -> i128 {
        self.value
    }

    pub const fn scale(self) -> u8 {
        self.scale
    }

    pub fn to_f64(self) -> f64 {
        self.value as f64 / 10f64.powi(i32::from(self.scale))
    }

    /// Returns the integral value when there is no fractional part.
    pub fn to_i128(self) -> Option<i128> {
        let divisor = 10i128.checked_pow(u32::from(self.scale))?;
        (self.value % divisor == 0).then(|| self.value / divisor)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.value.unsigned_abs().to_string();
        let scale = usize::from(self.scale);
        if self.value < 0 {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{int}.{frac}")
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> DbResult<Decimal> {
        let err = || Error::mismatch("VARCHAR", "DECIMAL");
        let s = s.trim();
        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let scale = u8::try_from(frac.len()).map_err(|_| err())?;
        let magnitude: i128 = format!("{int}{frac}").parse().map_err(|_| err())?;
        let value = if negative { -magnitude } else { magnitude };
        Ok(Decimal::new(value, scale))
    }
}

/// Writes `HH:MM:SS[.ffffff]`, trimming trailing zeros of the fraction.
fn write_clock(f: &mut fmt::Formatter<'_>, micros: i64) -> fmt::Result {
    let secs = micros / MICROS_PER_SEC;
    let frac = micros % MICROS_PER_SEC;
    write!(f, "{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)?;
    if frac != 0 {
        let frac = format!("{frac:06}");
        write!(f, ".{}", frac.trim_end_matches('0'))?;
    }
    Ok(())
}

macro_rules! string_serde {
    ($ty:ty, $token:expr, $payload:ty, $to:expr, $from:expr, $expecting:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.collect_str(self)
                } else {
                    #[allow(clippy::redundant_closure_call)]
                    let payload: $payload = ($to)(self);
                    serializer.serialize_newtype_struct($token, &payload)
                }
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct Visitor;

                impl<'de> de::Visitor<'de> for Visitor {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$ty, E> {
                        v.parse().map_err(E::custom)
                    }

                    fn visit_newtype_struct<D: Deserializer<'de>>(
                        self,
                        deserializer: D,
                    ) -> Result<$ty, D::Error> {
                        let payload = <$payload>::deserialize(deserializer)?;
                        #[allow(clippy::redundant_closure_call)]
                        ($from)(payload).map_err(de::Error::custom)
                    }
                }

                if deserializer.is_human_readable() {
                    deserializer.deserialize_str(Visitor)
                } else {
                    deserializer.deserialize_newtype_struct($token, Visitor)
                }
            }
        }
    };
}

string_serde!(
    Date,
    DATE_TOKEN,
    i32,
    |d: &Date| d.days,
    |days: i32| DbResult::<Date>::Ok(Date::from_days(days)),
    "a date"
);
string_serde!(
    Time,
    TIME_TOKEN,
    i64,
    |t: &Time| t.micros,
    |micros: i64| DbResult::<Time>::Ok(Time::from_micros(micros)),
    "a time"
);
string_serde!(
    Timestamp,
    TIMESTAMP_TOKEN,
    i64,
    |t: &Timestamp| t.micros,
    |micros: i64| DbResult::<Timestamp>::Ok(Timestamp::from_micros(micros)),
    "a timestamp"
);
string_serde!(
    Decimal,
    DECIMAL_TOKEN,
    String,
    |d: &Decimal| d.to_string(),
    |s: String| s.parse::<Decimal>(),
    "a decimal"
);

#[derive(Serialize, Deserialize)]
struct IntervalParts {
    months: i32,
    days: i32,
    micros: i64,
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            IntervalParts {
                months: self.months,
                days: self.days,
                micros: self.micros,
            }
            .serialize(serializer)
        } else {
            serializer.serialize_newtype_struct(INTERVAL_TOKEN, &self.pack())
        }
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Interval;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an interval")
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<Interval, D::Error> {
                u128::deserialize(deserializer).map(Interval::unpack)
            }
        }

        if deserializer.is_human_readable() {
            let parts = IntervalParts::deserialize(deserializer)?;
            Ok(Interval::new(parts.months, parts.days, parts.micros))
        } else {
            deserializer.deserialize_newtype_struct(INTERVAL_TOKEN, Visitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date() {
        assert_eq!(Date::from_days(0).to_string(), "1970-01-01");
        assert_eq!(Date::from_days(-1).to_string(), "1969-12-31");
        let date: Date = "2024-02-29".parse().unwrap();
        assert_eq!(date.to_string(), "2024-02-29");
        assert_eq!(date.to_naive(), NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn test_time() {
        assert_eq!(Time::from_micros(0).to_string(), "00:00:00");
        assert_eq!(Time::from_micros(45_296_500_000).to_string(), "12:34:56.5");
        let time: Time = "12:34:56.000123".parse().unwrap();
        assert_eq!(time.micros(), 45_296_000_123);
    }

    #[test]
    fn test_timestamp() {
        let ts: Timestamp = "2001-02-03 04:05:06.7".parse().unwrap();
        assert_eq!(ts.to_string(), "2001-02-03 04:05:06.7");
        assert_eq!(Timestamp::from_micros(-1).to_string(), "1969-12-31 23:59:59.999999");
    }

    #[test]
    fn test_interval() {
        assert_eq!(Interval::new(14, 3, 0).to_string(), "1 year 2 months 3 days");
        assert_eq!(Interval::new(0, 1, 3_600_000_000).to_string(), "1 day 01:00:00");
        assert_eq!(Interval::default().to_string(), "00:00:00");

        let interval = Interval::new(-5, 7, -42);
        assert_eq!(Interval::unpack(interval.pack()), interval);
    }

    #[test]
    fn test_decimal() {
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(7, 0).to_string(), "7");
        assert_eq!("-0.005".parse::<Decimal>().unwrap(), Decimal::new(-5, 3));
        assert_eq!(Decimal::new(1200, 2).to_i128(), Some(12));
        assert_eq!(Decimal::new(1201, 2).to_i128(), None);
        assert!("1.2.3".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_human_readable_serde() {
        let date = Date::from_days(19_000);
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"2022-01-08\"");
        assert_eq!(serde_json::from_str::<Date>(&json).unwrap(), date);
    }
}
