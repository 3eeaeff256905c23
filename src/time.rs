//! # Timestamps and time formats
//!
//! [`Timestamp`] is an absolute instant with millisecond resolution, backed by a
//! [`hifitime::Epoch`] on the TAI scale (leap seconds are ignored, every day has 86 400 s).
//!
//! Text conversion goes through a [`TimeFormat`], which holds a *read* and a *print*
//! pattern. Patterns are made of width-prefixed tokens:
//!
//! | token | field | widths |
//! |-------|-------|--------|
//! | `nD` | day of month | 1, 2 |
//! | `nM` | month | 1, 2 |
//! | `nY` | year (`2Y` adds 2000) | 2, 4 |
//! | `nh` | hour | 1, 2 |
//! | `nm` | minute | 1, 2 |
//! | `ns` | second | 1, 2 |
//! | `nz` | milliseconds, truncated to `n` digits | 1, 2, 3 |
//! | `n*` | skip `n` characters | any |
//!
//! Any other character is a literal. Example: `4Y-2M-2DT2h:2m:2sZ`.
use std::fmt;
use std::ops::{Add, Sub};

use hifitime::{Duration, Epoch};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::Second;
use crate::track_errors::TrackError;

/// Default read and print pattern.
pub const DEFAULT_TIME_FORMAT: &str = "2D/2M/4Y 2h:2m:2s.3z";

/// An absolute instant (calendar date and time of day, millisecond resolution).
///
/// Ordering and equality are those of the underlying TAI epoch. Use
/// [`Timestamp::approx_eq`] to compare instants rebuilt from floating-point seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    epoch: Epoch,
}

/// Broken-down calendar representation of a [`Timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millis: u16,
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn unix_epoch() -> Epoch {
    Epoch::from_gregorian_tai(1970, 1, 1, 0, 0, 0, 0)
}

impl Timestamp {
    /// Build a timestamp from calendar fields.
    ///
    /// Return
    /// ------
    /// * `Err(TrackError::TimeParse)` when a field is out of its calendar range
    ///   (e.g. February 30th, hour 24).
    pub fn new(
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        millis: u16,
    ) -> Result<Self, TrackError> {
        if !(1..=12).contains(&month)
            || day == 0
            || day > days_in_month(year, month)
            || hour > 23
            || minute > 59
            || second > 59
            || millis > 999
        {
            return Err(TrackError::TimeParse(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{millis:03} is not a valid date"
            )));
        }
        Ok(Timestamp {
            epoch: Epoch::from_gregorian_tai(
                year,
                month,
                day,
                hour,
                minute,
                second,
                millis as u32 * 1_000_000,
            ),
        })
    }

    /// Timestamp `seconds` after 1970-01-01 00:00:00.
    pub fn from_unix_seconds(seconds: Second) -> Self {
        Timestamp {
            epoch: unix_epoch() + Duration::from_seconds(seconds),
        }
    }

    /// Seconds elapsed since 1970-01-01 00:00:00 (no leap seconds).
    pub fn unix_seconds(&self) -> Second {
        (self.epoch - unix_epoch()).to_seconds()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Whether the two instants are less than `tolerance` seconds apart.
    pub fn approx_eq(&self, other: &Timestamp, tolerance: Second) -> bool {
        (*self - *other).abs() < tolerance
    }

    /// Calendar decomposition, milliseconds rounded to the nearest unit.
    pub fn fields(&self) -> CalendarFields {
        // round to the millisecond before splitting so that 59.9999996 s prints as the next second
        let rounded = Timestamp::from_unix_seconds((self.unix_seconds() * 1e3).round() / 1e3);
        let (year, month, day, hour, minute, second, nanos) = rounded.epoch.to_gregorian_tai();
        CalendarFields {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millis: ((nanos as f64 / 1e6).round() as u16).min(999),
        }
    }

    pub fn year(&self) -> i32 {
        self.fields().year
    }

    pub fn month(&self) -> u8 {
        self.fields().month
    }

    pub fn day(&self) -> u8 {
        self.fields().day
    }

    pub fn hour(&self) -> u8 {
        self.fields().hour
    }

    pub fn minute(&self) -> u8 {
        self.fields().minute
    }

    pub fn second(&self) -> u8 {
        self.fields().second
    }

    pub fn millis(&self) -> u16 {
        self.fields().millis
    }

    /// Parse with an explicit format (see [`TimeFormat::parse`]).
    pub fn parse(text: &str, format: &TimeFormat) -> Result<Self, TrackError> {
        format.parse(text)
    }

    /// Print with an explicit format (see [`TimeFormat::format`]).
    pub fn format(&self, format: &TimeFormat) -> String {
        format.format(self)
    }
}

impl Add<Second> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Second) -> Timestamp {
        Timestamp {
            epoch: self.epoch + Duration::from_seconds(rhs),
        }
    }
}

impl Sub<Second> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Second) -> Timestamp {
        self + (-rhs)
    }
}

/// Elapsed seconds between two timestamps.
impl Sub for Timestamp {
    type Output = Second;

    fn sub(self, rhs: Timestamp) -> Second {
        (self.epoch - rhs.epoch).to_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", TimeFormat::default().format(self))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.unix_seconds())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Ok(Timestamp::from_unix_seconds(seconds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Day,
    Month,
    Year,
    Hour,
    Minute,
    Second,
    Millis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field { field: Field, width: usize },
    Skip(usize),
    Literal(char),
}

/// A compiled time pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePattern {
    source: String,
    tokens: Vec<Token>,
}

impl TimePattern {
    /// Compile a pattern string into a token plan.
    ///
    /// Return
    /// ------
    /// * `Err(TrackError::TimeFormat)` for an unsupported width (e.g. `3D`, `4z`, `1Y`).
    pub fn compile(pattern: &str) -> Result<Self, TrackError> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            let field = next.and_then(|n| match n {
                'D' => Some(Some(Field::Day)),
                'M' => Some(Some(Field::Month)),
                'Y' => Some(Some(Field::Year)),
                'h' => Some(Some(Field::Hour)),
                'm' => Some(Some(Field::Minute)),
                's' => Some(Some(Field::Second)),
                'z' => Some(Some(Field::Millis)),
                '*' => Some(None),
                _ => None,
            });
            match (c.to_digit(10), field) {
                (Some(width), Some(field)) => {
                    let width = width as usize;
                    match field {
                        None => tokens.push(Token::Skip(width)),
                        Some(field) => {
                            let valid = match field {
                                Field::Year => width == 2 || width == 4,
                                Field::Millis => (1..=3).contains(&width),
                                _ => width == 1 || width == 2,
                            };
                            if !valid {
                                return Err(TrackError::TimeFormat(format!(
                                    "unsupported width {width} for '{}' in \"{pattern}\"",
                                    chars[i + 1]
                                )));
                            }
                            tokens.push(Token::Field { field, width });
                        }
                    }
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }
        Ok(TimePattern {
            source: pattern.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Read and print patterns used to convert timestamps from and to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormat {
    read: TimePattern,
    print: TimePattern,
}

impl Default for TimeFormat {
    fn default() -> Self {
        let pattern = TimePattern {
            source: DEFAULT_TIME_FORMAT.to_string(),
            tokens: vec![
                Token::Field { field: Field::Day, width: 2 },
                Token::Literal('/'),
                Token::Field { field: Field::Month, width: 2 },
                Token::Literal('/'),
                Token::Field { field: Field::Year, width: 4 },
                Token::Literal(' '),
                Token::Field { field: Field::Hour, width: 2 },
                Token::Literal(':'),
                Token::Field { field: Field::Minute, width: 2 },
                Token::Literal(':'),
                Token::Field { field: Field::Second, width: 2 },
                Token::Literal('.'),
                Token::Field { field: Field::Millis, width: 3 },
            ],
        };
        TimeFormat {
            read: pattern.clone(),
            print: pattern,
        }
    }
}

impl TimeFormat {
    /// Same pattern for reading and printing.
    pub fn new(pattern: &str) -> Result<Self, TrackError> {
        let compiled = TimePattern::compile(pattern)?;
        Ok(TimeFormat {
            read: compiled.clone(),
            print: compiled,
        })
    }

    pub fn with_read(mut self, pattern: &str) -> Result<Self, TrackError> {
        self.read = TimePattern::compile(pattern)?;
        Ok(self)
    }

    pub fn with_print(mut self, pattern: &str) -> Result<Self, TrackError> {
        self.print = TimePattern::compile(pattern)?;
        Ok(self)
    }

    pub fn read_pattern(&self) -> &str {
        self.read.as_str()
    }

    pub fn print_pattern(&self) -> &str {
        self.print.as_str()
    }

    /// Parse `text` with the read pattern.
    ///
    /// Width-1 fields read one or two digits greedily, wider fields read exactly
    /// `width` digits. Fields absent from the pattern default to 1970-01-01 00:00:00.000.
    pub fn parse(&self, text: &str) -> Result<Timestamp, TrackError> {
        let chars: Vec<char> = text.chars().collect();
        let err = |what: &str| {
            TrackError::TimeParse(format!(
                "\"{text}\" does not match \"{}\": {what}",
                self.read.as_str()
            ))
        };

        let mut f = CalendarFields {
            year: 1970,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            millis: 0,
        };
        let mut pos = 0;
        for token in &self.read.tokens {
            match *token {
                Token::Literal(c) => {
                    if chars.get(pos) != Some(&c) {
                        return Err(err(&format!("expected '{c}' at position {pos}")));
                    }
                    pos += 1;
                }
                Token::Skip(n) => {
                    if pos + n > chars.len() {
                        return Err(err("input too short"));
                    }
                    pos += n;
                }
                Token::Field { field, width } => {
                    let max = if width == 1 && field != Field::Millis { 2 } else { width };
                    let digits: String = chars[pos.min(chars.len())..]
                        .iter()
                        .take(max)
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    if digits.is_empty() || (width > 1 && digits.len() != width) {
                        return Err(err(&format!("expected {width} digit(s) at position {pos}")));
                    }
                    pos += digits.len();
                    let value: u32 = digits.parse().map_err(|_| err("invalid number"))?;
                    match field {
                        Field::Day => f.day = value as u8,
                        Field::Month => f.month = value as u8,
                        Field::Year => {
                            f.year = if width == 2 { 2000 + value as i32 } else { value as i32 }
                        }
                        Field::Hour => f.hour = value as u8,
                        Field::Minute => f.minute = value as u8,
                        Field::Second => f.second = value as u8,
                        Field::Millis => f.millis = (value * 10u32.pow(3 - width as u32)) as u16,
                    }
                }
            }
        }
        if pos != chars.len() {
            return Err(err(&format!("trailing characters from position {pos}")));
        }
        Timestamp::new(f.year, f.month, f.day, f.hour, f.minute, f.second, f.millis)
    }

    /// Print `timestamp` with the print pattern. Skip tokens print as spaces.
    pub fn format(&self, timestamp: &Timestamp) -> String {
        let f = timestamp.fields();
        let mut out = String::new();
        for token in &self.print.tokens {
            match *token {
                Token::Literal(c) => out.push(c),
                Token::Skip(n) => out.push_str(&" ".repeat(n)),
                Token::Field { field, width } => {
                    let value = match field {
                        Field::Day => f.day as i64,
                        Field::Month => f.month as i64,
                        Field::Year if width == 2 => f.year.rem_euclid(100) as i64,
                        Field::Year => f.year as i64,
                        Field::Hour => f.hour as i64,
                        Field::Minute => f.minute as i64,
                        Field::Second => f.second as i64,
                        Field::Millis => (f.millis as i64) / 10i64.pow(3 - width as u32),
                    };
                    out.push_str(&format!("{value:0width$}"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod time_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ordering_is_exact_and_transitive() {
        let a = Timestamp::from_unix_seconds(100.0);
        let b = a + 6e-8;
        let c = b + 6e-8;
        assert!(a < b && b < c && a < c);
        assert_ne!(a, b);
        assert!(a.approx_eq(&b, 1e-7));
        assert!(!a.approx_eq(&c, 1e-7));

        let mut ts = vec![c, a, b, a];
        ts.sort();
        assert_eq!(ts, vec![a, a, b, c]);
    }

    #[test]
    fn test_default_round_trip() {
        let fmt = TimeFormat::default();
        let t = fmt.parse("18/01/2019 10:12:51.250").unwrap();
        assert_eq!(t.year(), 2019);
        assert_eq!(t.month(), 1);
        assert_eq!(t.day(), 18);
        assert_eq!(t.hour(), 10);
        assert_eq!(t.minute(), 12);
        assert_eq!(t.second(), 51);
        assert_eq!(t.millis(), 250);
        assert_eq!(t.to_string(), "18/01/2019 10:12:51.250");
    }

    #[test]
    fn test_iso_pattern() {
        let fmt = TimeFormat::new("4Y-2M-2DT2h:2m:2sZ").unwrap();
        let t = fmt.parse("2021-03-04T05:06:07Z").unwrap();
        assert_eq!(fmt.format(&t), "2021-03-04T05:06:07Z");
        assert_eq!(t, Timestamp::new(2021, 3, 4, 5, 6, 7, 0).unwrap());
    }

    #[test]
    fn test_short_widths_and_skip() {
        let fmt = TimeFormat::new("1D/1M/2Y 1h:1m:1s 3*1z").unwrap();
        let t = fmt.parse("4/7/21 9:5:3 abc7").unwrap();
        assert_eq!(t, Timestamp::new(2021, 7, 4, 9, 5, 3, 700).unwrap());

        let greedy = fmt.parse("14/11/21 19:45:33 xyz1").unwrap();
        assert_eq!(greedy.day(), 14);
        assert_eq!(greedy.month(), 11);
        assert_eq!(greedy.millis(), 100);
    }

    #[test]
    fn test_separate_read_and_print() {
        let fmt = TimeFormat::default()
            .with_read("4Y2M2D2h2m2s")
            .unwrap()
            .with_print("2h:2m")
            .unwrap();
        let t = fmt.parse("20240229235900").unwrap();
        assert_eq!(fmt.format(&t), "23:59");
        assert_eq!(fmt.read_pattern(), "4Y2M2D2h2m2s");
    }

    #[test]
    fn test_arithmetic() {
        let t = Timestamp::new(2020, 12, 31, 23, 59, 59, 500).unwrap();
        let u = t + 1.0;
        assert_eq!(u.year(), 2021);
        assert_eq!(u.second(), 0);
        assert_eq!(u.millis(), 500);
        assert_relative_eq!(u - t, 1.0, epsilon = 1e-9);
        assert!(t < u);
        assert_relative_eq!((t - 10.0) - t, -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unix_epoch() {
        let t = Timestamp::new(1970, 1, 2, 0, 0, 0, 0).unwrap();
        assert_relative_eq!(t.unix_seconds(), 86_400.0, epsilon = 1e-9);
        let back = Timestamp::from_unix_seconds(t.unix_seconds());
        assert_eq!(back, t);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            Timestamp::new(2021, 2, 29, 0, 0, 0, 0),
            Err(TrackError::TimeParse(_))
        ));
        assert!(matches!(
            TimeFormat::new("3D/2M"),
            Err(TrackError::TimeFormat(_))
        ));
        assert!(matches!(
            TimeFormat::new("4z"),
            Err(TrackError::TimeFormat(_))
        ));
        let fmt = TimeFormat::default();
        assert!(fmt.parse("18-01-2019 10:12:51.250").is_err());
        assert!(fmt.parse("18/01/2019 10:12:51.250 extra").is_err());
    }
}
