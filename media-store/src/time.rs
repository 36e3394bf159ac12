// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Time values used for every begin/end/insert-point parameter.
//!
//! A [`Time`] is a signed count of 100-nanosecond ticks. It has a canonical
//! string form `[-]hh:mm:ss[.fffffff]` used in persisted documents.

use std::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
    str::FromStr,
};

use crate::{Error, Result};

/// Number of ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const TICKS_PER_MILLISECOND: i64 = 10_000;
const FRACTION_DIGITS: usize = 7;

/// A point in time or a duration, at 100 ns resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    ticks: i64,
}

impl Time {
    pub const ZERO: Time = Time { ticks: 0 };

    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self {
            ticks: millis * TICKS_PER_MILLISECOND,
        }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self {
            ticks: secs * TICKS_PER_SECOND,
        }
    }

    /// Converts fractional seconds, rounding to the nearest tick.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            ticks: (secs * TICKS_PER_SECOND as f64).round() as i64,
        }
    }

    pub const fn ticks(self) -> i64 {
        self.ticks
    }

    pub fn as_secs_f64(self) -> f64 {
        self.ticks as f64 / TICKS_PER_SECOND as f64
    }

    pub const fn is_negative(self) -> bool {
        self.ticks < 0
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time::from_ticks(self.ticks + rhs.ticks)
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        self.ticks += rhs.ticks;
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time::from_ticks(self.ticks - rhs.ticks)
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Time) {
        self.ticks -= rhs.ticks;
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.ticks < 0 { "-" } else { "" };
        let abs = self.ticks.unsigned_abs();
        let per_second = TICKS_PER_SECOND as u64;
        let total_secs = abs / per_second;
        let fraction = abs % per_second;
        let (hours, minutes, seconds) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
        write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}")?;
        if fraction != 0 {
            let digits = format!("{fraction:0width$}", width = FRACTION_DIGITS);
            write!(f, ".{}", digits.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl FromStr for Time {
    type Err = Error;

    /// Parses the canonical `[-]hh:mm:ss[.fffffff]` form.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Parse(format!("invalid time value \"{s}\""));
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let mut parts = body.split(':');
        let (Some(hours), Some(minutes), Some(seconds), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let hours: u64 = hours.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let (whole, fraction) = match seconds.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (seconds, ""),
        };
        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        if minutes >= 60 || whole >= 60 || fraction.len() > FRACTION_DIGITS {
            return Err(invalid());
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let fraction_ticks: u64 = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<width$}", width = FRACTION_DIGITS)
                .parse()
                .map_err(|_| invalid())?
        };
        let total = hours
            .checked_mul(3600)
            .and_then(|secs| secs.checked_add(minutes * 60 + whole))
            .and_then(|secs| secs.checked_mul(TICKS_PER_SECOND as u64))
            .and_then(|ticks| ticks.checked_add(fraction_ticks))
            .ok_or_else(invalid)?;
        let ticks = i64::try_from(total).map_err(|_| invalid())?;
        Ok(Time::from_ticks(if negative { -ticks } else { ticks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_round_trips() {
        for text in ["00:00:00", "00:00:01.5", "01:02:03.0000001", "-00:00:00.25"] {
            let time: Time = text.parse().unwrap();
            assert_eq!(time.to_string(), text);
        }
    }

    #[test]
    fn parses_to_expected_ticks() {
        assert_eq!("00:00:00.5".parse::<Time>().unwrap(), Time::from_millis(500));
        assert_eq!("00:01:00".parse::<Time>().unwrap(), Time::from_secs(60));
        assert_eq!(
            "-00:00:01".parse::<Time>().unwrap(),
            Time::from_secs(-1)
        );
    }

    #[test]
    fn rejects_malformed_values() {
        for text in ["", "1.5", "00:60:00", "00:00:00.12345678", "aa:00:00", "0:0:0:0"] {
            assert!(text.parse::<Time>().is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn rejects_values_beyond_the_tick_range() {
        for text in [
            "18446744073709551615:00:00",
            "5124095576030431:00:00",
            "256204778:48:05.4775808",
            "-18446744073709551615:59:59.9999999",
        ] {
            assert!(
                matches!(text.parse::<Time>(), Err(Error::Parse(_))),
                "{text} should not parse"
            );
        }
        let max = "256204778:48:05.4775807".parse::<Time>().unwrap();
        assert_eq!(max.ticks(), i64::MAX);
    }

    #[test]
    fn arithmetic_and_ordering() {
        let a = Time::from_millis(250);
        let b = Time::from_millis(750);
        assert_eq!(a + b, Time::from_secs(1));
        assert_eq!(b - a, Time::from_millis(500));
        assert!(a < b);
        assert!((a - b).is_negative());
    }
}
