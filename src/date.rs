use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{Error, Result};

/// Parsed form of a `date` keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSpec {
    Single(NaiveDate),
    Range {
        start: NaiveDate,
        end: NaiveDate,
        by: i64,
    },
    List(Vec<NaiveDate>),
}

/// Parse a single date the way the archive accepts it:
/// - "YYYYMMDD" or "YYYY-MM-DD"
/// - integer <= 0 means today + delta days
pub fn parse_date_like(s: &str, now: DateTime<Utc>) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        if n <= 0 {
            return Duration::try_days(n)
                .and_then(|delta| now.date_naive().checked_add_signed(delta))
                .ok_or_else(|| Error::InvalidRequest(format!("relative date out of range: {trimmed}")));
        }
        if trimmed.len() == 8 {
            return NaiveDate::parse_from_str(trimmed, "%Y%m%d")
                .map_err(|_| Error::InvalidRequest(format!("invalid YYYYMMDD date: {trimmed}")));
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| Error::InvalidRequest(format!("unsupported date format: {trimmed}")))
}

impl DateSpec {
    /// Accepts `d`, `d1/to/d2`, `d1/to/d2/by/n` and `d1/d2/...`.
    pub fn parse(v: &str, now: DateTime<Utc>) -> Result<Self> {
        let tokens: Vec<&str> = v.split('/').map(str::trim).filter(|t| !t.is_empty()).collect();

        let is_range = tokens.len() >= 3 && tokens[1].eq_ignore_ascii_case("to");
        if is_range {
            let by = match tokens.len() {
                3 => 1,
                5 if tokens[3].eq_ignore_ascii_case("by") => tokens[4].parse::<i64>().map_err(|_| {
                    Error::InvalidRequest(format!("invalid date range step: {v}"))
                })?,
                _ => return Err(Error::InvalidRequest(format!("invalid date range: {v}"))),
            };
            if by <= 0 {
                return Err(Error::InvalidRequest(format!(
                    "date range step must be >0, got {by}"
                )));
            }
            let start = parse_date_like(tokens[0], now)?;
            let end = parse_date_like(tokens[2], now)?;
            if end < start {
                return Err(Error::InvalidRequest(format!(
                    "date range end {end} < start {start}"
                )));
            }
            return Ok(DateSpec::Range { start, end, by });
        }

        match tokens.as_slice() {
            [] => Err(Error::InvalidRequest("empty date".into())),
            [single] => Ok(DateSpec::Single(parse_date_like(single, now)?)),
            many => {
                let mut out = Vec::with_capacity(many.len());
                for t in many {
                    out.push(parse_date_like(t, now)?);
                }
                Ok(DateSpec::List(out))
            }
        }
    }

    /// Number of dates the keyword selects.
    pub fn days(&self) -> u64 {
        match self {
            DateSpec::Single(_) => 1,
            DateSpec::Range { start, end, by } => {
                let span = (*end - *start).num_days();
                (span / by + 1) as u64
            }
            DateSpec::List(xs) => xs.len() as u64,
        }
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSpec::Single(d) => write!(f, "{d}"),
            DateSpec::Range { start, end, by: 1 } => write!(f, "{start} to {end}"),
            DateSpec::Range { start, end, by } => write!(f, "{start} to {end} every {by} days"),
            DateSpec::List(xs) => write!(f, "{} dates", xs.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn counts_inclusive_ranges() {
        let d = DateSpec::parse("2013-09-01/to/2013-09-30", now()).unwrap();
        assert_eq!(d.days(), 30);

        let d = DateSpec::parse("2015-01-01/to/2017-03-31", now()).unwrap();
        assert_eq!(d.days(), 821);
    }

    #[test]
    fn ranges_with_step() {
        let d = DateSpec::parse("20000101/to/20000108/by/7", now()).unwrap();
        assert_eq!(d.days(), 2);
        assert_eq!(d.to_string(), "2000-01-01 to 2000-01-08 every 7 days");
    }

    #[test]
    fn rejects_reversed_range() {
        assert!(DateSpec::parse("2013-09-30/to/2013-09-01", now()).is_err());
        assert!(DateSpec::parse("2013-09-01/to/2013-09-30/by/0", now()).is_err());
    }

    #[test]
    fn single_list_and_relative_dates() {
        assert_eq!(
            DateSpec::parse("20130901", now()).unwrap(),
            DateSpec::Single(NaiveDate::from_ymd_opt(2013, 9, 1).unwrap())
        );
        assert_eq!(DateSpec::parse("2013-09-01/2013-09-03", now()).unwrap().days(), 2);
        assert_eq!(
            DateSpec::parse("-1", now()).unwrap(),
            DateSpec::Single(NaiveDate::from_ymd_opt(2017, 3, 31).unwrap())
        );
        assert!(DateSpec::parse("yesterday", now()).is_err());
    }

    #[test]
    fn huge_relative_dates_are_rejected() {
        let err = DateSpec::parse("-100000000", now()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(ref m) if m.contains("out of range")));
        assert!(DateSpec::parse("-100000000/to/0", now()).is_err());
        assert!(DateSpec::parse(&i64::MIN.to_string(), now()).is_err());
    }
}
