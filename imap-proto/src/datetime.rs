//! IMAP date/date-time parsing: `dd-Mon-yyyy` (SEARCH `BEFORE`/`ON`/`SINCE`
//! and friends) and the full `INTERNALDATE` quoted-string format.

use chrono::{NaiveDate, NaiveDateTime};
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while_m_n};
use nom::character::complete::{digit1, one_of};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::sequence::tuple;
use nom::IResult;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("malformed date: {0}")]
    Malformed(String),
}

fn month(input: &str) -> IResult<&str, u32> {
    alt((
        map(tag("Jan"), |_| 1),
        map(tag("Feb"), |_| 2),
        map(tag("Mar"), |_| 3),
        map(tag("Apr"), |_| 4),
        map(tag("May"), |_| 5),
        map(tag("Jun"), |_| 6),
        map(tag("Jul"), |_| 7),
        map(tag("Aug"), |_| 8),
        map(tag("Sep"), |_| 9),
        map(tag("Oct"), |_| 10),
        map(tag("Nov"), |_| 11),
        map(tag("Dec"), |_| 12),
    ))(input)
}

fn day(input: &str) -> IResult<&str, u32> {
    alt((
        map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_digit()), |s: &str| s.parse()),
        map_res(
            nom::sequence::preceded(opt(tag(" ")), take(1usize)),
            |s: &str| s.parse::<u32>(),
        ),
    ))(input)
}

fn year4(input: &str) -> IResult<&str, i32> {
    map_res(take_while_m_n(4, 4, |c: char| c.is_ascii_digit()), |s: &str| s.parse())(input)
}

/// `dd-Mon-yyyy`, e.g. `"1-Jan-2024"` or `"01-Jan-2024"`.
pub fn parse_date(input: &str) -> Result<NaiveDate, DateError> {
    all_consuming(tuple((day, tag("-"), month, tag("-"), year4)))(input)
        .map(|(_, (d, _, m, _, y))| (d, m, y))
        .map_err(|_| DateError::Malformed(input.to_string()))
        .and_then(|(d, m, y)| {
            NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| DateError::Malformed(input.to_string()))
        })
}

fn two_digit(input: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_digit()), |s: &str| s.parse())(input)
}

fn sign(input: &str) -> IResult<&str, i32> {
    map(one_of("+-"), |c| if c == '+' { 1 } else { -1 })(input)
}

/// `"dd-Mon-yyyy HH:MM:SS +zzzz"`, the `INTERNALDATE` / `APPEND` date-time
/// string (quotes already stripped by the tokenizer).
pub fn parse_internal_date(input: &str) -> Result<(NaiveDateTime, i32), DateError> {
    let (rest, date) = nom::sequence::terminated(
        tuple((day, tag("-"), month, tag("-"), year4)),
        tag(" "),
    )(input)
    .map_err(|_| DateError::Malformed(input.to_string()))?;
    let (_, (hour, _, min, _, sec, _, sgn, tzh, tzm)) = all_consuming(tuple((
        two_digit,
        tag(":"),
        two_digit,
        tag(":"),
        two_digit,
        tag(" "),
        sign,
        two_digit,
        two_digit,
    )))(rest)
    .map_err(|_| DateError::Malformed(input.to_string()))?;

    let (d, _, m, _, y) = date;
    let naive_date = NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| DateError::Malformed(input.to_string()))?;
    let naive_time = chrono::NaiveTime::from_hms_opt(hour, min, sec)
        .ok_or_else(|| DateError::Malformed(input.to_string()))?;
    let offset_minutes = sgn * (tzh as i32 * 60 + tzm as i32);
    Ok((NaiveDateTime::new(naive_date, naive_time), offset_minutes))
}

/// Format a date the way IMAP wants it on the wire (the immediate
/// predecessor of [`parse_date`]), e.g. for `STATUS`/`FETCH INTERNALDATE`.
pub fn format_date(date: &NaiveDate) -> String {
    const NAMES: [&str; 12] =
        ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
    use chrono::Datelike;
    format!("{:02}-{}-{:04}", date.day(), NAMES[(date.month() - 1) as usize], date.year())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zero_padded_date() {
        let d = parse_date("01-Jan-2024").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn parses_single_digit_day_with_leading_space() {
        let d = parse_date(" 1-Jan-2024").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("not-a-date").is_err());
    }

    #[test]
    fn parses_internal_date_with_offset() {
        let (dt, offset) = parse_internal_date("01-Jan-2024 13:45:02 +0100").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(offset, 60);
    }

    #[test]
    fn parses_internal_date_with_negative_offset() {
        let (_, offset) = parse_internal_date("01-Jan-2024 13:45:02 -0530").unwrap();
        assert_eq!(offset, -330);
    }

    #[test]
    fn format_date_roundtrips() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(format_date(&d), "07-Mar-2024");
        assert_eq!(parse_date(&format_date(&d)).unwrap(), d);
    }
}
