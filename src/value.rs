//! The tagged value model (spec §3) and its two wire encodings (spec §4.4).
//!
//! Grounded in `zero-mysql`'s `src/value.rs` (binary value dispatch by
//! `ColumnType`, the `Timestamp{4,7,11}`/`Time{8,12}` zero-copy structs),
//! with the Open Question from SPEC_FULL.md §3 resolved towards an **owned**
//! `Value` rather than the teacher's `Value<'a>`: sans-I/O algorithms must
//! survive a `resume()` call whose buffer is cleared and refilled in
//! between, so a value can never borrow from it.

use crate::codec::Cursor;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};

/// `date` = (year, month, day). MySQL "zero" dates (`0000-00-00`) and
/// out-of-calendar values (`0000-02-30`) are preserved as-is; calendar
/// validation is left to the caller per spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// `datetime` = `date` + (hour, minute, second, microsecond).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

/// A signed microsecond interval, bounded to ±839h per spec §3/§4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub is_negative: bool,
    pub days: u32,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

const TIME_MAX_HOURS: i64 = 839;

impl Time {
    /// Total microseconds represented by this interval, clamped to
    /// ±839h as required by spec §4.4's binary TIME encoding.
    pub fn total_microseconds(&self) -> i64 {
        let magnitude = (self.days as i64) * 24 * 3_600_000_000
            + (self.hour as i64) * 3_600_000_000
            + (self.minute as i64) * 60_000_000
            + (self.second as i64) * 1_000_000
            + self.microsecond as i64;
        let clamp = TIME_MAX_HOURS * 3_600_000_000;
        let magnitude = magnitude.min(clamp);
        if self.is_negative { -magnitude } else { magnitude }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
    Date(Date),
    DateTime(DateTime),
    Time(Time),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Deserializes one binary-protocol value, dispatching on the column's
    /// protocol type and unsigned flag, per spec §4.4's encoding table.
    pub fn parse_binary(column_type: ColumnType, flags: ColumnFlags, cursor: &mut Cursor<'_>) -> Result<Self> {
        let unsigned = flags.contains(ColumnFlags::UNSIGNED_FLAG);
        use ColumnType::*;
        match column_type {
            MYSQL_TYPE_NULL => Ok(Value::Null),
            MYSQL_TYPE_TINY => {
                let v = cursor.read_int_1()?;
                Ok(if unsigned {
                    Value::UInt64(v as u64)
                } else {
                    Value::Int64(v as i8 as i64)
                })
            }
            MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => {
                let v = cursor.read_int_2()?;
                Ok(if unsigned {
                    Value::UInt64(v as u64)
                } else {
                    Value::Int64(v as i16 as i64)
                })
            }
            MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG => {
                let v = cursor.read_int_4()?;
                Ok(if unsigned {
                    Value::UInt64(v as u64)
                } else {
                    Value::Int64(v as i32 as i64)
                })
            }
            MYSQL_TYPE_LONGLONG => {
                let v = cursor.read_int_8()?;
                Ok(if unsigned { Value::UInt64(v) } else { Value::Int64(v as i64) })
            }
            MYSQL_TYPE_FLOAT => {
                let v = cursor.read_int_4()?;
                Ok(Value::Float32(f32::from_bits(v)))
            }
            MYSQL_TYPE_DOUBLE => {
                let v = cursor.read_int_8()?;
                Ok(Value::Float64(f64::from_bits(v)))
            }
            MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => Ok(Value::Date(parse_binary_date(cursor)?)),
            MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_TIMESTAMP2 | MYSQL_TYPE_DATETIME2 => {
                Ok(Value::DateTime(parse_binary_datetime(cursor)?))
            }
            MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => Ok(Value::Time(parse_binary_time(cursor)?)),
            MYSQL_TYPE_VARCHAR
            | MYSQL_TYPE_VAR_STRING
            | MYSQL_TYPE_STRING
            | MYSQL_TYPE_BLOB
            | MYSQL_TYPE_TINY_BLOB
            | MYSQL_TYPE_MEDIUM_BLOB
            | MYSQL_TYPE_LONG_BLOB
            | MYSQL_TYPE_GEOMETRY
            | MYSQL_TYPE_JSON
            | MYSQL_TYPE_DECIMAL
            | MYSQL_TYPE_NEWDECIMAL
            | MYSQL_TYPE_ENUM
            | MYSQL_TYPE_SET
            | MYSQL_TYPE_BIT
            | MYSQL_TYPE_TYPED_ARRAY => Ok(Value::Bytes(cursor.read_string_lenenc()?.to_vec())),
        }
    }

    /// Deserializes one text-protocol value: the raw ASCII field bytes plus
    /// the column's protocol type, per spec §4.4.
    pub fn parse_text(column_type: ColumnType, flags: ColumnFlags, field: &[u8]) -> Result<Self> {
        let text = simdutf8::basic::from_utf8(field)
            .map_err(|_| Error::ProtocolValueError("non-UTF8 text field".into()))?;
        let unsigned = flags.contains(ColumnFlags::UNSIGNED_FLAG);
        use ColumnType::*;
        match column_type {
            MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG | MYSQL_TYPE_LONGLONG
            | MYSQL_TYPE_YEAR => {
                if unsigned {
                    text.parse::<u64>()
                        .map(Value::UInt64)
                        .map_err(|_| Error::ProtocolValueError(format!("invalid unsigned integer: {text:?}")))
                } else {
                    text.parse::<i64>()
                        .map(Value::Int64)
                        .map_err(|_| Error::ProtocolValueError(format!("invalid integer: {text:?}")))
                }
            }
            MYSQL_TYPE_FLOAT => text
                .parse::<f32>()
                .map(Value::Float32)
                .map_err(|_| Error::ProtocolValueError(format!("invalid float: {text:?}"))),
            MYSQL_TYPE_DOUBLE => text
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| Error::ProtocolValueError(format!("invalid double: {text:?}"))),
            MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => parse_text_date_only(text).map(Value::Date),
            MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP2 => {
                parse_text_datetime(text).map(Value::DateTime)
            }
            MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => parse_text_time(text).map(Value::Time),
            _ => Ok(Value::Bytes(field.to_vec())),
        }
    }
}

fn parse_binary_datetime(cursor: &mut Cursor<'_>) -> Result<DateTime> {
    let len = cursor.read_int_1()?;
    let mut dt = DateTime::default();
    match len {
        0 => {}
        4 | 7 | 11 => {
            dt.year = cursor.read_int_2()?;
            dt.month = cursor.read_int_1()?;
            dt.day = cursor.read_int_1()?;
            if len >= 7 {
                dt.hour = cursor.read_int_1()?;
                dt.minute = cursor.read_int_1()?;
                dt.second = cursor.read_int_1()?;
            }
            if len == 11 {
                dt.microsecond = cursor.read_int_4()?;
            }
        }
        other => return Err(Error::ProtocolValueError(format!("invalid date/datetime length: {other}"))),
    }
    Ok(dt)
}

/// Deserializes a length-prefixed binary DATE value: 0 (zero date) or 4
/// bytes (year u16, month u8, day u8). DATE never carries a time-of-day
/// component on the wire, unlike DATETIME/TIMESTAMP's 7/11-byte forms.
fn parse_binary_date(cursor: &mut Cursor<'_>) -> Result<Date> {
    let len = cursor.read_int_1()?;
    let mut d = Date::default();
    match len {
        0 => {}
        4 => {
            d.year = cursor.read_int_2()?;
            d.month = cursor.read_int_1()?;
            d.day = cursor.read_int_1()?;
        }
        other => return Err(Error::ProtocolValueError(format!("invalid date length: {other}"))),
    }
    Ok(d)
}

fn parse_binary_time(cursor: &mut Cursor<'_>) -> Result<Time> {
    let len = cursor.read_int_1()?;
    let mut t = Time::default();
    match len {
        0 => {}
        8 | 12 => {
            t.is_negative = cursor.read_int_1()? != 0;
            t.days = cursor.read_int_4()?;
            t.hour = cursor.read_int_1()?;
            t.minute = cursor.read_int_1()?;
            t.second = cursor.read_int_1()?;
            if len == 12 {
                t.microsecond = cursor.read_int_4()?;
            }
        }
        other => return Err(Error::ProtocolValueError(format!("invalid time length: {other}"))),
    }
    Ok(clamp_time(t))
}

fn clamp_time(mut t: Time) -> Time {
    let clamp_us = TIME_MAX_HOURS * 3_600_000_000;
    if t.total_microseconds().unsigned_abs() as i64 > clamp_us {
        t.days = (TIME_MAX_HOURS / 24) as u32;
        t.hour = (TIME_MAX_HOURS % 24) as u8;
        t.minute = 0;
        t.second = 0;
        t.microsecond = 0;
    }
    t
}

fn parse_text_date(text: &str) -> Result<DateTime> {
    let bad = || Error::ProtocolValueError(format!("invalid date: {text:?}"));
    let mut parts = text.splitn(3, '-');
    let year = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let month = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let day = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    Ok(DateTime {
        year,
        month,
        day,
        ..Default::default()
    })
}

/// Parses a `YYYY-MM-DD` text-protocol field into a date-only [`Date`],
/// for columns whose protocol type is DATE/NEWDATE (as opposed to
/// [`parse_text_date`], which builds a zeroed-time [`DateTime`] as a
/// building block for [`parse_text_datetime`]).
fn parse_text_date_only(text: &str) -> Result<Date> {
    let dt = parse_text_date(text)?;
    Ok(Date {
        year: dt.year,
        month: dt.month,
        day: dt.day,
    })
}

fn parse_text_datetime(text: &str) -> Result<DateTime> {
    let bad = || Error::ProtocolValueError(format!("invalid datetime: {text:?}"));
    let (date_part, time_part) = text.split_once(' ').ok_or_else(bad)?;
    let mut dt = parse_text_date(date_part)?;
    let (hms, micros) = match time_part.split_once('.') {
        Some((hms, frac)) => (hms, parse_fraction(frac)?),
        None => (time_part, 0),
    };
    let mut parts = hms.splitn(3, ':');
    dt.hour = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    dt.minute = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    dt.second = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    dt.microsecond = micros;
    Ok(dt)
}

fn parse_text_time(text: &str) -> Result<Time> {
    let bad = || Error::ProtocolValueError(format!("invalid time: {text:?}"));
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (hms, micros) = match rest.split_once('.') {
        Some((hms, frac)) => (hms, parse_fraction(frac)?),
        None => (rest, 0),
    };
    let mut parts = hms.splitn(3, ':');
    let hours_total: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minute = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let second = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let t = Time {
        is_negative: negative,
        days: hours_total / 24,
        hour: (hours_total % 24) as u8,
        minute,
        second,
        microsecond: micros,
    };
    Ok(clamp_time(t))
}

fn parse_fraction(frac: &str) -> Result<u32> {
    let bad = || Error::ProtocolValueError(format!("invalid fractional seconds: {frac:?}"));
    let mut digits = frac.to_string();
    while digits.len() < 6 {
        digits.push('0');
    }
    digits.truncate(6);
    digits.parse().map_err(|_| bad())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_signed_and_unsigned_tiny_round_trip() {
        let mut cursor = Cursor::new(&[0xff]);
        let v = Value::parse_binary(ColumnType::MYSQL_TYPE_TINY, ColumnFlags::empty(), &mut cursor).unwrap();
        assert_eq!(v, Value::Int64(-1));

        let mut cursor = Cursor::new(&[0xff]);
        let v = Value::parse_binary(ColumnType::MYSQL_TYPE_TINY, ColumnFlags::UNSIGNED_FLAG, &mut cursor).unwrap();
        assert_eq!(v, Value::UInt64(255));
    }

    #[test]
    fn binary_datetime_zero_length_is_zero_value() {
        let mut cursor = Cursor::new(&[0x00]);
        let v = Value::parse_binary(ColumnType::MYSQL_TYPE_DATETIME, ColumnFlags::empty(), &mut cursor).unwrap();
        assert_eq!(v, Value::DateTime(DateTime::default()));
    }

    #[test]
    fn binary_datetime_11_byte_form_round_trips() {
        let bytes = [11u8, 0xe6, 0x07, 1, 2, 3, 4, 5, 6, 0, 0, 0];
        let mut cursor = Cursor::new(&bytes);
        let v = Value::parse_binary(ColumnType::MYSQL_TYPE_DATETIME, ColumnFlags::empty(), &mut cursor).unwrap();
        assert_eq!(
            v,
            Value::DateTime(DateTime {
                year: 2022,
                month: 1,
                day: 2,
                hour: 3,
                minute: 4,
                second: 5,
                microsecond: 6,
            })
        );
    }

    #[test]
    fn binary_time_clamped_to_839_hours() {
        let bytes = [8u8, 0, 0xff, 0xff, 0, 0, 23, 59, 59];
        let mut cursor = Cursor::new(&bytes);
        let v = Value::parse_binary(ColumnType::MYSQL_TYPE_TIME, ColumnFlags::empty(), &mut cursor).unwrap();
        let Value::Time(t) = v else { panic!("expected Time") };
        assert_eq!(t.total_microseconds().abs(), 839 * 3_600_000_000);
    }

    #[test]
    fn text_zero_date_is_preserved_as_is() {
        let v = Value::parse_text(ColumnType::MYSQL_TYPE_DATE, ColumnFlags::empty(), b"0000-00-00").unwrap();
        assert_eq!(v, Value::Date(Date { year: 0, month: 0, day: 0 }));
    }

    #[test]
    fn binary_date_4_byte_form_yields_date_variant() {
        let bytes = [4u8, 0xe6, 0x07, 1, 2];
        let mut cursor = Cursor::new(&bytes);
        let v = Value::parse_binary(ColumnType::MYSQL_TYPE_DATE, ColumnFlags::empty(), &mut cursor).unwrap();
        assert_eq!(v, Value::Date(Date { year: 2022, month: 1, day: 2 }));
    }

    #[test]
    fn text_datetime_with_fractional_seconds() {
        let v = Value::parse_text(
            ColumnType::MYSQL_TYPE_DATETIME,
            ColumnFlags::empty(),
            b"2024-01-02 03:04:05.000123",
        )
        .unwrap();
        assert_eq!(
            v,
            Value::DateTime(DateTime {
                year: 2024,
                month: 1,
                day: 2,
                hour: 3,
                minute: 4,
                second: 5,
                microsecond: 123,
            })
        );
    }

    #[test]
    fn text_negative_time_interval() {
        let v = Value::parse_text(ColumnType::MYSQL_TYPE_TIME, ColumnFlags::empty(), b"-10:20:30").unwrap();
        let Value::Time(t) = v else { panic!("expected Time") };
        assert!(t.is_negative);
        assert_eq!(t.hour, 10);
        assert_eq!(t.minute, 20);
        assert_eq!(t.second, 30);
    }

    #[test]
    fn text_parse_failure_is_protocol_value_error() {
        let err = Value::parse_text(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty(), b"not-a-number").unwrap_err();
        assert!(matches!(err, Error::ProtocolValueError(_)));
    }
}
