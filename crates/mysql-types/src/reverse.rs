//! Reverse conversion: MySQL values → CellValue
//!
//! Decoding is driven by the column's [`ColumnKind`] rather than by the
//! shape of the driver value, so the text protocol (everything arrives as
//! bytes) and the binary protocol (typed values) decode identically.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mysql_async::Value;
use rowsync_core::{CellValue, ColumnKind, TableDefinition};
use thiserror::Error;

/// Error during MySQL value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Type mismatch: expected {expected}, got {actual:?}")]
    TypeMismatch { expected: String, actual: Value },
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid date/time value: {0}")]
    InvalidDateTime(String),
    #[error("Row has {actual} values, table '{table}' has {expected} columns")]
    ColumnCount {
        table: String,
        expected: usize,
        actual: usize,
    },
}

/// Decode one value of a column of the given kind.
pub fn decode_value(kind: &ColumnKind, value: Value) -> Result<CellValue, ConversionError> {
    if matches!(value, Value::NULL) {
        return Ok(CellValue::Null);
    }
    match kind {
        ColumnKind::Integer { unsigned: true } => extract_uint(&value).map(CellValue::UInt),
        ColumnKind::Integer { unsigned: false } | ColumnKind::Year => {
            extract_int(&value).map(CellValue::Int)
        }
        ColumnKind::Float => extract_float(&value).map(CellValue::Float),
        ColumnKind::Decimal => extract_string(&value).map(CellValue::Decimal),
        ColumnKind::Text | ColumnKind::Enum | ColumnKind::Set | ColumnKind::Json => {
            extract_string(&value).map(CellValue::Text)
        }
        ColumnKind::Binary | ColumnKind::Bit | ColumnKind::Geometry => {
            extract_bytes(value).map(CellValue::Bytes)
        }
        ColumnKind::Date => extract_date(&value),
        ColumnKind::DateTime => extract_datetime(&value),
        ColumnKind::Time => extract_time(&value),
        ColumnKind::Other { .. } => match value {
            Value::Bytes(b) => Ok(match String::from_utf8(b) {
                Ok(s) => CellValue::Text(s),
                Err(e) => CellValue::Bytes(e.into_bytes()),
            }),
            other => extract_string(&other).map(CellValue::Text),
        },
    }
}

/// Decode a full row selected with every column in declaration order.
pub fn decode_row(
    table: &TableDefinition,
    values: Vec<Value>,
) -> Result<Vec<CellValue>, ConversionError> {
    if values.len() != table.columns.len() {
        return Err(ConversionError::ColumnCount {
            table: table.name.clone(),
            expected: table.columns.len(),
            actual: values.len(),
        });
    }
    table
        .columns
        .iter()
        .zip(values)
        .map(|(column, value)| decode_value(&column.kind, value))
        .collect()
}

fn mismatch(expected: &str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        actual: value.clone(),
    }
}

/// Extract integer from MySQL Value.
fn extract_int(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::UInt(u) => i64::try_from(*u).map_err(|_| mismatch("signed integer", value)),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            s.trim().parse().map_err(|_| mismatch("integer", value))
        }
        _ => Err(mismatch("integer", value)),
    }
}

fn extract_uint(value: &Value) -> Result<u64, ConversionError> {
    match value {
        Value::UInt(u) => Ok(*u),
        Value::Int(i) => u64::try_from(*i).map_err(|_| mismatch("unsigned integer", value)),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            s.trim().parse().map_err(|_| mismatch("unsigned integer", value))
        }
        _ => Err(mismatch("unsigned integer", value)),
    }
}

/// Extract float from MySQL Value.
fn extract_float(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Float(f) => Ok(*f as f64),
        Value::Double(d) => Ok(*d),
        Value::Int(i) => Ok(*i as f64),
        Value::UInt(u) => Ok(*u as f64),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            s.trim().parse().map_err(|_| mismatch("float", value))
        }
        _ => Err(mismatch("float", value)),
    }
}

/// Extract string from MySQL Value.
fn extract_string(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::Bytes(b) => Ok(String::from_utf8(b.clone())?),
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Double(d) => Ok(d.to_string()),
        _ => Err(mismatch("string", value)),
    }
}

fn extract_bytes(value: Value) -> Result<Vec<u8>, ConversionError> {
    match value {
        Value::Bytes(b) => Ok(b),
        Value::Int(i) => Ok(i.to_string().into_bytes()),
        Value::UInt(u) => Ok(u.to_string().into_bytes()),
        other => Err(mismatch("bytes", &other)),
    }
}

/// Calendar date of the fields; `None` for anything chrono cannot
/// represent, which decodes to `ZeroDate`. MySQL stores `0000-00-00`,
/// partial zero dates such as `2020-00-00`, and with
/// `ALLOW_INVALID_DATES` days like `2021-02-30`.
fn calendar_date(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Fields of a leading `YYYY-MM-DD`, when the text has that shape.
fn date_fields(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.get(..10)?.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    Some((year, month, day))
}

/// True when the text looks like a date whose calendar fields are not valid.
fn is_unrepresentable_text(s: &str) -> bool {
    date_fields(s).is_some_and(|(y, m, d)| calendar_date(y, m, d).is_none())
}

fn extract_date(value: &Value) -> Result<CellValue, ConversionError> {
    match value {
        Value::Date(year, month, day, _, _, _, _) => Ok(
            calendar_date(*year as u32, *month as u32, *day as u32)
                .map_or(CellValue::ZeroDate, CellValue::Date),
        ),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            if is_unrepresentable_text(&s) {
                return Ok(CellValue::ZeroDate);
            }
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(CellValue::Date)
                .map_err(|_| ConversionError::InvalidDateTime(s))
        }
        _ => Err(mismatch("date", value)),
    }
}

fn extract_datetime(value: &Value) -> Result<CellValue, ConversionError> {
    match value {
        Value::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = calendar_date(*year as u32, *month as u32, *day as u32) else {
                return Ok(CellValue::ZeroDate);
            };
            let time =
                NaiveTime::from_hms_micro_opt(*hour as u32, *min as u32, *sec as u32, *micro)
                    .ok_or_else(|| ConversionError::InvalidDateTime(format!("{value:?}")))?;
            Ok(CellValue::DateTime(NaiveDateTime::new(date, time)))
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            if is_unrepresentable_text(&s) {
                return Ok(CellValue::ZeroDate);
            }
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                .map(CellValue::DateTime)
                .map_err(|_| ConversionError::InvalidDateTime(s))
        }
        _ => Err(mismatch("datetime", value)),
    }
}

fn extract_time(value: &Value) -> Result<CellValue, ConversionError> {
    match value {
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let secs = *days as u64 * 86_400
                + *hours as u64 * 3600
                + *minutes as u64 * 60
                + *seconds as u64;
            Ok(CellValue::Time {
                negative: *negative,
                micros: secs * 1_000_000 + *micros as u64,
            })
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            parse_time_text(&s).ok_or(ConversionError::InvalidDateTime(s))
        }
        _ => Err(mismatch("time", value)),
    }
}

/// Parse `[-]HHH:MM:SS[.ffffff]`.
fn parse_time_text(s: &str) -> Option<CellValue> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (clock, frac) = match rest.split_once('.') {
        Some((clock, frac)) => (clock, frac),
        None => (rest, ""),
    };
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    let micros = if frac.is_empty() {
        0
    } else {
        if frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        format!("{frac:0<6}").parse::<u64>().ok()?
    };
    Some(CellValue::Time {
        negative,
        micros: (hours * 3600 + minutes * 60 + seconds) * 1_000_000 + micros,
    })
}
