//! Forward conversion: CellValue → MySQLValue
//!
//! Used to bind statement parameters: key predicates, and row payloads for
//! multi-row inserts.

use chrono::{Datelike, Timelike};
use mysql_async::{Params, Value};
use rowsync_core::CellValue;

/// MySQL value wrapper for type-safe conversions.
#[derive(Debug, Clone, PartialEq)]
pub struct MySQLValue(pub Value);

impl MySQLValue {
    /// Get the inner mysql_async::Value.
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Get a reference to the inner value.
    pub fn as_inner(&self) -> &Value {
        &self.0
    }
}

impl From<CellValue> for MySQLValue {
    fn from(cell: CellValue) -> Self {
        match cell {
            CellValue::Null => MySQLValue(Value::NULL),
            CellValue::Int(i) => MySQLValue(Value::Int(i)),
            CellValue::UInt(u) => MySQLValue(Value::UInt(u)),
            CellValue::Float(f) => MySQLValue(Value::Double(f)),

            // Decimal - sent as text to keep exact precision
            CellValue::Decimal(s) | CellValue::Text(s) => MySQLValue(Value::Bytes(s.into_bytes())),
            CellValue::Bytes(b) => MySQLValue(Value::Bytes(b)),

            CellValue::Date(d) => MySQLValue(Value::Date(
                d.year() as u16,
                d.month() as u8,
                d.day() as u8,
                0,
                0,
                0,
                0,
            )),
            CellValue::DateTime(dt) => MySQLValue(Value::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1000, // MySQL uses microseconds
            )),
            CellValue::ZeroDate => MySQLValue(Value::Date(0, 0, 0, 0, 0, 0, 0)),
            CellValue::Time { negative, micros } => {
                let secs = micros / 1_000_000;
                MySQLValue(Value::Time(
                    negative,
                    (secs / 86_400) as u32,
                    ((secs / 3600) % 24) as u8,
                    ((secs / 60) % 60) as u8,
                    (secs % 60) as u8,
                    (micros % 1_000_000) as u32,
                ))
            }
        }
    }
}

impl From<&CellValue> for MySQLValue {
    fn from(cell: &CellValue) -> Self {
        MySQLValue::from(cell.clone())
    }
}

/// Positional statement parameters from cell values.
pub fn to_params(cells: Vec<CellValue>) -> Params {
    if cells.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        cells
            .into_iter()
            .map(|c| MySQLValue::from(c).into_inner())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::decode_value;
    use chrono::NaiveDate;
    use rowsync_core::ColumnKind;

    #[test]
    fn test_scalar_values() {
        assert_eq!(MySQLValue::from(CellValue::Null).into_inner(), Value::NULL);
        assert_eq!(MySQLValue::from(CellValue::Int(-3)).into_inner(), Value::Int(-3));
        assert_eq!(
            MySQLValue::from(CellValue::Decimal("1.50".into())).into_inner(),
            Value::Bytes(b"1.50".to_vec())
        );
    }

    #[test]
    fn test_datetime_to_mysql() {
        let dt = NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_micro_opt(14, 30, 45, 123_456)
            .unwrap();
        assert_eq!(
            MySQLValue::from(CellValue::DateTime(dt)).into_inner(),
            Value::Date(2024, 6, 15, 14, 30, 45, 123_456)
        );
    }

    #[test]
    fn test_time_survives_decode() {
        let cell = CellValue::Time {
            negative: true,
            micros: (49 * 3600 + 1) * 1_000_000 + 7,
        };
        let value = MySQLValue::from(&cell).into_inner();
        assert_eq!(value, Value::Time(true, 2, 1, 0, 1, 7));
        assert_eq!(decode_value(&ColumnKind::Time, value).unwrap(), cell);
    }

    #[test]
    fn test_to_params() {
        assert_eq!(to_params(vec![]), Params::Empty);
        assert_eq!(
            to_params(vec![CellValue::Int(1), CellValue::Text("a".into())]),
            Params::Positional(vec![Value::Int(1), Value::Bytes(b"a".to_vec())])
        );
    }
}
