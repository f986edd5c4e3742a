//! Column Statistics
//!
//! [`ColumnRange`] is the min/max/null-count triple Parquet keeps per column
//! chunk, lifted into [`Value`]s. Min and max cover the non-null values only,
//! and are both `Null` when every value is null.

use parquet::file::statistics::Statistics;
use serde::{Deserialize, Serialize};
use starhouse_core::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub min: Value,
    pub max: Value,
    pub null_count: u64,
}

impl ColumnRange {
    /// Range of a column's values.
    pub fn of<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut range = ColumnRange {
            min: Value::Null,
            max: Value::Null,
            null_count: 0,
        };
        for value in values {
            if value.is_null() {
                range.null_count += 1;
                continue;
            }
            if range.min.is_null() || value.total_cmp(&range.min).is_lt() {
                range.min = value.clone();
            }
            if range.max.is_null() || value.total_cmp(&range.max).is_gt() {
                range.max = value.clone();
            }
        }
        range
    }

    /// Read a column chunk's footer statistics. `None` when the chunk has
    /// none, or they are of a physical type no stored column uses.
    pub fn from_parquet(stats: &Statistics) -> Option<Self> {
        let (min, max) = match stats {
            Statistics::Int64(s) => (
                s.min_opt().map(|v| Value::Int(*v)),
                s.max_opt().map(|v| Value::Int(*v)),
            ),
            Statistics::Double(s) => (
                s.min_opt().map(|v| Value::Float(*v)),
                s.max_opt().map(|v| Value::Float(*v)),
            ),
            Statistics::ByteArray(s) => (
                match s.min_opt() {
                    Some(v) => Some(Value::Str(v.as_utf8().ok()?.to_string())),
                    None => None,
                },
                match s.max_opt() {
                    Some(v) => Some(Value::Str(v.as_utf8().ok()?.to_string())),
                    None => None,
                },
            ),
            _ => return None,
        };
        Some(ColumnRange {
            min: min.unwrap_or_default(),
            max: max.unwrap_or_default(),
            null_count: stats.null_count_opt()?,
        })
    }

    /// Could a column with this range hold a value matching `value`?
    pub fn may_contain(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.null_count > 0;
        }
        !self.min.is_null()
            && value.total_cmp(&self.min).is_ge()
            && value.total_cmp(&self.max).is_le()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_skips_nulls() {
        let values = vec![
            Value::Float(2.5),
            Value::Null,
            Value::Float(-1.44),
            Value::Float(0.0),
        ];
        let range = ColumnRange::of(&values);
        assert_eq!(range.min, Value::Float(-1.44));
        assert_eq!(range.max, Value::Float(2.5));
        assert_eq!(range.null_count, 1);

        let empty = ColumnRange::of(&[Value::Null, Value::Null]);
        assert_eq!(empty.min, Value::Null);
        assert_eq!(empty.null_count, 2);
    }

    #[test]
    fn test_may_contain_is_inclusive() {
        let range = ColumnRange::of(&[Value::Int(100), Value::Int(200)]);
        assert!(range.may_contain(&Value::Int(100)));
        assert!(range.may_contain(&Value::Float(150.5)));
        assert!(range.may_contain(&Value::Int(200)));
        assert!(!range.may_contain(&Value::Int(201)));
        assert!(!range.may_contain(&Value::Null));

        let with_nulls = ColumnRange::of(&[Value::Null, Value::from("ori")]);
        assert!(with_nulls.may_contain(&Value::Null));
        assert!(with_nulls.may_contain(&Value::from("ori")));
        assert!(!with_nulls.may_contain(&Value::from("cma")));

        let all_null = ColumnRange::of(&[Value::Null]);
        assert!(!all_null.may_contain(&Value::from("ori")));
    }

    #[test]
    fn test_signed_zero_ranges_compare_equal() {
        // Parquet writes a zero minimum as -0.0
        let ours = ColumnRange::of(&[Value::Float(0.0), Value::Float(1.0)]);
        let footer = ColumnRange {
            min: Value::Float(-0.0),
            max: Value::Float(1.0),
            null_count: 0,
        };
        assert_eq!(ours, footer);
        assert!(footer.may_contain(&Value::Int(0)));
    }
}
