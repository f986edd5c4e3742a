//! Field Values and Types
//!
//! Every catalog cell holds a [`Value`]. Columns are typed by [`FieldType`], which
//! decides both which values a column accepts and which Arrow type stores it.
//!
//! ## Ordering
//! Sorting and row-group statistics need a total order over values, including
//! floats, so [`Value::total_cmp`] defines one:
//!
//! ```text
//! Null < numbers (Int and Float compared numerically) < strings
//! ```
//!
//! Floats use IEEE-754 total ordering, so the order is deterministic even for
//! values a record could never legally carry (non-finite floats are rejected at
//! admission). The one exception is zero: `-0.0` and `0.0` are the same value,
//! and [`Value::coerce`] stores both as `0.0`.
//!
//! `Int` and `Float` compare exactly, without widening the integer, so
//! `2^53 + 1` does not equal `2^53 as f64`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int64,
    Float64,
    Utf8,
    /// Low-cardinality string, stored dictionary-encoded.
    Category,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int64 | FieldType::Float64)
    }

    /// Zero value used for `zero_default` fields.
    pub fn zero(self) -> Option<Value> {
        match self {
            FieldType::Int64 => Some(Value::Int(0)),
            FieldType::Float64 => Some(Value::Float(0.0)),
            FieldType::Utf8 | FieldType::Category => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int64 => "int64",
            FieldType::Float64 => "float64",
            FieldType::Utf8 => "utf8",
            FieldType::Category => "category",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
        }
    }

    /// Total order used for sorting, statistics and predicate matching.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => unsigned_zero(*a).total_cmp(&unsigned_zero(*b)),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Exact-match semantics used by lookups: numerically equal numbers match
    /// across `Int`/`Float`, compared without rounding, and `-0.0` matches `0.0`.
    pub fn matches(&self, other: &Value) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }

    /// Check the value against a column type, widening `Int` into `Float64`.
    ///
    /// `Null` passes through; nullability is the schema's concern.
    pub fn coerce(self, field_type: FieldType) -> std::result::Result<Value, Value> {
        match (field_type, self) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Int64, v @ Value::Int(_)) => Ok(v),
            (FieldType::Float64, Value::Int(v)) => Ok(Value::Float(v as f64)),
            (FieldType::Float64, Value::Float(v)) => Ok(Value::Float(unsigned_zero(v))),
            (FieldType::Utf8 | FieldType::Category, v @ Value::Str(_)) => Ok(v),
            (_, v) => Err(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

fn unsigned_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Exact comparison of an integer with a float.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return (i as f64).total_cmp(&f);
    }
    if f >= TWO_63 {
        return Ordering::Less;
    }
    if f < -TWO_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    // in range, so the cast is exact
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0f64.total_cmp(&unsigned_zero(f - whole)),
        ord => ord,
    }
}

/// Lexicographic comparison of composite keys.
pub fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.total_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first_and_strings_last() {
        let mut values = vec![
            Value::from("cma"),
            Value::Float(-1.44),
            Value::Null,
            Value::Int(3),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Float(-1.44),
                Value::Int(3),
                Value::from("cma")
            ]
        );
    }

    #[test]
    fn test_mixed_numeric_matching() {
        assert!(Value::Int(2000).matches(&Value::Float(2000.0)));
        assert!(!Value::Int(2000).matches(&Value::Float(2000.5)));
        assert!(!Value::Int(1).matches(&Value::from("1")));
        assert!(Value::Null.matches(&Value::Null));
    }

    #[test]
    fn test_signed_zeros_are_one_value() {
        assert!(Value::Float(-0.0).matches(&Value::Float(0.0)));
        assert!(Value::Int(0).matches(&Value::Float(-0.0)));
        match Value::Float(-0.0).coerce(FieldType::Float64) {
            Ok(Value::Float(v)) => assert!(v.is_sign_positive()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_large_int_float_comparison_is_exact() {
        let big = 1i64 << 53;
        assert!(Value::Int(big).matches(&Value::Float(big as f64)));
        assert!(!Value::Int(big + 1).matches(&Value::Float(big as f64)));
        assert_eq!(
            Value::Int(big + 1).total_cmp(&Value::Float(big as f64)),
            Ordering::Greater
        );
        assert_eq!(Value::Int(i64::MAX).total_cmp(&Value::Float(1e19)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN).total_cmp(&Value::Float(-1e19)), Ordering::Greater);
        assert_eq!(Value::Int(-3).total_cmp(&Value::Float(-2.5)), Ordering::Less);
        assert_eq!(Value::Float(2.5).total_cmp(&Value::Int(2)), Ordering::Greater);
    }

    #[test]
    fn test_coerce_widens_int_into_float() {
        assert_eq!(Value::Int(5).coerce(FieldType::Float64), Ok(Value::Float(5.0)));
        assert_eq!(Value::Float(5.5).coerce(FieldType::Int64), Err(Value::Float(5.5)));
        assert_eq!(Value::from("x").coerce(FieldType::Category), Ok(Value::from("x")));
        assert_eq!(Value::Null.coerce(FieldType::Int64), Ok(Value::Null));
    }

    #[test]
    fn test_json_shape_is_untagged() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Int(7),
            Value::Float(1.5),
            Value::from("ori"),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,7,1.5,"ori"]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[1], Value::Int(7));
        assert_eq!(back[2], Value::Float(1.5));
    }

    #[test]
    fn test_composite_keys_compare_lexicographically() {
        let a = [Value::Float(1.0), Value::Int(10), Value::Int(1)];
        let b = [Value::Float(1.0), Value::Int(10), Value::Int(2)];
        let c = [Value::Float(0.5), Value::Int(99), Value::Int(3)];
        assert_eq!(compare_keys(&a, &b), Ordering::Less);
        assert_eq!(compare_keys(&c, &a), Ordering::Less);
        assert_eq!(compare_keys(&a, &a), Ordering::Equal);
    }
}
