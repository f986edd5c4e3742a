//! Record Filters
//!
//! A build can drop records that conform to the schema but are not wanted in
//! the catalog, such as stars fainter than a magnitude ceiling. Filters see the
//! record after schema conformance and spatial indexing, so zero defaults are
//! already applied and `healpix_index` is known. `pk` is not assigned yet.
//!
//! A rejected record is counted in the build report. It is not an error.
//!
//! ```ignore
//! // Built-in ceiling
//! let bright = MaxValue::new("magnitude", 9.0);
//!
//! // Any closure over the row
//! let northern = |row: &RowView<'_>| row.get_f64("dec").is_some_and(|d| d > 0.0);
//! ```

use starhouse_core::{Schema, Value, HEALPIX_COLUMN};

/// Read-only view of one conformed input row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    schema: &'a Schema,
    values: &'a [Value],
    healpix_index: u64,
}

impl<'a> RowView<'a> {
    pub(crate) fn new(schema: &'a Schema, values: &'a [Value], healpix_index: u64) -> Self {
        Self {
            schema,
            values,
            healpix_index,
        }
    }

    /// Value of a schema field. `healpix_index` is also visible.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        if name == HEALPIX_COLUMN {
            return Some(self.healpix_index as f64);
        }
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        if name == HEALPIX_COLUMN {
            return Some(self.healpix_index as i64);
        }
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn healpix_index(&self) -> u64 {
        self.healpix_index
    }
}

/// Decides which conformed records enter the catalog.
pub trait RecordFilter {
    fn accept(&self, row: &RowView<'_>) -> bool;

    /// Human-readable description recorded in the manifest.
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Keeps every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RecordFilter for AcceptAll {
    fn accept(&self, _row: &RowView<'_>) -> bool {
        true
    }

    fn describe(&self) -> String {
        "all".to_string()
    }
}

/// Keeps records whose numeric `column` is at most `limit`.
///
/// Null or non-numeric values are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxValue {
    pub column: String,
    pub limit: f64,
}

impl MaxValue {
    pub fn new(column: impl Into<String>, limit: f64) -> Self {
        Self {
            column: column.into(),
            limit,
        }
    }
}

impl RecordFilter for MaxValue {
    fn accept(&self, row: &RowView<'_>) -> bool {
        row.get_f64(&self.column).is_some_and(|v| v <= self.limit)
    }

    fn describe(&self) -> String {
        format!("{} <= {}", self.column, self.limit)
    }
}

impl<F> RecordFilter for F
where
    F: Fn(&RowView<'_>) -> bool,
{
    fn accept(&self, row: &RowView<'_>) -> bool {
        self(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhouse_core::{Field, FieldType};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("ra", FieldType::Float64),
            Field::new("dec", FieldType::Float64),
            Field::new("magnitude", FieldType::Float64).nullable(),
        ])
    }

    #[test]
    fn test_max_value_is_inclusive_and_rejects_null() {
        let schema = schema();
        let filter = MaxValue::new("magnitude", 9.0);

        let at_limit = [Value::Float(1.0), Value::Float(2.0), Value::Float(9.0)];
        let over = [Value::Float(1.0), Value::Float(2.0), Value::Float(9.01)];
        let null = [Value::Float(1.0), Value::Float(2.0), Value::Null];

        assert!(filter.accept(&RowView::new(&schema, &at_limit, 0)));
        assert!(!filter.accept(&RowView::new(&schema, &over, 0)));
        assert!(!filter.accept(&RowView::new(&schema, &null, 0)));
        assert_eq!(filter.describe(), "magnitude <= 9");
    }

    #[test]
    fn test_closure_filter() {
        let schema = schema();
        let values = [Value::Float(10.0), Value::Float(-5.0), Value::Float(3.0)];
        let southern = |row: &RowView<'_>| row.get_f64("dec").is_some_and(|d| d < 0.0);
        let row = RowView::new(&schema, &values, 77);
        assert!(southern.accept(&row));
        assert_eq!(southern.describe(), "custom");
        assert_eq!(row.get_i64(HEALPIX_COLUMN), Some(77));
        assert!(AcceptAll.accept(&row));
    }
}
