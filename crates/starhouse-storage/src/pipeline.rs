//! Chunked Sort Pipeline
//!
//! Turns the unordered input stream into bounded, sorted chunks.
//!
//! ## Per-record steps
//!
//! 1. **Conform** the record to the schema (defaults, widening, type checks)
//! 2. **Locate** it: `healpix_index` from `ra`/`dec`
//! 3. **Filter** it through the caller's [`RecordFilter`]
//! 4. **Admit** it: assign `pk = accepted + 1` and buffer the row
//!
//! Steps 1 and 2 fail with record-level errors; step 3 only rejects. A `pk` is
//! handed out only at step 4, so accepted records always carry a dense
//! `1..=n` sequence in input order.
//!
//! ## Sort order
//!
//! A full chunk is sorted by the composite key
//! `(sorting_columns..., healpix_index, pk)`. `pk` is unique, so the key is a
//! total order and the result does not depend on sort stability. Sorting uses
//! rayon's parallel unstable sort.
//!
//! ## Row layout
//!
//! A [`Row`] holds values in stored column order: `pk`, `healpix_index`, then
//! the schema fields.

use std::cmp::Ordering;

use rayon::slice::ParallelSliceMut;
use starhouse_core::{Error, Record, Result, Schema, SpatialIndexer, Value, DEC_COLUMN, RA_COLUMN};

use crate::filter::{RecordFilter, RowView};
use crate::partition::{PK_INDEX, HEALPIX_INDEX, USER_COLUMNS_START};

/// One admitted record in stored column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, column: usize) -> &Value {
        &self.values[column]
    }

    pub fn pk(&self) -> u64 {
        self.values[PK_INDEX].as_i64().unwrap_or_default() as u64
    }
}

/// Outcome of offering one record to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { pk: u64 },
    Rejected,
}

/// Composite ordering key over stored column indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    columns: Vec<usize>,
}

impl SortKey {
    /// `sorting_columns` must already be validated against `schema`.
    pub fn new(schema: &Schema, sorting_columns: &[String]) -> Result<Self> {
        let mut columns = Vec::with_capacity(sorting_columns.len() + 2);
        for name in sorting_columns {
            let index = schema.index_of(name).ok_or_else(|| {
                Error::Configuration(format!("unknown sorting column `{name}`"))
            })?;
            columns.push(USER_COLUMNS_START + index);
        }
        columns.push(HEALPIX_INDEX);
        columns.push(PK_INDEX);
        Ok(Self { columns })
    }

    /// Stored column indexes, most significant first.
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for &column in &self.columns {
            let ord = a.values[column].total_cmp(&b.values[column]);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// The key of a row as owned values.
    pub fn key_of(&self, row: &Row) -> Vec<Value> {
        self.columns.iter().map(|&c| row.values[c].clone()).collect()
    }
}

/// Sort a chunk in place by `key`.
pub fn sort_chunk(rows: &mut [Row], key: &SortKey) {
    rows.par_sort_unstable_by(|a, b| key.compare(a, b));
}

/// Turn column-major data back into rows, consuming it.
pub fn rows_from_columns(columns: Vec<Vec<Value>>) -> Vec<Row> {
    let rows = columns.first().map_or(0, Vec::len);
    let mut iters: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    (0..rows)
        .map(|_| {
            Row::new(
                iters
                    .iter_mut()
                    .map(|values| values.next().unwrap_or_default())
                    .collect(),
            )
        })
        .collect()
}

/// Per-record admission and chunk buffering.
///
/// The pipeline owns the only mutable build state: the chunk buffer and the
/// accepted/rejected counters.
pub struct Pipeline<'a> {
    schema: &'a Schema,
    indexer: SpatialIndexer,
    filter: &'a dyn RecordFilter,
    ra: usize,
    dec: usize,
    chunk_size: usize,
    buffer: Vec<Row>,
    accepted: u64,
    rejected: u64,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        schema: &'a Schema,
        indexer: SpatialIndexer,
        filter: &'a dyn RecordFilter,
        chunk_size: usize,
    ) -> Result<Self> {
        let ra = schema
            .index_of(RA_COLUMN)
            .ok_or_else(|| Error::Configuration("schema has no `ra` field".to_string()))?;
        let dec = schema
            .index_of(DEC_COLUMN)
            .ok_or_else(|| Error::Configuration("schema has no `dec` field".to_string()))?;
        Ok(Self {
            schema,
            indexer,
            filter,
            ra,
            dec,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size.min(1 << 20)),
            accepted: 0,
            rejected: 0,
        })
    }

    /// Run one record through conform, locate, filter and admit.
    ///
    /// Errors are record-level and leave the pipeline usable.
    pub fn admit(&mut self, record: &Record) -> Result<Admission> {
        let fields = self.schema.conform(record)?;
        let ra = fields[self.ra].as_f64().unwrap_or(f64::NAN);
        let dec = fields[self.dec].as_f64().unwrap_or(f64::NAN);
        let cell = self.indexer.index(ra, dec)?;

        if !self
            .filter
            .accept(&RowView::new(self.schema, &fields, cell))
        {
            self.rejected += 1;
            return Ok(Admission::Rejected);
        }

        self.accepted += 1;
        let pk = self.accepted;
        let mut values = Vec::with_capacity(fields.len() + USER_COLUMNS_START);
        values.push(Value::Int(pk as i64));
        values.push(Value::Int(cell as i64));
        values.extend(fields);
        self.buffer.push(Row::new(values));
        Ok(Admission::Accepted { pk })
    }

    /// Take the buffer once it holds `chunk_size` rows.
    pub fn take_full_chunk(&mut self) -> Option<Vec<Row>> {
        if self.buffer.len() < self.chunk_size {
            return None;
        }
        let capacity = self.chunk_size.min(1 << 20);
        Some(std::mem::replace(&mut self.buffer, Vec::with_capacity(capacity)))
    }

    /// Take whatever is left at end of input.
    pub fn take_remainder(&mut self) -> Option<Vec<Row>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAll, MaxValue};
    use starhouse_core::Star;

    fn star(ra: f64, dec: f64, magnitude: f64) -> Record {
        Record::from(Star {
            ra,
            dec,
            magnitude,
            epoch_year: 1991,
            ..Star::default()
        })
    }

    #[test]
    fn test_pk_is_dense_over_accepted_records() {
        let schema = Star::schema();
        let filter = MaxValue::new("magnitude", 6.0);
        let indexer = SpatialIndexer::new(6).unwrap();
        let mut pipeline = Pipeline::new(&schema, indexer, &filter, 100).unwrap();

        assert_eq!(
            pipeline.admit(&star(10.0, 10.0, 1.0)).unwrap(),
            Admission::Accepted { pk: 1 }
        );
        assert_eq!(
            pipeline.admit(&star(10.0, 10.0, 7.0)).unwrap(),
            Admission::Rejected
        );
        assert!(pipeline.admit(&star(400.0, 10.0, 1.0)).is_err());
        assert!(pipeline.admit(&Record::new().with("ra", 1.0)).is_err());
        assert_eq!(
            pipeline.admit(&star(20.0, -10.0, 2.0)).unwrap(),
            Admission::Accepted { pk: 2 }
        );
        assert_eq!(pipeline.accepted(), 2);
        assert_eq!(pipeline.rejected(), 1);

        let rows = pipeline.take_remainder().unwrap();
        assert_eq!(rows.iter().map(Row::pk).collect::<Vec<_>>(), vec![1, 2]);
        assert!(pipeline.take_remainder().is_none());
    }

    #[test]
    fn test_chunks_flush_at_chunk_size() {
        let schema = Star::schema();
        let indexer = SpatialIndexer::new(4).unwrap();
        let mut pipeline = Pipeline::new(&schema, indexer, &AcceptAll, 3).unwrap();

        let mut chunks = Vec::new();
        for i in 0..7 {
            pipeline.admit(&star(i as f64 * 10.0, 0.0, 1.0)).unwrap();
            if let Some(chunk) = pipeline.take_full_chunk() {
                chunks.push(chunk.len());
            }
        }
        if let Some(rest) = pipeline.take_remainder() {
            chunks.push(rest.len());
        }
        assert_eq!(chunks, vec![3, 3, 1]);
    }

    #[test]
    fn test_sort_by_composite_key() {
        let schema = Star::schema();
        let key = SortKey::new(&schema, &["magnitude".to_string()]).unwrap();
        let indexer = SpatialIndexer::new(8).unwrap();
        let mut pipeline = Pipeline::new(&schema, indexer, &AcceptAll, 100).unwrap();

        pipeline.admit(&star(50.0, 5.0, 3.0)).unwrap();
        pipeline.admit(&star(200.0, -40.0, 1.0)).unwrap();
        pipeline.admit(&star(10.0, 5.0, 3.0)).unwrap();
        pipeline.admit(&star(50.0, 5.0, 3.0)).unwrap();

        let mut rows = pipeline.take_remainder().unwrap();
        sort_chunk(&mut rows, &key);

        assert_eq!(rows[0].pk(), 2);
        for pair in rows.windows(2) {
            assert_ne!(key.compare(&pair[0], &pair[1]), Ordering::Greater);
        }
        // identical coordinates and magnitude fall back to pk
        let same: Vec<u64> = rows
            .iter()
            .filter(|r| r.value(HEALPIX_INDEX) == rows[3].value(HEALPIX_INDEX))
            .map(Row::pk)
            .collect();
        assert!(same.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rows_from_columns_transposes() {
        let rows = rows_from_columns(vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(40), Value::Int(41)],
            vec![Value::from("Vega"), Value::Null],
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].pk(), 2);
        assert_eq!(rows[0].values(), &[Value::Int(1), Value::Int(40), Value::from("Vega")]);
        assert!(rows_from_columns(Vec::new()).is_empty());
    }

    #[test]
    fn test_key_of_includes_healpix_and_pk() {
        let schema = Star::schema();
        let key = SortKey::new(&schema, &[]).unwrap();
        assert_eq!(key.columns(), &[HEALPIX_INDEX, PK_INDEX]);
        assert!(SortKey::new(&schema, &["missing".to_string()]).is_err());
    }
}
