//! Lookup Predicates
//!
//! A [`Predicate`] is a conjunction of exact matches, built up fluently:
//!
//! ```ignore
//! let sirius = Predicate::eq("name", "Sirius");
//! let star = Predicate::eq("hip", 32349).and("constellation_id", "cma");
//! ```
//!
//! Matching uses [`Value::matches`]: numbers compare numerically across
//! `Int`/`Float`, and `Null` matches only `Null`. An empty predicate matches
//! every record.

use starhouse_core::{Error, Result, Value};

use crate::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    terms: Vec<(String, Value)>,
}

impl Predicate {
    /// Match records whose `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(column, value)
    }

    /// Add another exact match.
    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((column.into(), value.into()));
        self
    }

    pub fn terms(&self) -> &[(String, Value)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Resolve column names against the catalog's stored columns.
    pub(crate) fn bind(&self, manifest: &Manifest) -> Result<Vec<BoundTerm>> {
        self.terms
            .iter()
            .map(|(name, value)| {
                let column = manifest.column_index(name).ok_or_else(|| {
                    Error::SchemaMismatch(format!("catalog has no field `{name}`"))
                })?;
                let field_type = manifest.columns[column].field_type;
                let comparable = match value {
                    Value::Null => true,
                    Value::Int(_) | Value::Float(_) => field_type.is_numeric(),
                    Value::Str(_) => !field_type.is_numeric(),
                };
                if !comparable {
                    return Err(Error::SchemaMismatch(format!(
                        "field `{name}` is {field_type} and cannot equal `{value}`"
                    )));
                }
                Ok(BoundTerm {
                    name: name.clone(),
                    column,
                    value: value.clone(),
                })
            })
            .collect()
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("true");
        }
        for (i, (name, value)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            match value {
                Value::Str(s) => write!(f, "{name} = {s:?}")?,
                other => write!(f, "{name} = {other}")?,
            }
        }
        Ok(())
    }
}

/// A term resolved to a stored column index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundTerm {
    pub name: String,
    pub column: usize,
    pub value: Value,
}
