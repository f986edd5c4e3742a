//! Record Data Structure
//!
//! A [`Record`] is one logical catalog row: a set of named [`Value`]s.
//!
//! The same type flows both ways across the engine boundary:
//! - **Inbound**: the collaborator fills in schema fields. `pk` and
//!   `healpix_index` are never read from input.
//! - **Outbound**: records returned by a catalog carry every schema field
//!   (nulls included) plus the derived `pk` and `healpix_index`.
//!
//! ## Example
//! ```ignore
//! let sirius = Record::new()
//!     .with("hip", 32349)
//!     .with("name", "Sirius")
//!     .with("ra", 101.287)
//!     .with("dec", -16.716)
//!     .with("magnitude", -1.44);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{HEALPIX_COLUMN, PK_COLUMN};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Dense primary key; present on records read from a catalog.
    pub fn pk(&self) -> Option<u64> {
        self.get_i64(PK_COLUMN).map(|v| v as u64)
    }

    /// Spatial cell id; present on records read from a catalog.
    pub fn healpix_index(&self) -> Option<u64> {
        self.get_i64(HEALPIX_COLUMN).map(|v| v as u64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
