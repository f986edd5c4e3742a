//! Typed Star View
//!
//! [`Star`] is the bright-star catalog row as a plain struct. It converts into
//! an input [`Record`] for a build and back from a stored record, and
//! [`Star::schema`] is the schema those records conform to.
//!
//! `pk` and `healpix_index` are derived by the engine. They are ignored when a
//! `Star` is turned into a record and filled in when one is read back.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{Field, Schema, HEALPIX_COLUMN, PK_COLUMN};
use crate::value::{FieldType, Value};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Star {
    pub pk: Option<u64>,
    pub healpix_index: Option<u64>,
    /// Hipparcos catalog number.
    pub hip: Option<i64>,
    /// Tycho catalog number.
    pub tyc: Option<i64>,
    pub ra: f64,
    pub dec: f64,
    /// Apparent visual magnitude.
    pub magnitude: f64,
    /// B-V colour index.
    pub bv: Option<f64>,
    pub parallax_mas: Option<f64>,
    pub ra_mas_per_year: f64,
    pub dec_mas_per_year: f64,
    /// Multiple-star catalog identifier.
    pub ccdm: Option<String>,
    pub constellation_id: Option<String>,
    pub epoch_year: i64,
    pub name: Option<String>,
}

impl Star {
    /// Schema of the bright-star catalog.
    pub fn schema() -> Schema {
        Schema::new(vec![
            Field::new("hip", FieldType::Int64).nullable(),
            Field::new("tyc", FieldType::Int64).nullable(),
            Field::new("ra", FieldType::Float64),
            Field::new("dec", FieldType::Float64),
            Field::new("magnitude", FieldType::Float64),
            Field::new("bv", FieldType::Float64).nullable(),
            Field::new("parallax_mas", FieldType::Float64).nullable(),
            Field::new("ra_mas_per_year", FieldType::Float64).zero_default(),
            Field::new("dec_mas_per_year", FieldType::Float64).zero_default(),
            Field::new("ccdm", FieldType::Utf8).nullable(),
            Field::new("constellation_id", FieldType::Category).nullable(),
            Field::new("epoch_year", FieldType::Int64),
            Field::new("name", FieldType::Utf8).nullable(),
        ])
    }
}

impl From<Star> for Record {
    fn from(star: Star) -> Self {
        Record::new()
            .with("hip", star.hip)
            .with("tyc", star.tyc)
            .with("ra", star.ra)
            .with("dec", star.dec)
            .with("magnitude", star.magnitude)
            .with("bv", star.bv)
            .with("parallax_mas", star.parallax_mas)
            .with("ra_mas_per_year", star.ra_mas_per_year)
            .with("dec_mas_per_year", star.dec_mas_per_year)
            .with("ccdm", star.ccdm)
            .with("constellation_id", star.constellation_id)
            .with("epoch_year", star.epoch_year)
            .with("name", star.name)
    }
}

impl TryFrom<Record> for Star {
    type Error = Error;

    fn try_from(record: Record) -> Result<Self> {
        let r = &record;
        Ok(Star {
            pk: opt_int(r, PK_COLUMN)?.map(|v| v as u64),
            healpix_index: opt_int(r, HEALPIX_COLUMN)?.map(|v| v as u64),
            hip: opt_int(r, "hip")?,
            tyc: opt_int(r, "tyc")?,
            ra: req_float(r, "ra")?,
            dec: req_float(r, "dec")?,
            magnitude: req_float(r, "magnitude")?,
            bv: opt_float(r, "bv")?,
            parallax_mas: opt_float(r, "parallax_mas")?,
            ra_mas_per_year: opt_float(r, "ra_mas_per_year")?.unwrap_or(0.0),
            dec_mas_per_year: opt_float(r, "dec_mas_per_year")?.unwrap_or(0.0),
            ccdm: opt_str(r, "ccdm")?,
            constellation_id: opt_str(r, "constellation_id")?,
            epoch_year: opt_int(r, "epoch_year")?
                .ok_or_else(|| missing("epoch_year"))?,
            name: opt_str(r, "name")?,
        })
    }
}

fn missing(name: &str) -> Error {
    Error::MalformedRecord(format!("star record has no `{name}`"))
}

fn wrong_type(name: &str, expected: FieldType, got: &Value) -> Error {
    Error::MalformedRecord(format!("star field `{name}` expects {expected}, got `{got}`"))
}

fn opt_int(record: &Record, name: &str) -> Result<Option<i64>> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Int(v)) => Ok(Some(*v)),
        Some(other) => Err(wrong_type(name, FieldType::Int64, other)),
    }
}

fn opt_float(record: &Record, name: &str) -> Result<Option<f64>> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| wrong_type(name, FieldType::Float64, v)),
    }
}

fn req_float(record: &Record, name: &str) -> Result<f64> {
    opt_float(record, name)?.ok_or_else(|| missing(name))
}

fn opt_str(record: &Record, name: &str) -> Result<Option<String>> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(wrong_type(name, FieldType::Utf8, other)),
    }
}
