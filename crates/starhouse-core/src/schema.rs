//! Catalog Schema
//!
//! A [`Schema`] is the ordered list of user fields a catalog stores. Two more
//! columns are always added by the engine and may not be declared by users:
//!
//! - `pk`: dense 1-based sequence number assigned at admission
//! - `healpix_index`: nested HEALPix cell of `(ra, dec)`
//!
//! Conforming a [`Record`] to a schema is the single place where missing
//! values, zero defaults and type widening are decided.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::{FieldType, Value};

/// Reserved column holding the dense primary key.
pub const PK_COLUMN: &str = "pk";
/// Reserved column holding the spatial cell id.
pub const HEALPIX_COLUMN: &str = "healpix_index";
/// Right ascension column, degrees.
pub const RA_COLUMN: &str = "ra";
/// Declination column, degrees.
pub const DEC_COLUMN: &str = "dec";

/// One user-declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Absent values are stored as null.
    #[serde(default)]
    pub nullable: bool,
    /// Absent values are stored as zero. Numeric fields only.
    #[serde(default)]
    pub zero_default: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            zero_default: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn zero_default(mut self) -> Self {
        self.zero_default = true;
        self
    }

    fn conform(&self, value: Option<&Value>) -> Result<Value> {
        let value = match value {
            None | Some(Value::Null) => {
                if self.zero_default {
                    // validated: zero_default implies a numeric type
                    return self.field_type.zero().ok_or_else(|| {
                        Error::MalformedRecord(format!("no zero value for `{}`", self.name))
                    });
                }
                if self.nullable {
                    return Ok(Value::Null);
                }
                return Err(Error::MalformedRecord(format!(
                    "missing required field `{}`",
                    self.name
                )));
            }
            Some(v) => v.clone(),
        };

        let value = value.coerce(self.field_type).map_err(|v| {
            Error::MalformedRecord(format!(
                "field `{}` expects {} but got `{}`",
                self.name, self.field_type, v
            ))
        })?;

        if let Value::Float(f) = value {
            if !f.is_finite() {
                return Err(Error::MalformedRecord(format!(
                    "field `{}` is not finite: {f}",
                    self.name
                )));
            }
        }
        Ok(value)
    }
}

/// Ordered set of user fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Structural checks independent of any build option.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::Configuration("schema has no fields".to_string()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::Configuration(format!("field #{i} has an empty name")));
            }
            if field.name == PK_COLUMN || field.name == HEALPIX_COLUMN {
                return Err(Error::Configuration(format!(
                    "`{}` is computed by the engine and cannot be declared",
                    field.name
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::Configuration(format!(
                    "duplicate field `{}`",
                    field.name
                )));
            }
            if field.zero_default && !field.field_type.is_numeric() {
                return Err(Error::Configuration(format!(
                    "zero_default on non-numeric field `{}`",
                    field.name
                )));
            }
        }
        for coord in [RA_COLUMN, DEC_COLUMN] {
            match self.field(coord) {
                Some(f) if f.field_type == FieldType::Float64 && !f.nullable => {}
                Some(_) => {
                    return Err(Error::Configuration(format!(
                        "`{coord}` must be a non-nullable float64 field"
                    )))
                }
                None => {
                    return Err(Error::Configuration(format!(
                        "schema is missing the `{coord}` field"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Map a record onto the schema, in field order.
    ///
    /// Fields the schema does not declare are ignored.
    pub fn conform(&self, record: &Record) -> Result<Vec<Value>> {
        self.fields
            .iter()
            .map(|field| field.conform(record.get(&field.name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("hip", FieldType::Int64).nullable(),
            Field::new("ra", FieldType::Float64),
            Field::new("dec", FieldType::Float64),
            Field::new("ra_mas_per_year", FieldType::Float64).zero_default(),
            Field::new("constellation_id", FieldType::Category).nullable(),
        ])
    }

    #[test]
    fn test_conform_applies_defaults_in_field_order() {
        let record = Record::new()
            .with("dec", -16.7)
            .with("ra", 101)
            .with("unrelated", "ignored");
        let values = schema().conform(&record).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Float(101.0),
                Value::Float(-16.7),
                Value::Float(0.0),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_conform_rejects_missing_required() {
        let record = Record::new().with("ra", 1.0);
        let err = schema().conform(&record).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(msg) if msg.contains("`dec`")));
    }

    #[test]
    fn test_conform_rejects_type_mismatch_and_non_finite() {
        let record = Record::new().with("ra", "ten").with("dec", 0.0);
        assert!(matches!(
            schema().conform(&record),
            Err(Error::MalformedRecord(_))
        ));

        let record = Record::new().with("ra", 1.0).with("dec", f64::INFINITY);
        assert!(matches!(
            schema().conform(&record),
            Err(Error::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_validate_catches_reserved_and_duplicate_names() {
        let mut fields = schema().fields().to_vec();
        fields.push(Field::new("pk", FieldType::Int64));
        assert!(Schema::new(fields).validate().is_err());

        let mut fields = schema().fields().to_vec();
        fields.push(Field::new("hip", FieldType::Int64));
        assert!(Schema::new(fields).validate().is_err());

        let fields = vec![
            Field::new("ra", FieldType::Float64),
            Field::new("dec", FieldType::Float64),
            Field::new("ccdm", FieldType::Utf8).zero_default(),
        ];
        assert!(Schema::new(fields).validate().is_err());
    }

    #[test]
    fn test_validate_requires_float_coordinates() {
        let fields = vec![
            Field::new("ra", FieldType::Float64),
            Field::new("dec", FieldType::Int64),
        ];
        assert!(Schema::new(fields).validate().is_err());
        assert!(schema().validate().is_ok());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&schema()).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains(r#""type":"category""#));
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema());
    }
}
