//! Query commands: `scan`, `get` and `cone`.
//!
//! ## Example
//! ```bash
//! starctl --catalog catalogs/bright-stars/v1 get --where name=Sirius
//! starctl --catalog catalogs/bright-stars/v1 get -w constellation_id=ori -w hip=24436
//! starctl --catalog catalogs/bright-stars/v1 cone 83.8 -5.4 10
//! ```

use anyhow::{bail, Context, Result};
use starhouse_core::spatial::angular_distance_deg;
use starhouse_core::{FieldType, Record, Value, DEC_COLUMN, RA_COLUMN};
use starhouse_storage::{Catalog, Predicate};

use super::column_names;
use crate::format::Formatter;

/// Column appended to cone results.
pub const DISTANCE_COLUMN: &str = "distance_deg";

/// Split a `field=value` argument.
pub fn parse_term(arg: &str) -> Result<(String, String), String> {
    let (field, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got `{arg}`"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in `{arg}`"));
    }
    Ok((field.to_string(), value.trim().to_string()))
}

/// Type the raw `--where` values by the catalog's column types.
///
/// `null` means a null value. Unknown fields are passed through as strings so
/// the catalog reports them.
pub fn build_predicate(catalog: &Catalog, terms: &[(String, String)]) -> Result<Predicate> {
    let manifest = catalog.manifest();
    let mut predicate: Option<Predicate> = None;

    for (field, raw) in terms {
        let value = if raw == "null" {
            Value::Null
        } else {
            match manifest.columns.iter().find(|c| &c.name == field) {
                Some(column) => typed_value(field, raw, column.field_type)?,
                None => Value::Str(raw.clone()),
            }
        };
        predicate = Some(match predicate {
            None => Predicate::eq(field.as_str(), value),
            Some(p) => p.and(field.as_str(), value),
        });
    }

    match predicate {
        Some(p) => Ok(p),
        None => bail!("at least one --where term is required"),
    }
}

fn typed_value(field: &str, raw: &str, field_type: FieldType) -> Result<Value> {
    Ok(match field_type {
        FieldType::Int64 => Value::Int(
            raw.parse()
                .with_context(|| format!("`{field}` is int64, got `{raw}`"))?,
        ),
        FieldType::Float64 => Value::Float(
            raw.parse()
                .with_context(|| format!("`{field}` is float64, got `{raw}`"))?,
        ),
        FieldType::Utf8 | FieldType::Category => Value::Str(raw.to_string()),
    })
}

pub fn handle_scan(catalog: &Catalog, limit: Option<usize>, formatter: &Formatter) -> Result<()> {
    let records = catalog
        .all()?
        .take(limit.unwrap_or(usize::MAX))
        .collect::<starhouse_core::Result<Vec<Record>>>()
        .context("Failed to scan catalog")?;
    println!("{}", formatter.records(&column_names(catalog), &records)?);
    Ok(())
}

pub fn handle_get(
    catalog: &Catalog,
    terms: &[(String, String)],
    formatter: &Formatter,
) -> Result<()> {
    let predicate = build_predicate(catalog, terms)?;
    tracing::debug!(%predicate, "lookup");
    let found = catalog
        .get(&predicate)
        .with_context(|| format!("Lookup `{predicate}` failed"))?;
    let records: Vec<Record> = found.into_iter().collect();
    println!("{}", formatter.records(&column_names(catalog), &records)?);
    Ok(())
}

/// Cone results, nearest first, each with its distance from the centre.
pub fn cone_records(catalog: &Catalog, ra: f64, dec: f64, radius: f64) -> Result<Vec<Record>> {
    let mut records: Vec<(f64, Record)> = catalog
        .cone(ra, dec, radius)
        .with_context(|| format!("Cone search at ({ra}, {dec}) r={radius} failed"))?
        .into_iter()
        .map(|record| {
            let distance = match (record.get_f64(RA_COLUMN), record.get_f64(DEC_COLUMN)) {
                (Some(r), Some(d)) => angular_distance_deg(ra, dec, r, d),
                _ => f64::NAN,
            };
            (distance, record)
        })
        .collect();
    records.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(records
        .into_iter()
        .map(|(distance, record)| record.with(DISTANCE_COLUMN, distance))
        .collect())
}

pub fn handle_cone(
    catalog: &Catalog,
    ra: f64,
    dec: f64,
    radius: f64,
    formatter: &Formatter,
) -> Result<()> {
    let records = cone_records(catalog, ra, dec, radius)?;
    let mut columns = column_names(catalog);
    columns.push(DISTANCE_COLUMN.to_string());
    println!("{}", formatter.records(&columns, &records)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_term() {
        assert_eq!(
            parse_term("name=Sirius").unwrap(),
            ("name".to_string(), "Sirius".to_string())
        );
        assert_eq!(
            parse_term(" hip = 32349 ").unwrap(),
            ("hip".to_string(), "32349".to_string())
        );
        // only the first `=` splits
        assert_eq!(
            parse_term("ccdm=a=b").unwrap(),
            ("ccdm".to_string(), "a=b".to_string())
        );
        assert!(parse_term("Sirius").is_err());
        assert!(parse_term("=Sirius").is_err());
    }

    #[test]
    fn test_typed_value() {
        assert_eq!(
            typed_value("hip", "32349", FieldType::Int64).unwrap(),
            Value::Int(32349)
        );
        assert_eq!(
            typed_value("magnitude", "-1.44", FieldType::Float64).unwrap(),
            Value::Float(-1.44)
        );
        assert_eq!(
            typed_value("constellation_id", "cma", FieldType::Category).unwrap(),
            Value::Str("cma".to_string())
        );
        assert!(typed_value("hip", "Sirius", FieldType::Int64).is_err());
        assert!(typed_value("magnitude", "bright", FieldType::Float64).is_err());
    }
}
