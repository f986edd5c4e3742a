//! Edge-case tests for the record model, schema conformance and HEALPix
//! indexing.

use starhouse_core::healpix;
use starhouse_core::{Error, Field, FieldType, Record, Schema, SpatialIndexer, Star, Value};

// ---------------------------------------------------------------
// Schema conformance
// ---------------------------------------------------------------

fn minimal_schema() -> Schema {
    Schema::new(vec![
        Field::new("ra", FieldType::Float64),
        Field::new("dec", FieldType::Float64),
        Field::new("count", FieldType::Int64).zero_default(),
        Field::new("label", FieldType::Category).nullable(),
    ])
}

#[test]
fn test_conform_ignores_unknown_fields() {
    let record = Record::new()
        .with("ra", 1.0)
        .with("dec", 2.0)
        .with("pk", 99)
        .with("healpix_index", 12);
    let values = minimal_schema().conform(&record).unwrap();
    assert_eq!(
        values,
        vec![Value::Float(1.0), Value::Float(2.0), Value::Int(0), Value::Null]
    );
}

#[test]
fn test_conform_explicit_null_uses_zero_default() {
    let record = Record::new()
        .with("ra", 1.0)
        .with("dec", 2.0)
        .with("count", Value::Null);
    let values = minimal_schema().conform(&record).unwrap();
    assert_eq!(values[2], Value::Int(0));
}

#[test]
fn test_conform_rejects_float_for_int_column() {
    let record = Record::new().with("ra", 1.0).with("dec", 2.0).with("count", 1.5);
    assert!(matches!(
        minimal_schema().conform(&record),
        Err(Error::MalformedRecord(_))
    ));
}

#[test]
fn test_conform_rejects_nan() {
    let record = Record::new().with("ra", f64::NAN).with("dec", 2.0);
    assert!(minimal_schema().conform(&record).unwrap_err().is_record_level());
}

#[test]
fn test_empty_schema_is_invalid() {
    assert!(matches!(
        Schema::default().validate(),
        Err(Error::Configuration(_))
    ));
}

// ---------------------------------------------------------------
// Spatial indexing
// ---------------------------------------------------------------

#[test]
fn test_index_is_reproducible_from_stored_coordinates() {
    let idx = SpatialIndexer::new(11).unwrap();
    let star = Star {
        ra: 279.234_735,
        dec: 38.783_689,
        magnitude: 0.03,
        epoch_year: 1991,
        ..Star::default()
    };
    let first = idx.index(star.ra, star.dec).unwrap();
    let record = Record::from(star);
    let again = idx
        .index(record.get_f64("ra").unwrap(), record.get_f64("dec").unwrap())
        .unwrap();
    assert_eq!(first, again);
}

#[test]
fn test_every_depth_zero_cell_is_reachable() {
    let idx = SpatialIndexer::new(0).unwrap();
    let mut seen = std::collections::BTreeSet::new();
    for ra in (0..360).step_by(15) {
        for dec in [-70.0, -20.0, 0.0, 20.0, 70.0] {
            seen.insert(idx.index(ra as f64, dec).unwrap());
        }
    }
    assert_eq!(seen.len(), 12);
}

#[test]
fn test_poles_are_valid_at_max_depth() {
    let idx = SpatialIndexer::new(healpix::MAX_DEPTH).unwrap();
    let north = idx.index(0.0, 90.0).unwrap();
    let south = idx.index(0.0, -90.0).unwrap();
    assert!(north < idx.cell_count());
    assert!(south < idx.cell_count());
    assert_ne!(north, south);
}

#[test]
fn test_children_form_a_contiguous_range() {
    let range = healpix::descendants(5, 0, 3);
    assert_eq!(range.end - range.start, 64);
    for child in range {
        assert_eq!(healpix::parent(child, 3, 0), 5);
    }
}

// ---------------------------------------------------------------
// Signed zeros
// ---------------------------------------------------------------

#[test]
fn test_conform_stores_negative_zero_as_zero() {
    let record = Record::new()
        .with("ra", 0.0)
        .with("dec", -0.0)
        .with("count", 0);
    let values = minimal_schema().conform(&record).unwrap();
    match &values[1] {
        Value::Float(dec) => assert!(dec.is_sign_positive()),
        other => panic!("unexpected {other:?}"),
    }
    assert!(values[1].matches(&Value::Float(-0.0)));
}

// ---------------------------------------------------------------
// Record serialization
// ---------------------------------------------------------------

#[test]
fn test_record_serde_roundtrip() {
    let record = Record::from(Star {
        hip: Some(91262),
        ra: 279.234_735,
        dec: 38.783_689,
        magnitude: 0.03,
        constellation_id: Some("lyr".to_string()),
        epoch_year: 1991,
        name: Some("Vega".to_string()),
        ..Star::default()
    });
    let json = serde_json::to_string(&record).unwrap();
    let back: Record = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}
