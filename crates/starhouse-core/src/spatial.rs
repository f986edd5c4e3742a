//! Spatial Indexer
//!
//! Maps equatorial coordinates in degrees to nested HEALPix cell ids at a fixed
//! resolution (the HEALPix depth). The resolution is fixed for a whole build
//! and recorded in the catalog manifest, so a reader can recompute any stored
//! `healpix_index` from the stored `ra`/`dec` and get the same value back.
//!
//! ## Domain
//! - `ra` in `[0, 360)`
//! - `dec` in `[-90, 90]`
//!
//! Anything else, including NaN and infinities, is `InvalidCoordinate`.
//! Values are never clamped or wrapped.

use std::collections::BTreeSet;
use std::f64::consts::TAU;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::healpix::{self, MAX_DEPTH};

/// Cones wider than this are not worth pruning; a full scan is cheaper.
const MAX_PRUNED_RADIUS_DEG: f64 = 30.0;

/// Bearings sampled on each ring when covering a cone.
const CONE_BEARINGS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialIndexer {
    depth: u8,
}

impl SpatialIndexer {
    /// `resolution` is the HEALPix depth, `0..=29`.
    pub fn new(resolution: u8) -> Result<Self> {
        if resolution > MAX_DEPTH {
            return Err(Error::Configuration(format!(
                "resolution {resolution} exceeds the maximum of {MAX_DEPTH}"
            )));
        }
        Ok(Self { depth: resolution })
    }

    pub fn resolution(&self) -> u8 {
        self.depth
    }

    pub fn cell_count(&self) -> u64 {
        healpix::npix(self.depth)
    }

    /// Cell id for `(ra, dec)` in degrees.
    pub fn index(&self, ra: f64, dec: f64) -> Result<u64> {
        validate_coordinate(ra, dec)?;
        Ok(healpix::lon_lat_to_nested(
            ra.to_radians(),
            dec.to_radians(),
            self.depth,
        ))
    }

    /// Centre of `cell` as `(ra, dec)` degrees.
    pub fn cell_center(&self, cell: u64) -> (f64, f64) {
        let (lon, lat) = healpix::nested_to_center(cell, self.depth);
        (lon.to_degrees(), lat.to_degrees())
    }

    pub fn neighbours(&self, cell: u64) -> Vec<u64> {
        healpix::neighbours(cell, self.depth)
    }

    /// Coarsen `cell` to `depth`.
    pub fn parent(&self, cell: u64, depth: u8) -> u64 {
        healpix::parent(cell, self.depth, depth.min(self.depth))
    }

    /// Cell id ranges at this resolution that together contain every point
    /// within `radius_deg` of `(ra, dec)`.
    ///
    /// Ranges are sorted and disjoint. Returns `None` when the cone is too
    /// wide for pruning to pay off.
    pub fn cone_cover(&self, ra: f64, dec: f64, radius_deg: f64) -> Result<Option<Vec<Range<u64>>>> {
        validate_coordinate(ra, dec)?;
        if !(radius_deg.is_finite() && radius_deg > 0.0) {
            return Err(Error::InvalidCoordinate { ra, dec });
        }
        if radius_deg >= MAX_PRUNED_RADIUS_DEG {
            return Ok(None);
        }

        let radius = radius_deg.to_radians();
        let coarse = (0..=self.depth)
            .rev()
            .find(|&d| healpix::pixel_side(d) >= 2.0 * radius)
            .unwrap_or(0);

        let (lon, lat) = (ra.to_radians(), dec.to_radians());
        let mut cells = BTreeSet::new();
        cells.insert(healpix::lon_lat_to_nested(lon, lat, coarse));
        for ring in [0.5, 1.0] {
            for i in 0..CONE_BEARINGS {
                let bearing = TAU * i as f64 / CONE_BEARINGS as f64;
                let (plon, plat) = destination(lon, lat, radius * ring, bearing);
                cells.insert(healpix::lon_lat_to_nested(plon, plat, coarse));
            }
        }
        let sampled: Vec<u64> = cells.iter().copied().collect();
        for cell in sampled {
            cells.extend(healpix::neighbours(cell, coarse));
        }

        let mut ranges: Vec<Range<u64>> = Vec::with_capacity(cells.len());
        for cell in cells {
            let range = healpix::descendants(cell, coarse, self.depth);
            match ranges.last_mut() {
                Some(last) if last.end == range.start => last.end = range.end,
                _ => ranges.push(range),
            }
        }
        Ok(Some(ranges))
    }
}

/// Check `ra` in `[0, 360)` and `dec` in `[-90, 90]`.
pub fn validate_coordinate(ra: f64, dec: f64) -> Result<()> {
    let ra_ok = ra.is_finite() && (0.0..360.0).contains(&ra);
    let dec_ok = dec.is_finite() && (-90.0..=90.0).contains(&dec);
    if ra_ok && dec_ok {
        Ok(())
    } else {
        Err(Error::InvalidCoordinate { ra, dec })
    }
}

/// Great-circle separation in degrees (haversine).
pub fn angular_distance_deg(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (dec1, dec2) = (dec1.to_radians(), dec2.to_radians());
    let dra = (ra2 - ra1).to_radians();
    let ddec = dec2 - dec1;
    let h = (ddec / 2.0).sin().powi(2) + dec1.cos() * dec2.cos() * (dra / 2.0).sin().powi(2);
    (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
}

/// Point reached travelling `dist` radians from `(lon, lat)` along `bearing`.
fn destination(lon: f64, lat: f64, dist: f64, bearing: f64) -> (f64, f64) {
    let lat2 = (lat.sin() * dist.cos() + lat.cos() * dist.sin() * bearing.cos()).asin();
    let lon2 = lon
        + (bearing.sin() * dist.sin() * lat.cos()).atan2(dist.cos() - lat.sin() * lat2.sin());
    (lon2.rem_euclid(TAU), lat2)
}
