//! Nested HEALPix pixelisation.
//!
//! The sphere is split into 12 base cells, each subdivided into
//! `nside x nside` sub-cells with `nside = 2^depth`. Sub-cells are numbered by
//! bit-interleaving their `(x, y)` position inside the base cell (Z-order), so
//! the children of any cell occupy one contiguous id range at every finer
//! depth. That property is what makes cell ids usable as a sort/locality key.
//!
//! Base cell layout:
//! - 0-3: north polar cap
//! - 4-7: equatorial belt
//! - 8-11: south polar cap
//!
//! Within a base cell `x` increases to the north-east and `y` to the north-west.
//! All angles here are radians; degree handling lives in [`crate::spatial`].

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};
use std::ops::Range;

/// Deepest supported level: `12 * 4^29` still fits in 63 bits.
pub const MAX_DEPTH: u8 = 29;

/// `2^depth`
pub fn nside(depth: u8) -> u64 {
    1u64 << depth
}

/// `12 * nside^2`
pub fn npix(depth: u8) -> u64 {
    12 * nside(depth) * nside(depth)
}

/// Solid angle of one cell, steradians.
pub fn pixel_area(depth: u8) -> f64 {
    4.0 * PI / npix(depth) as f64
}

/// Approximate side length of one cell, radians.
pub fn pixel_side(depth: u8) -> f64 {
    pixel_area(depth).sqrt()
}

/// Shallowest depth whose cells are no larger than `scale_rad` across.
pub fn depth_for_scale(scale_rad: f64) -> u8 {
    // pixel_side^2 = pi / (3 nside^2)  =>  nside = sqrt(pi/3) / scale
    let nside_f = (PI / 3.0).sqrt() / scale_rad;
    if nside_f <= 1.0 {
        return 0;
    }
    (nside_f.log2().ceil() as u8).min(MAX_DEPTH)
}

/// Nested cell id containing `(lon, lat)`.
pub fn lon_lat_to_nested(lon: f64, lat: f64, depth: u8) -> u64 {
    let (base, x, y) = locate(lon, lat, nside(depth) as f64);
    compose(base, x, y, depth)
}

/// `(lon, lat)` of the centre of a nested cell.
pub fn nested_to_center(cell: u64, depth: u8) -> (f64, f64) {
    let (base, x, y) = decompose(cell, depth);
    unproject(base, x as f64 + 0.5, y as f64 + 0.5, nside(depth) as f64)
}

/// The cell containing `cell` at a shallower depth.
pub fn parent(cell: u64, depth: u8, parent_depth: u8) -> u64 {
    debug_assert!(parent_depth <= depth);
    cell >> (2 * (depth - parent_depth) as u32)
}

/// The id range covered by `cell`'s descendants at `child_depth`.
pub fn descendants(cell: u64, depth: u8, child_depth: u8) -> Range<u64> {
    debug_assert!(child_depth >= depth);
    let shift = 2 * (child_depth - depth) as u32;
    (cell << shift)..((cell + 1) << shift)
}

/// Up to eight cells sharing an edge or corner with `cell`.
pub fn neighbours(cell: u64, depth: u8) -> Vec<u64> {
    const DIRECTIONS: [(i64, i64); 8] = [
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
    ];

    let ns = nside(depth) as i64;
    let (base, x, y) = decompose(cell, depth);
    let (x, y) = (x as i64, y as i64);

    let mut out = Vec::with_capacity(8);
    for (dx, dy) in DIRECTIONS {
        let (nx, ny) = (x + dx, y + dy);
        if (0..ns).contains(&nx) && (0..ns).contains(&ny) {
            out.push(compose(base, nx as u64, ny as u64, depth));
            continue;
        }

        let cross_x = !(0..ns).contains(&nx);
        let cross_y = !(0..ns).contains(&ny);
        let step = match (cross_x, cross_y) {
            (true, true) => (dx.signum(), dy.signum()),
            (true, false) => (dx.signum(), 0),
            _ => (0, dy.signum()),
        };
        let Some(next_base) = adjacent_base(base, step.0, step.1) else {
            continue;
        };

        let (fx, fy) = carry_across(base, next_base, nx, ny, ns);
        if (0..ns).contains(&fx) && (0..ns).contains(&fy) {
            out.push(compose(next_base, fx as u64, fy as u64, depth));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Projection: (lon, lat) <-> (base, x, y)
// ---------------------------------------------------------------------------

fn normalize_lon(mut lon: f64) -> f64 {
    if lon < 0.0 {
        lon += TAU;
    }
    if lon >= TAU {
        lon -= TAU;
    }
    lon
}

fn locate(lon: f64, lat: f64, ns: f64) -> (u64, u64, u64) {
    let z = lat.sin();
    let phi = normalize_lon(lon);
    let phi_t = phi % FRAC_PI_2;
    let column = ((phi / FRAC_PI_2).floor() as i64).rem_euclid(4) as u64;
    let last = ns as u64 - 1;

    if z.abs() >= 2.0 / 3.0 {
        let north = z >= 0.0;
        let sign = if north { 1.0 } else { -1.0 };

        // Distances from the polar corner along both cell axes.
        let kx = ((1.0 - z * sign) * 3.0 * (ns * (2.0 * phi_t - PI) / PI).powi(2))
            .max(0.0)
            .sqrt();
        let ky = ((1.0 - z * sign) * 3.0 * (ns * 2.0 * phi_t / PI).powi(2))
            .max(0.0)
            .sqrt();

        let (xx, yy) = if north { (ns - kx, ns - ky) } else { (ky, kx) };
        let x = (xx.floor() as u64).min(last);
        let y = (yy.floor() as u64).min(last);
        let base = if north { column } else { 8 + column };
        return (base, x, y);
    }

    let zunits = (z + 2.0 / 3.0) / (4.0 / 3.0);
    let phiunits = phi_t / FRAC_PI_2;
    let mut xx = (zunits + phiunits) * ns;
    let mut yy = (zunits - phiunits + 1.0) * ns;

    let base = match (xx >= ns, yy >= ns) {
        (true, true) => {
            xx -= ns;
            yy -= ns;
            column
        }
        (true, false) => {
            xx -= ns;
            ((column + 1) % 4) + 4
        }
        (false, true) => {
            yy -= ns;
            column + 4
        }
        (false, false) => 8 + column,
    };

    let x = (xx.floor() as u64).min(last);
    let y = (yy.floor() as u64).min(last);
    (base, x, y)
}

fn unproject(base: u64, x: f64, y: f64, ns: f64) -> (f64, f64) {
    let (xn, yn) = (x / ns, y / ns);
    let polar = match base_row(base) {
        Row::North => xn + yn > 1.0,
        Row::South => xn + yn < 1.0,
        Row::Equator => false,
    };

    if !polar {
        let (phi_off, z_off, col) = match base_row(base) {
            Row::North => (1.0, 0.0, base),
            Row::Equator => (0.0, -1.0, base - 4),
            Row::South => (1.0, -2.0, base - 8),
        };
        let z = (2.0 / 3.0) * (xn + yn + z_off);
        let phi = FRAC_PI_4 * (xn - yn + phi_off + 2.0 * col as f64);
        return (normalize_lon(phi), z.clamp(-1.0, 1.0).asin());
    }

    let north = base_row(base) == Row::North;
    let sign = if north { 1.0 } else { -1.0 };
    // Work in north-cap orientation.
    let (px, py) = if north { (x, y) } else { (ns - y, ns - x) };
    let kx = ns - px;
    let ky = ns - py;

    let phi_t = if kx + ky == 0.0 {
        0.0
    } else {
        PI * ky / (2.0 * (kx + ky))
    };

    let (k, denom) = if phi_t < FRAC_PI_4 {
        (kx, (2.0 * phi_t - PI) * ns)
    } else {
        (ky, 2.0 * phi_t * ns)
    };
    let z = if denom.abs() < 1e-15 {
        sign
    } else {
        let v = PI * k / denom;
        (1.0 - v * v / 3.0) * sign
    };

    let col = if north { base } else { base - 8 };
    let phi = FRAC_PI_2 * col as f64 + phi_t;
    (normalize_lon(phi), z.clamp(-1.0, 1.0).asin())
}

// ---------------------------------------------------------------------------
// Z-order interleaving
// ---------------------------------------------------------------------------

fn compose(base: u64, x: u64, y: u64, depth: u8) -> u64 {
    base * nside(depth) * nside(depth) + interleave(x, y)
}

fn decompose(cell: u64, depth: u8) -> (u64, u64, u64) {
    let per_base = nside(depth) * nside(depth);
    let (x, y) = deinterleave(cell % per_base);
    (cell / per_base, x, y)
}

/// x supplies the even bits, y the odd bits.
fn interleave(mut x: u64, mut y: u64) -> u64 {
    let mut out = 0u64;
    let mut bit = 0;
    while x > 0 || y > 0 {
        out |= (x & 1) << bit;
        out |= (y & 1) << (bit + 1);
        bit += 2;
        x >>= 1;
        y >>= 1;
    }
    out
}

fn deinterleave(mut sub: u64) -> (u64, u64) {
    let (mut x, mut y) = (0u64, 0u64);
    let mut bit = 0;
    while sub > 0 {
        x |= (sub & 1) << bit;
        y |= ((sub >> 1) & 1) << bit;
        sub >>= 2;
        bit += 1;
    }
    (x, y)
}

// ---------------------------------------------------------------------------
// Base cell adjacency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    North,
    Equator,
    South,
}

fn base_row(base: u64) -> Row {
    match base {
        0..=3 => Row::North,
        4..=7 => Row::Equator,
        _ => Row::South,
    }
}

/// Base cell reached by stepping `(dx, dy)` out of `base`, each in `-1..=1`.
fn adjacent_base(base: u64, dx: i64, dy: i64) -> Option<u64> {
    if dx == 0 && dy == 0 {
        return Some(base);
    }
    let b = base as i64;
    let id = |v: i64| Some(v as u64);

    match base_row(base) {
        Row::North => match (dx, dy) {
            (1, 0) => id((b + 1) % 4),
            (0, 1) => id((b + 3) % 4),
            (1, 1) => id((b + 2) % 4),
            (-1, 0) => id(b + 4),
            (0, -1) => id(4 + (b + 1) % 4),
            (-1, -1) => id(b + 8),
            _ => None,
        },
        Row::South => {
            let col = b - 8;
            match (dx, dy) {
                (1, 0) => id(4 + (col + 1) % 4),
                (0, 1) => id(col + 4),
                (1, 1) => id(col),
                (-1, 0) => id(8 + (col + 3) % 4),
                (0, -1) => id(8 + (col + 1) % 4),
                (-1, -1) => id(8 + (col + 2) % 4),
                _ => None,
            }
        }
        Row::Equator => {
            let col = b - 4;
            match (dx, dy) {
                (1, 0) => id(col),
                (0, 1) => id((col + 3) % 4),
                (-1, 0) => id(8 + (col + 3) % 4),
                (0, -1) => id(col + 8),
                (1, -1) => id(4 + (col + 1) % 4),
                (-1, 1) => id(4 + (col + 3) % 4),
                _ => None,
            }
        }
    }
}

/// Map out-of-range `(nx, ny)` from `from` into coordinates inside `to`.
fn carry_across(from: u64, to: u64, nx: i64, ny: i64, ns: i64) -> (i64, i64) {
    let crossed_x = !(0..ns).contains(&nx);
    let crossed_y = !(0..ns).contains(&ny);

    match (base_row(from), base_row(to)) {
        // Polar caps meet edge-to-edge with the axes swapped.
        (Row::North, Row::North) => match (crossed_x, crossed_y) {
            (true, false) => (ny, ns - 1),
            (false, true) => (ns - 1, nx),
            _ => (ns - 1, ns - 1),
        },
        (Row::South, Row::South) => match (crossed_x, crossed_y) {
            (true, false) => (ny.rem_euclid(ns), 0),
            (false, true) => (0, nx.rem_euclid(ns)),
            _ => (0, 0),
        },
        _ => (nx.rem_euclid(ns), ny.rem_euclid(ns)),
    }
}
