//! Geohash cell arithmetic.
//!
//! Cells are addressed by integer (lat, lon) grid indices at a given
//! precision and rendered as standard base32 geohash strings, so a coarser
//! cell is always a string prefix of the finer cells it contains.

use crate::error::{CurbsideError, Result};
use crate::geo::point::{BoundingBox, GeoPoint};
use std::collections::BTreeSet;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MIN_PRECISION: usize = 1;
pub const MAX_PRECISION: usize = 12;

/// (latitude bits, longitude bits) for a precision. Longitude gets the odd bit.
pub fn bits_for(precision: usize) -> (u32, u32) {
    let total = (precision * 5) as u32;
    (total / 2, total - total / 2)
}

/// Cell height and width in degrees.
pub fn cell_size_deg(precision: usize) -> (f64, f64) {
    let (lat_bits, lon_bits) = bits_for(precision);
    (
        180.0 / (1u64 << lat_bits) as f64,
        360.0 / (1u64 << lon_bits) as f64,
    )
}

fn axis_index(value: f64, min: f64, span: f64, bits: u32) -> u64 {
    let cells = 1u64 << bits;
    let raw = ((value - min) / span * cells as f64).floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as u64).min(cells - 1)
    }
}

fn indices(point: &GeoPoint, precision: usize) -> (u64, u64) {
    let (lat_bits, lon_bits) = bits_for(precision);
    (
        axis_index(point.latitude, -90.0, 180.0, lat_bits),
        axis_index(point.longitude, -180.0, 360.0, lon_bits),
    )
}

fn encode_indices(lat_idx: u64, lon_idx: u64, precision: usize) -> String {
    let (lat_bits, lon_bits) = bits_for(precision);
    let total = lat_bits + lon_bits;

    let mut bits: u64 = 0;
    for i in 0..total {
        let bit = if i % 2 == 0 {
            (lon_idx >> (lon_bits - 1 - i / 2)) & 1
        } else {
            (lat_idx >> (lat_bits - 1 - i / 2)) & 1
        };
        bits = (bits << 1) | bit;
    }

    (0..precision)
        .map(|c| {
            let shift = total - 5 * (c as u32 + 1);
            BASE32[((bits >> shift) & 0x1f) as usize] as char
        })
        .collect()
}

pub fn validate_precision(precision: usize) -> Result<()> {
    if (MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        Ok(())
    } else {
        Err(CurbsideError::Config(format!(
            "geohash precision must be between {MIN_PRECISION} and {MAX_PRECISION}, got {precision}"
        )))
    }
}

/// Geohash of the cell containing `point`.
pub fn encode(point: &GeoPoint, precision: usize) -> String {
    let (lat_idx, lon_idx) = indices(point, precision);
    encode_indices(lat_idx, lon_idx, precision)
}

/// Bounds of the cell named by `hash`.
pub fn decode_bounds(hash: &str) -> Result<BoundingBox> {
    let precision = hash.len();
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(CurbsideError::validation(format!("invalid geohash length: {precision}")));
    }

    let mut bits: u64 = 0;
    for ch in hash.bytes() {
        let value = BASE32
            .iter()
            .position(|b| *b == ch)
            .ok_or_else(|| CurbsideError::validation(format!("invalid geohash character: {}", ch as char)))?;
        bits = (bits << 5) | value as u64;
    }

    let (lat_bits, lon_bits) = bits_for(precision);
    let total = lat_bits + lon_bits;
    let (mut lat_idx, mut lon_idx) = (0u64, 0u64);
    for i in 0..total {
        let bit = (bits >> (total - 1 - i)) & 1;
        if i % 2 == 0 {
            lon_idx = (lon_idx << 1) | bit;
        } else {
            lat_idx = (lat_idx << 1) | bit;
        }
    }

    let (lat_deg, lon_deg) = cell_size_deg(precision);
    let min_lat = -90.0 + lat_idx as f64 * lat_deg;
    let min_lon = -180.0 + lon_idx as f64 * lon_deg;
    Ok(BoundingBox {
        min_lat,
        max_lat: min_lat + lat_deg,
        min_lon,
        max_lon: min_lon + lon_deg,
    })
}

fn index_ranges(bbox: &BoundingBox, precision: usize) -> Vec<((u64, u64), (u64, u64))> {
    let (lat_bits, lon_bits) = bits_for(precision);
    let lat_range = (
        axis_index(bbox.min_lat, -90.0, 180.0, lat_bits),
        axis_index(bbox.max_lat, -90.0, 180.0, lat_bits),
    );
    bbox.lon_ranges()
        .into_iter()
        .map(|(lo, hi)| {
            (
                lat_range,
                (
                    axis_index(lo, -180.0, 360.0, lon_bits),
                    axis_index(hi, -180.0, 360.0, lon_bits),
                ),
            )
        })
        .collect()
}

/// Number of cells at `precision` that intersect `bbox`.
pub fn cover_count(bbox: &BoundingBox, precision: usize) -> u64 {
    index_ranges(bbox, precision)
        .iter()
        .map(|((lat_lo, lat_hi), (lon_lo, lon_hi))| (lat_hi - lat_lo + 1) * (lon_hi - lon_lo + 1))
        .sum()
}

/// Finest precision (not finer than `max_precision`) whose cover of `bbox`
/// stays within `max_cells`.
pub fn choose_cover_precision(bbox: &BoundingBox, max_precision: usize, max_cells: usize) -> usize {
    (MIN_PRECISION..=max_precision)
        .rev()
        .find(|p| cover_count(bbox, *p) <= max_cells as u64)
        .unwrap_or(MIN_PRECISION)
}

/// Every cell at `precision` that intersects `bbox`, sorted.
pub fn covering_cells(bbox: &BoundingBox, precision: usize) -> Vec<String> {
    let mut cells = BTreeSet::new();
    for ((lat_lo, lat_hi), (lon_lo, lon_hi)) in index_ranges(bbox, precision) {
        for lat_idx in lat_lo..=lat_hi {
            for lon_idx in lon_lo..=lon_hi {
                cells.insert(encode_indices(lat_idx, lon_idx, precision));
            }
        }
    }
    cells.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::point::bounding_box;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn encodes_reference_hashes() {
        // Well-known reference values
        assert_eq!(encode(&pt(57.64911, 10.40744), 11), "u4pruydqqvj");
        assert_eq!(encode(&pt(37.7749, -122.4194), 5), "9q8yy");
        assert_eq!(encode(&pt(-90.0, -180.0), 3), "000");
        assert_eq!(encode(&pt(90.0, 180.0), 3), "zzz");
    }

    #[test]
    fn coarser_hash_is_prefix_of_finer() {
        let p = pt(47.6062, -122.3321);
        let fine = encode(&p, 9);
        for precision in 1..9 {
            assert!(fine.starts_with(&encode(&p, precision)));
        }
    }

    #[test]
    fn decoded_bounds_contain_point() {
        let p = pt(37.7749, -122.4194);
        let bounds = decode_bounds(&encode(&p, 7)).unwrap();
        assert!(bounds.contains(&p));
        let (h, w) = cell_size_deg(7);
        assert!((bounds.max_lat - bounds.min_lat - h).abs() < 1e-12);
        assert!((bounds.max_lon - bounds.min_lon - w).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_hashes() {
        assert!(decode_bounds("").is_err());
        assert!(decode_bounds("9q8a").is_err());
    }

    #[test]
    fn cover_contains_center_cell_and_respects_budget() {
        let c = pt(37.7749, -122.4194);
        let bbox = bounding_box(&c, 5_000.0);
        let precision = choose_cover_precision(&bbox, 7, 36);
        let cells = covering_cells(&bbox, precision);
        assert!(cells.len() <= 36);
        assert!(cells.contains(&encode(&c, precision)));
        assert_eq!(cells.len() as u64, cover_count(&bbox, precision));
    }

    #[test]
    fn cover_splits_across_antimeridian() {
        let bbox = bounding_box(&pt(0.0, 179.999), 2_000.0);
        let precision = choose_cover_precision(&bbox, 6, 36);
        let cells = covering_cells(&bbox, precision);
        assert!(cells.contains(&encode(&pt(0.0, 179.999), precision)));
        assert!(cells.contains(&encode(&pt(0.0, -179.999), precision)));
    }

    #[test]
    fn precision_bounds_are_validated() {
        assert!(validate_precision(0).is_err());
        assert!(validate_precision(13).is_err());
        assert!(validate_precision(7).is_ok());
    }
}
