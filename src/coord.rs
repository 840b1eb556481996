//! Tile coordinates and the windows derived from them.

use serde::Deserialize;
use slippy_map_tilenames as smt;

use crate::error::Error;

/// One slippy-map tile in XYZ addressing.
///
/// Instances only exist for valid coordinates: construction checks
/// `x, y < 2^z`, so downstream code never sees an out-of-range tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileCoordinate {
    z: u8,
    x: u32,
    y: u32,
}

impl TileCoordinate {
    /// Validates raw path parameters into a tile coordinate.
    ///
    /// Parameters arrive signed so negative input fails here with
    /// `InvalidTileCoordinate` instead of being defaulted away upstream.
    pub fn new(z: i32, x: i64, y: i64) -> Result<TileCoordinate, Error> {
        let err = Error::InvalidTileCoordinate { z, x, y };
        if !(0..=30).contains(&z) {
            return Err(err);
        }
        let tiles = 1i64 << z;
        if !(0..tiles).contains(&x) || !(0..tiles).contains(&y) {
            return Err(err);
        }
        Ok(TileCoordinate {
            z: z as u8,
            x: x as u32,
            y: y as u32,
        })
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Number of tiles along one axis at this zoom.
    pub fn scale(&self) -> f64 {
        (1u32 << self.z) as f64
    }

    /// The tile's extent in geographic coordinates.
    pub fn bbox(&self) -> GeoBoundingBox {
        let (min_lon, max_lat) = smt::tile2lonlat(self.x, self.y, self.z);
        let (max_lon, min_lat) = smt::tile2lonlat(self.x + 1, self.y + 1, self.z);
        GeoBoundingBox {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// The buffer-extended clip window for this tile in normalized
    /// world coordinates multiplied by `2^z`.
    pub fn clip_window(&self, buffer: u32, extent: u32) -> ClipWindow {
        let k1 = 0.5 * f64::from(buffer) / f64::from(extent);
        let x = f64::from(self.x);
        let y = f64::from(self.y);
        ClipWindow {
            scale: self.scale(),
            x0: x - k1,
            x1: x + 1.0 + k1,
            y0: y - k1,
            y1: y + 1.0 + k1,
        }
    }
}

/// Geographic (WGS84 lon/lat) bounding box, south-west to north-east.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// The padded window handed to the clipper: one tile plus `k1` on each
/// side, where `k1 = 0.5 * buffer / extent`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipWindow {
    pub scale: f64,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
}

/// Raw, unvalidated tile path parameters as they come off the wire.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RawTileCoordinate {
    pub z: i32,
    pub x: i64,
    pub y: i64,
}

impl TryFrom<RawTileCoordinate> for TileCoordinate {
    type Error = Error;

    fn try_from(raw: RawTileCoordinate) -> Result<TileCoordinate, Error> {
        TileCoordinate::new(raw.z, raw.x, raw.y)
    }
}
