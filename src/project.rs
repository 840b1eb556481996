//! Projection between WGS84 and the normalized web-mercator space the
//! store and clipper work in.
//!
//! Geometry is projected exactly once, at ingest time, into `[0,1]^2`
//! world coordinates (x east, y south). Query windows are projected the
//! same way, so spatial predicates and stored geometry always compare in
//! one space and the tile path never re-projects after a fetch.

use std::f64::consts::PI;

use geo::MapCoords;
use geo_types::Coord;

use crate::coord::{GeoBoundingBox, TileCoordinate};
use crate::geom::FeatureCollection;

/// Projects one WGS84 position into normalized world space.
pub fn project_lonlat(lon: f64, lat: f64) -> Coord<f64> {
    let x = lon / 360.0 + 0.5;
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    Coord {
        x,
        y: y.clamp(0.0, 1.0),
    }
}

/// Projects a geographic box; the y axis flips, so the geographic north
/// edge becomes the projected minimum y.
pub fn project_bbox(bbox: &GeoBoundingBox) -> ProjectedBoundingBox {
    let nw = project_lonlat(bbox.min_lon, bbox.max_lat);
    let se = project_lonlat(bbox.max_lon, bbox.min_lat);
    ProjectedBoundingBox {
        min_x: nw.x,
        min_y: nw.y,
        max_x: se.x,
        max_y: se.y,
    }
}

/// Axis-aligned box in normalized world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedBoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Projects every geometry in the collection into normalized world space.
pub fn project_features(collection: FeatureCollection) -> FeatureCollection {
    let features = collection
        .features
        .into_iter()
        .map(|mut f| {
            f.geometry = f.geometry.map_coords(|c| project_lonlat(c.x, c.y));
            f
        })
        .collect();
    FeatureCollection { features }
}

/// Rescales clipped geometry (already multiplied by `2^z`) into
/// tile-local `[0, extent]` space for the encoder. Buffered geometry may
/// land slightly outside that range; the encoder tolerates it.
pub fn transform_tile(
    collection: FeatureCollection,
    coord: TileCoordinate,
    extent: u32,
) -> FeatureCollection {
    let extent = f64::from(extent);
    let tx = f64::from(coord.x());
    let ty = f64::from(coord.y());
    let features = collection
        .features
        .into_iter()
        .map(|mut f| {
            f.geometry = f.geometry.map_coords(|c| Coord {
                x: (c.x - tx) * extent,
                y: (c.y - ty) * extent,
            });
            f
        })
        .collect();
    FeatureCollection { features }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use geo_types::{Geometry, Point};
    use serde_json::Map;

    use super::*;
    use crate::geom::Feature;

    #[test]
    fn test_origin_projects_to_center() {
        let c = project_lonlat(0.0, 0.0);
        assert_approx_eq!(0.5, c.x);
        assert_approx_eq!(0.5, c.y);
    }

    #[test]
    fn test_axes_orientation() {
        // East of Greenwich moves x up; north of the equator moves y down.
        let c = project_lonlat(90.0, 45.0);
        assert!(c.x > 0.5);
        assert!(c.y < 0.5);
    }

    #[test]
    fn test_projected_tile_bbox_matches_tile_arithmetic() {
        // A tile's projected window is exactly its slot in the 2^z grid.
        let coord = crate::coord::TileCoordinate::new(3, 2, 2).unwrap();
        let projected = project_bbox(&coord.bbox());
        assert_approx_eq!(2.0 / 8.0, projected.min_x, 1e-9);
        assert_approx_eq!(3.0 / 8.0, projected.max_x, 1e-9);
        assert_approx_eq!(2.0 / 8.0, projected.min_y, 1e-9);
        assert_approx_eq!(3.0 / 8.0, projected.max_y, 1e-9);
    }

    #[test]
    fn test_transform_tile() {
        let coord = crate::coord::TileCoordinate::new(3, 2, 2).unwrap();
        // Center of tile 3/2/2 in scaled world coordinates.
        let collection = FeatureCollection {
            features: vec![Feature {
                id: "f".to_string(),
                geometry: Geometry::Point(Point::new(2.5, 2.5)),
                properties: Map::new(),
            }],
        };
        let local = transform_tile(collection, coord, 4096);
        match &local.features[0].geometry {
            Geometry::Point(p) => {
                assert_approx_eq!(2048.0, p.x());
                assert_approx_eq!(2048.0, p.y());
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
    }
}
