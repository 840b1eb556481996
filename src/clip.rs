//! Clips projected features to a buffered tile window.
//!
//! Coordinates come in as normalized world space; they leave scaled by
//! `2^z` and cut to the window, ready for the tile-local transform. The
//! actual geometry surgery is `geo`'s boolean ops; this module only
//! routes each geometry kind to the right operation.

use geo::{BooleanOps, Intersects, MapCoords};
use geo_types::{
    Coord, Geometry, GeometryCollection, MultiLineString, MultiPoint, MultiPolygon, Polygon, Rect,
};

use crate::coord::ClipWindow;
use crate::geom::FeatureCollection;

/// Clips every feature to the window. Features whose geometry falls
/// entirely outside are dropped; the survivors' coordinates are in
/// scaled world space (`world * 2^z`).
pub fn clip(collection: FeatureCollection, window: &ClipWindow) -> FeatureCollection {
    let rect = Rect::new(
        Coord {
            x: window.x0,
            y: window.y0,
        },
        Coord {
            x: window.x1,
            y: window.y1,
        },
    );
    let features = collection
        .features
        .into_iter()
        .filter_map(|mut f| {
            let scaled = f.geometry.map_coords(|c| Coord {
                x: c.x * window.scale,
                y: c.y * window.scale,
            });
            clip_geometry(scaled, &rect).map(|g| {
                f.geometry = g;
                f
            })
        })
        .collect();
    FeatureCollection { features }
}

fn clip_geometry(geometry: Geometry<f64>, rect: &Rect<f64>) -> Option<Geometry<f64>> {
    let window = rect.to_polygon();
    match geometry {
        Geometry::Point(p) => rect.intersects(&p).then_some(Geometry::Point(p)),
        Geometry::MultiPoint(mp) => {
            let kept: Vec<_> = mp.into_iter().filter(|p| rect.intersects(p)).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Geometry::MultiPoint(MultiPoint::new(kept)))
            }
        }
        Geometry::Line(l) => clip_lines(MultiLineString::new(vec![l.into()]), &window),
        Geometry::LineString(ls) => clip_lines(MultiLineString::new(vec![ls]), &window),
        Geometry::MultiLineString(mls) => clip_lines(mls, &window),
        Geometry::Polygon(p) => clip_polygons(MultiPolygon::new(vec![p]), &window),
        Geometry::MultiPolygon(mp) => clip_polygons(mp, &window),
        Geometry::Rect(r) => clip_polygons(MultiPolygon::new(vec![r.to_polygon()]), &window),
        Geometry::Triangle(t) => clip_polygons(MultiPolygon::new(vec![t.to_polygon()]), &window),
        Geometry::GeometryCollection(gc) => {
            let kept: Vec<_> = gc
                .into_iter()
                .filter_map(|g| clip_geometry(g, rect))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Geometry::GeometryCollection(GeometryCollection(kept)))
            }
        }
    }
}

fn clip_lines(lines: MultiLineString<f64>, window: &Polygon<f64>) -> Option<Geometry<f64>> {
    let cut = window.clip(&lines, false);
    if cut.0.is_empty() {
        None
    } else {
        Some(Geometry::MultiLineString(cut))
    }
}

fn clip_polygons(polygons: MultiPolygon<f64>, window: &Polygon<f64>) -> Option<Geometry<f64>> {
    let cut = MultiPolygon::new(vec![window.clone()]).intersection(&polygons);
    if cut.0.is_empty() {
        None
    } else {
        Some(Geometry::MultiPolygon(cut))
    }
}
