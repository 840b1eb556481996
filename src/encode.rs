//! Encodes clipped, tile-local features into a Mapbox Vector Tile payload.

use geo::orient::{Direction, Orient};
use geo_types::{Geometry, LineString, MultiPolygon, Polygon};
use mvt::{GeomData, GeomEncoder, GeomType, Tile};
use serde_json::Value;

use crate::error::Error;
use crate::geom::FeatureCollection;

/// Encodes the collection as one tile layer and returns the protobuf bytes.
///
/// Geometry must already be in tile-local `[0, extent]` coordinates.
pub fn encode(collection: &FeatureCollection, layer_name: &str, extent: u32) -> Result<Vec<u8>, Error> {
    let mut tile = Tile::new(extent);
    let mut layer = tile.create_layer(layer_name);

    for feature in &collection.features {
        // An MVT feature holds one geometry type, so a collection becomes
        // one encoded feature per member, all carrying the same tags.
        for geometry in flattened(&feature.geometry) {
            let Some(data) = encode_geometry(geometry)? else {
                continue;
            };
            let mut out = layer.into_feature(data);
            if let Ok(id) = feature.id.parse::<u64>() {
                out.set_id(id);
            }
            for (key, value) in &feature.properties {
                match value {
                    Value::String(s) => out.add_tag_string(key, s),
                    Value::Bool(b) => out.add_tag_bool(key, *b),
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            out.add_tag_sint(key, i);
                        } else if let Some(f) = n.as_f64() {
                            out.add_tag_double(key, f);
                        }
                    }
                    // Nested values have no MVT tag representation.
                    _ => {}
                }
            }
            layer = out.into_layer();
        }
    }

    tile.add_layer(layer)?;
    Ok(tile.to_bytes()?)
}

/// Expands nested collections into their leaf geometries.
fn flattened(geometry: &Geometry<f64>) -> Vec<&Geometry<f64>> {
    match geometry {
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(flattened).collect(),
        other => vec![other],
    }
}

fn encode_geometry(geometry: &Geometry<f64>) -> Result<Option<GeomData>, Error> {
    let data = match geometry {
        Geometry::Point(p) => GeomEncoder::new(GeomType::Point)
            .point(p.x(), p.y())?
            .encode()?,
        Geometry::MultiPoint(mp) => {
            let mut enc = GeomEncoder::new(GeomType::Point);
            for p in &mp.0 {
                enc = enc.point(p.x(), p.y())?;
            }
            enc.encode()?
        }
        Geometry::LineString(ls) => {
            let mut enc = GeomEncoder::new(GeomType::Linestring);
            for c in &ls.0 {
                enc = enc.point(c.x, c.y)?;
            }
            enc.encode()?
        }
        Geometry::MultiLineString(mls) => {
            let mut enc = GeomEncoder::new(GeomType::Linestring);
            for ls in &mls.0 {
                for c in &ls.0 {
                    enc = enc.point(c.x, c.y)?;
                }
                enc.complete_geom()?;
            }
            enc.encode()?
        }
        Geometry::Polygon(p) => encode_polygons(std::slice::from_ref(p))?,
        Geometry::MultiPolygon(MultiPolygon(polygons)) => encode_polygons(polygons)?,
        // Collections are flattened before this point; the clipper
        // rewrites Line, Rect and Triangle into the multi variants.
        _ => return Ok(None),
    };
    Ok(Some(data))
}

fn encode_polygons(polygons: &[Polygon<f64>]) -> Result<GeomData, Error> {
    let mut enc = GeomEncoder::new(GeomType::Polygon);
    for polygon in polygons {
        // Positive-area exterior, negative-area interiors, as MVT requires.
        let oriented = polygon.orient(Direction::Default);
        enc = encode_ring(enc, oriented.exterior())?;
        for interior in oriented.interiors() {
            enc = encode_ring(enc, interior)?;
        }
    }
    enc.encode().map_err(Error::from)
}

fn encode_ring(
    mut enc: GeomEncoder<f64>,
    ring: &LineString<f64>,
) -> Result<GeomEncoder<f64>, Error> {
    // Rings arrive closed; MVT closes them itself, so drop the repeated
    // final vertex.
    let coords = if ring.is_closed() && ring.0.len() > 1 {
        &ring.0[..ring.0.len() - 1]
    } else {
        &ring.0[..]
    };
    for c in coords {
        enc = enc.point(c.x, c.y)?;
    }
    enc.complete_geom()?;
    Ok(enc)
}

#[cfg(test)]
mod tests {
    use geo_types::{Geometry, Point, Polygon};
    use serde_json::Map;

    use super::*;
    use crate::geom::Feature;

    fn collection(geometry: Geometry<f64>) -> FeatureCollection {
        let mut properties = Map::new();
        properties.insert("crop_descr".to_string(), serde_json::json!("wheat"));
        properties.insert("variety_code".to_string(), serde_json::json!(7));
        FeatureCollection {
            features: vec![Feature {
                id: "42".to_string(),
                geometry,
                properties,
            }],
        }
    }

    #[test]
    fn test_encode_point() {
        let bytes = encode(
            &collection(Geometry::Point(Point::new(2048.0, 2048.0))),
            "base",
            4096,
        )
        .unwrap();
        assert_ne!(0, bytes.len());
    }

    #[test]
    fn test_encode_polygon() {
        let square = Polygon::new(
            vec![
                (0.0, 0.0),
                (1024.0, 0.0),
                (1024.0, 1024.0),
                (0.0, 1024.0),
                (0.0, 0.0),
            ]
            .into(),
            vec![],
        );
        let bytes = encode(&collection(Geometry::Polygon(square)), "base", 4096).unwrap();
        assert_ne!(0, bytes.len());
    }

    #[test]
    fn test_geometry_collection_members_are_encoded() {
        // A collection feature must not vanish from the tile: each member
        // is encoded, so the payload matches the plain-geometry encoding.
        let point = Geometry::Point(Point::new(2048.0, 2048.0));
        let grouped = Geometry::GeometryCollection(geo_types::GeometryCollection(vec![
            point.clone(),
        ]));
        let from_collection = encode(&collection(grouped), "base", 4096).unwrap();
        let from_point = encode(&collection(point), "base", 4096).unwrap();
        assert_eq!(from_point, from_collection);
        assert_ne!(
            encode(&FeatureCollection::default(), "base", 4096).unwrap(),
            from_collection
        );
    }

    #[test]
    fn test_nested_geometry_collections_flatten() {
        let inner = geo_types::GeometryCollection(vec![Geometry::Point(Point::new(1.0, 2.0))]);
        let outer = Geometry::GeometryCollection(geo_types::GeometryCollection(vec![
            Geometry::GeometryCollection(inner),
            Geometry::Point(Point::new(3.0, 4.0)),
        ]));
        assert_eq!(2, flattened(&outer).len());
    }

    #[test]
    fn test_empty_collection_still_encodes() {
        let bytes = encode(&FeatureCollection::default(), "base", 4096).unwrap();
        // A layer header is still present.
        assert_ne!(0, bytes.len());
    }
}
