//! Feature model and wire/storage codecs.
//!
//! Features cross three representations: GeoJSON on the ingest wire, WKT text
//! in the store, and `geo_types::Geometry` in memory. This module owns the
//! conversions between them.

use geo_types::Geometry;
use geojson::GeoJson;
use serde_json::{Map, Value};
use wkt::{ToWkt, TryFromWkt};

use crate::error::Error;

/// One vector feature: geometry plus free-form attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// An ordered collection of features. Order is whatever the producer
/// (wire document or store result set) delivered; it carries no spatial
/// meaning.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Parses a whole GeoJSON `FeatureCollection` document.
    pub fn from_geojson(data: &str) -> Result<FeatureCollection, Error> {
        match data.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(fc) => {
                let features = fc
                    .features
                    .into_iter()
                    .map(Feature::from_geojson_feature)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FeatureCollection { features })
            }
            GeoJson::Feature(f) => Ok(FeatureCollection {
                features: vec![Feature::from_geojson_feature(f)?],
            }),
            GeoJson::Geometry(_) => Err(Error::UnsupportedDocument(
                "expected a Feature or FeatureCollection document".to_string(),
            )),
        }
    }

    /// Parses a newline-delimited stream where every line is one GeoJSON
    /// `Feature` document. Blank lines are skipped.
    pub fn from_lines(data: &str) -> Result<FeatureCollection, Error> {
        let mut features = Vec::new();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<GeoJson>()? {
                GeoJson::Feature(f) => features.push(Feature::from_geojson_feature(f)?),
                _ => {
                    return Err(Error::UnsupportedDocument(
                        "each line must be a single Feature document".to_string(),
                    ))
                }
            }
        }
        Ok(FeatureCollection { features })
    }
}

impl Feature {
    fn from_geojson_feature(f: geojson::Feature) -> Result<Feature, Error> {
        let raw = f.geometry.ok_or_else(|| {
            Error::UnsupportedDocument("feature is missing its geometry".to_string())
        })?;
        let geometry = Geometry::<f64>::try_from(raw)?;
        let id = match f.id {
            Some(geojson::feature::Id::String(s)) => s,
            Some(geojson::feature::Id::Number(n)) => n.to_string(),
            None => String::new(),
        };
        Ok(Feature {
            id,
            geometry,
            properties: f.properties.unwrap_or_default(),
        })
    }

    /// Serializes the geometry to WKT for storage.
    pub fn geometry_wkt(&self) -> String {
        self.geometry.wkt_string()
    }

    /// Reconstructs a feature from one store row's columns.
    ///
    /// A malformed geometry is an error for this row; the caller decides
    /// whether that dooms the whole result set (the tile path does).
    pub fn from_stored(id: String, wkt: &str, properties: Map<String, Value>) -> Result<Feature, Error> {
        let geometry = Geometry::<f64>::try_from_wkt_str(wkt).map_err(|e| Error::GeometryDecode {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Feature {
            id,
            geometry,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use geo_types::Geometry;

    use super::*;

    const POINT_FEATURE: &str = r#"{"type":"Feature","id":"f-1","geometry":{"type":"Point","coordinates":[13.4,52.5]},"properties":{"crop_descr":"wheat","variety_code":7}}"#;

    #[test]
    fn test_whole_document_parse() {
        let doc = format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, POINT_FEATURE);
        let collection = FeatureCollection::from_geojson(&doc).unwrap();
        assert_eq!(1, collection.len());
        let feature = &collection.features[0];
        assert_eq!("f-1", feature.id);
        assert_eq!(
            Some(&serde_json::json!("wheat")),
            feature.properties.get("crop_descr")
        );
        assert!(matches!(feature.geometry, Geometry::Point(_)));
    }

    #[test]
    fn test_line_delimited_parse() {
        let data = format!("{}\n\n{}\n", POINT_FEATURE, POINT_FEATURE);
        let collection = FeatureCollection::from_lines(&data).unwrap();
        assert_eq!(2, collection.len());
    }

    #[test]
    fn test_both_wire_shapes_agree() {
        let doc = format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, POINT_FEATURE);
        let whole = FeatureCollection::from_geojson(&doc).unwrap();
        let lines = FeatureCollection::from_lines(POINT_FEATURE).unwrap();
        assert_eq!(whole, lines);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(FeatureCollection::from_geojson("{not json").is_err());
        assert!(FeatureCollection::from_lines("{not json").is_err());
    }

    #[test]
    fn test_wkt_round_trip() {
        let doc = format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, POINT_FEATURE);
        let collection = FeatureCollection::from_geojson(&doc).unwrap();
        let original = &collection.features[0];
        let restored = Feature::from_stored(
            original.id.clone(),
            &original.geometry_wkt(),
            original.properties.clone(),
        )
        .unwrap();
        assert_eq!(*original, restored);
    }

    #[test]
    fn test_bad_wkt_reports_the_feature() {
        let err = Feature::from_stored("f-9".to_string(), "POINT(not numbers", Map::new())
            .unwrap_err();
        match err {
            Error::GeometryDecode { id, .. } => assert_eq!("f-9", id),
            other => panic!("unexpected error: {}", other),
        }
    }
}
