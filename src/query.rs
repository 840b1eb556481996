//! Builds the spatial store query for one tile request.
//!
//! A tile coordinate becomes a geographic box, the box becomes a spatial
//! predicate (WKT polygon intersection or scalar bbox bounds, depending on
//! the deployment), and the attribute filter becomes typed bind parameters.

use chrono::NaiveDate;
use geo_types::{Coord, LineString, Polygon};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use wkt::ToWkt;

use crate::config::PredicateKind;
use crate::coord::{GeoBoundingBox, TileCoordinate};
use crate::error::Error;
use crate::project::{project_bbox, project_lonlat, ProjectedBoundingBox};

/// Attribute constraints parsed from the request's opaque `filter` object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileFilter {
    pub img_date: NaiveDate,
}

impl TileFilter {
    /// Parses the raw filter JSON. A missing document or a missing
    /// `img_date` key falls back to the configured default; a present but
    /// malformed value is an `InvalidFilter` error.
    pub fn parse(raw: Option<&str>, default_img_date: NaiveDate) -> Result<TileFilter, Error> {
        let raw = match raw {
            Some(s) if !s.trim().is_empty() => s,
            _ => {
                return Ok(TileFilter {
                    img_date: default_img_date,
                })
            }
        };
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidFilter(format!("not a JSON object: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidFilter("filter must be a JSON object".to_string()))?;
        let img_date = match object.get("img_date") {
            None | Some(Value::Null) => default_img_date,
            Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| Error::InvalidFilter(format!("img_date: {}", e)))?,
            Some(other) => {
                return Err(Error::InvalidFilter(format!(
                    "img_date must be a YYYY-MM-DD string, got {}",
                    other
                )))
            }
        };
        Ok(TileFilter { img_date })
    }
}

/// The spatial half of a built query.
#[derive(Clone, Debug, PartialEq)]
pub enum SpatialPredicate {
    Bbox(ProjectedBoundingBox),
    ShapeIntersects { wkt: String },
}

/// A fully shaped store query: SQL text plus its bind values.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialQuery {
    pub sql: String,
    pub img_date: NaiveDate,
    pub predicate: SpatialPredicate,
}

impl SpatialQuery {
    /// Binds the parameters in the order the SQL text expects them.
    pub fn bind(&self) -> Query<'_, Postgres, PgArguments> {
        let query = sqlx::query(&self.sql).bind(self.img_date);
        match &self.predicate {
            SpatialPredicate::ShapeIntersects { wkt } => query.bind(wkt.as_str()),
            SpatialPredicate::Bbox(b) => query
                .bind(b.min_x)
                .bind(b.max_x)
                .bind(b.min_y)
                .bind(b.max_y),
        }
    }
}

/// Shapes spatial queries for one configured table and predicate kind.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    table: String,
    kind: PredicateKind,
}

impl QueryBuilder {
    pub fn new(table: &str, kind: PredicateKind) -> QueryBuilder {
        QueryBuilder {
            table: table.to_string(),
            kind,
        }
    }

    pub fn build(&self, coord: TileCoordinate, filter: &TileFilter) -> SpatialQuery {
        let bbox = coord.bbox();
        let (predicate, sql) = match self.kind {
            PredicateKind::ShapeIntersects => {
                let wkt = tile_query_polygon(&bbox).wkt_string();
                let sql = format!(
                    "SELECT id, properties, geometry FROM {} \
                     WHERE img_date = $1 \
                     AND ST_Intersects(ST_GeomFromText(geometry, 0), ST_GeomFromText($2, 0))",
                    self.table
                );
                (SpatialPredicate::ShapeIntersects { wkt }, sql)
            }
            PredicateKind::Bbox => {
                let sql = format!(
                    "SELECT id, properties, geometry FROM {} \
                     WHERE img_date = $1 \
                     AND max_x >= $2 AND min_x <= $3 AND max_y >= $4 AND min_y <= $5",
                    self.table
                );
                (SpatialPredicate::Bbox(project_bbox(&bbox)), sql)
            }
        };
        SpatialQuery {
            sql,
            img_date: filter.img_date,
            predicate,
        }
    }
}

/// Builds the tile's query polygon: the four geographic corners in fixed
/// winding order, closed, projected into the space the store indexes.
pub fn tile_query_polygon(bbox: &GeoBoundingBox) -> Polygon<f64> {
    let corners = [
        (bbox.min_lon, bbox.min_lat),
        (bbox.max_lon, bbox.min_lat),
        (bbox.max_lon, bbox.max_lat),
        (bbox.min_lon, bbox.max_lat),
        (bbox.min_lon, bbox.min_lat),
    ];
    let ring: Vec<Coord<f64>> = corners
        .iter()
        .map(|&(lon, lat)| project_lonlat(lon, lat))
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(kind: PredicateKind) -> QueryBuilder {
        QueryBuilder::new("features", kind)
    }

    fn filter() -> TileFilter {
        TileFilter {
            img_date: NaiveDate::from_ymd_opt(2016, 8, 5).unwrap(),
        }
    }

    fn ring_of(coord: TileCoordinate) -> Vec<Coord<f64>> {
        tile_query_polygon(&coord.bbox()).exterior().0.clone()
    }

    #[test]
    fn test_query_polygon_ring_is_closed() {
        let ring = ring_of(TileCoordinate::new(5, 17, 11).unwrap());
        assert_eq!(5, ring.len());
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_query_polygon_winding_is_fixed() {
        // The signed area must keep the same sign for every tile.
        let shoelace = |ring: &[Coord<f64>]| -> f64 {
            ring.windows(2)
                .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
                .sum()
        };
        let a = shoelace(&ring_of(TileCoordinate::new(3, 2, 2).unwrap()));
        let b = shoelace(&ring_of(TileCoordinate::new(9, 100, 300).unwrap()));
        assert!(a.signum() == b.signum() && a != 0.0);
    }

    #[test]
    fn test_shape_query_sql() {
        let coord = TileCoordinate::new(3, 2, 2).unwrap();
        let query = builder(PredicateKind::ShapeIntersects).build(coord, &filter());
        assert!(query.sql.contains("ST_Intersects"));
        assert!(query.sql.contains("FROM features"));
        match &query.predicate {
            SpatialPredicate::ShapeIntersects { wkt } => {
                assert!(wkt.starts_with("POLYGON"));
            }
            other => panic!("unexpected predicate: {:?}", other),
        }
    }

    #[test]
    fn test_bbox_query_has_no_polygon() {
        let coord = TileCoordinate::new(3, 2, 2).unwrap();
        let query = builder(PredicateKind::Bbox).build(coord, &filter());
        assert!(!query.sql.contains("ST_Intersects"));
        match query.predicate {
            SpatialPredicate::Bbox(b) => {
                assert!(b.min_x < b.max_x);
                assert!(b.min_y < b.max_y);
            }
            other => panic!("unexpected predicate: {:?}", other),
        }
    }

    #[test]
    fn test_filter_defaults() {
        let default = NaiveDate::from_ymd_opt(2016, 8, 5).unwrap();
        assert_eq!(default, TileFilter::parse(None, default).unwrap().img_date);
        assert_eq!(default, TileFilter::parse(Some("{}"), default).unwrap().img_date);
        assert_eq!(default, TileFilter::parse(Some(""), default).unwrap().img_date);
        // Unknown keys are ignored.
        assert_eq!(
            default,
            TileFilter::parse(Some(r#"{"other": 1}"#), default)
                .unwrap()
                .img_date
        );
    }

    #[test]
    fn test_filter_passthrough() {
        let default = NaiveDate::from_ymd_opt(2016, 8, 5).unwrap();
        let parsed = TileFilter::parse(Some(r#"{"img_date": "2020-01-31"}"#), default).unwrap();
        assert_eq!(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), parsed.img_date);
    }

    #[test]
    fn test_malformed_filter_is_rejected() {
        let default = NaiveDate::from_ymd_opt(2016, 8, 5).unwrap();
        assert!(matches!(
            TileFilter::parse(Some("[1,2]"), default),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            TileFilter::parse(Some(r#"{"img_date": "yesterday"}"#), default),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            TileFilter::parse(Some(r#"{"img_date": 20200131}"#), default),
            Err(Error::InvalidFilter(_))
        ));
    }
}
