//! Backing-store session management and row traffic.
//!
//! Startup connects with a bounded linear retry and applies idempotent
//! DDL; the request paths share the resulting `PgPool`.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use futures::TryStreamExt;
use geo::BoundingRect;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::config::{PredicateKind, StoreConfig};
use crate::error::Error;
use crate::geom::{Feature, FeatureCollection};
use crate::query::SpatialQuery;

/// Runs `op` up to `attempts` times, sleeping `interval` between
/// failures. Exhaustion is a bootstrap failure.
pub async fn retry<T, E, F, Fut>(mut op: F, attempts: u32, interval: Duration) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "store bootstrap attempt failed");
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    Err(Error::Bootstrap { attempts })
}

/// Connects to the store and provisions the schema, retrying per the
/// configured bound. Callers treat failure as fatal.
pub async fn connect(config: &StoreConfig, interval: Duration) -> Result<PgPool, Error> {
    let pool = retry(
        || async {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.url)
                .await?;
            for statement in ddl_statements(&config.table, config.predicate) {
                sqlx::query(&statement).execute(&pool).await?;
            }
            Ok::<PgPool, sqlx::Error>(pool)
        },
        config.bootstrap_attempts,
        interval,
    )
    .await?;
    info!(table = %config.table, "store schema ready");
    Ok(pool)
}

/// The idempotent schema for one feature table. Safe to re-run against
/// an already-provisioned store.
pub fn ddl_statements(table: &str, predicate: PredicateKind) -> Vec<String> {
    let mut statements = vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             img_date date NOT NULL, \
             id text NOT NULL, \
             properties jsonb NOT NULL DEFAULT '{{}}'::jsonb, \
             geometry text NOT NULL, \
             min_x double precision NOT NULL, \
             min_y double precision NOT NULL, \
             max_x double precision NOT NULL, \
             max_y double precision NOT NULL, \
             PRIMARY KEY (img_date, id))"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_bbox_idx ON {table} (min_x, max_x, min_y, max_y)"
        ),
    ];
    if predicate == PredicateKind::ShapeIntersects {
        statements.push("CREATE EXTENSION IF NOT EXISTS postgis".to_string());
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {table}_geom_idx ON {table} \
             USING gist (ST_GeomFromText(geometry, 0))"
        ));
    }
    statements
}

/// Executes a shaped tile query and reassembles the rows, bounded by
/// `timeout`. One undecodable geometry fails the whole result set so a
/// served tile is never partially correct.
pub async fn fetch_features(
    pool: &PgPool,
    query: &SpatialQuery,
    timeout: Duration,
) -> Result<FeatureCollection, Error> {
    let fetch = async {
        let mut rows = query.bind().fetch(pool);
        let mut features = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let id: String = row.try_get("id")?;
            let properties: serde_json::Value = row.try_get("properties")?;
            let wkt: String = row.try_get("geometry")?;
            let properties = match properties {
                serde_json::Value::Object(map) => map,
                _ => Default::default(),
            };
            features.push(Feature::from_stored(id, &wkt, properties)?);
        }
        Ok(FeatureCollection { features })
    };
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(Error::StoreQueryTimeout(timeout)),
    }
}

/// Upserts a projected collection, keyed on `(img_date, id)` so
/// at-least-once resubmission cannot duplicate rows.
pub async fn write_collection(
    pool: &PgPool,
    table: &str,
    collection: &FeatureCollection,
    default_img_date: NaiveDate,
) -> Result<usize, Error> {
    let sql = format!(
        "INSERT INTO {table} \
         (img_date, id, properties, geometry, min_x, min_y, max_x, max_y) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (img_date, id) DO UPDATE SET \
         properties = EXCLUDED.properties, geometry = EXCLUDED.geometry, \
         min_x = EXCLUDED.min_x, min_y = EXCLUDED.min_y, \
         max_x = EXCLUDED.max_x, max_y = EXCLUDED.max_y"
    );
    let mut written = 0usize;
    for feature in &collection.features {
        if feature.id.is_empty() {
            warn!("skipping feature without an id; upsert requires one");
            continue;
        }
        let Some(bounds) = feature.geometry.bounding_rect() else {
            warn!(id = %feature.id, "skipping feature with empty geometry");
            continue;
        };
        let img_date = feature_img_date(feature, default_img_date);
        sqlx::query(&sql)
            .bind(img_date)
            .bind(&feature.id)
            .bind(serde_json::Value::Object(feature.properties.clone()))
            .bind(feature.geometry_wkt())
            .bind(bounds.min().x)
            .bind(bounds.min().y)
            .bind(bounds.max().x)
            .bind(bounds.max().y)
            .execute(pool)
            .await?;
        written += 1;
    }
    Ok(written)
}

/// A feature's partition date: its own `img_date` property when it
/// parses, the deployment default otherwise.
fn feature_img_date(feature: &Feature, default: NaiveDate) -> NaiveDate {
    feature
        .properties
        .get("img_date")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or(default)
}
