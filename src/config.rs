//! Server configuration, loaded from a YAML document.
//!
//! Every field carries a default so a missing file (or an empty one) yields a
//! runnable configuration pointed at a local Postgres.

use std::time::Duration;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::Error;

/// Fallback `img_date` bound when a tile request carries no filter.
pub static DEFAULT_IMG_DATE: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(2016, 8, 5).unwrap());

/// Which spatial predicate the deployment sends to the store.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// Scalar min/max bounds against the indexed bbox columns.
    Bbox,
    /// `ST_Intersects` against a WKT polygon (requires PostGIS).
    ShapeIntersects,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8080".to_string(),
            body_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub extent: u32,
    pub buffer: u32,
    pub base_layer: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        TileConfig {
            min_zoom: 2,
            max_zoom: 15,
            extent: 4096,
            buffer: 64,
            base_layer: "cistern".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub table: String,
    pub max_connections: u32,
    pub bootstrap_attempts: u32,
    pub bootstrap_interval_secs: u64,
    pub query_timeout_secs: u64,
    pub predicate: PredicateKind,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            url: "postgres://localhost/geo".to_string(),
            table: "features".to_string(),
            max_connections: 16,
            bootstrap_attempts: 10,
            bootstrap_interval_secs: 3,
            query_timeout_secs: 30,
            predicate: PredicateKind::ShapeIntersects,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub default_img_date: NaiveDate,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            default_img_date: *DEFAULT_IMG_DATE,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tiles: TileConfig,
    pub store: StoreConfig,
    pub filter: FilterConfig,
}

impl Config {
    /// Constructs a Config from a YAML string.
    pub fn from_str(data: &str) -> Result<Config, Error> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn bootstrap_interval(&self) -> Duration {
        Duration::from_secs(self.store.bootstrap_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.store.query_timeout_secs)
    }
}
