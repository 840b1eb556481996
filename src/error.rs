use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid tile coordinate {z}/{x}/{y}")]
    InvalidTileCoordinate { z: i32, x: i64, y: i64 },

    #[error("invalid tile filter: {0}")]
    InvalidFilter(String),

    #[error("import layer must not be an empty string")]
    InvalidLayerName,

    #[error("store query failed: {0}")]
    StoreQuery(#[from] sqlx::Error),

    #[error("store query timed out after {0:?}")]
    StoreQueryTimeout(Duration),

    #[error("failed to decode stored geometry for feature {id}: {reason}")]
    GeometryDecode { id: String, reason: String },

    #[error("invalid GeoJSON payload: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("unsupported GeoJSON document: {0}")]
    UnsupportedDocument(String),

    #[error("tile encoding failed: {0}")]
    Encode(#[from] mvt::Error),

    #[error("store bootstrap failed after {attempts} attempts")]
    Bootstrap { attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
