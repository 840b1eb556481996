//! HTTP surface: liveness, ingest, and tile routes.

use std::sync::Arc;

use axum::extract::rejection::StringRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::Config;
use crate::coord::RawTileCoordinate;
use crate::error::Error;
use crate::ingest::{parse_body, resolve_layer, IngestBatch, IngestPipeline};
use crate::tiler::Tiler;

const CONTENT_TYPE_MVT: &str = "application/vnd.mapbox-vector-tile";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tiler: Arc<Tiler>,
    pub ingest: IngestPipeline,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route("/", get(liveness).post(ingest))
        .route("/:layer", post(ingest_with_layer))
        .route("/tile/:z/:x/:y", get(serve_tile))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness() -> &'static str {
    "Tile Cistern is running"
}

#[derive(Debug, Deserialize)]
struct IngestParams {
    geojson: Option<String>,
}

async fn ingest(
    state: State<AppState>,
    params: Query<IngestParams>,
    body: Result<String, StringRejection>,
) -> Response {
    accept_features(state, None, params, body).await
}

async fn ingest_with_layer(
    state: State<AppState>,
    Path(layer): Path<String>,
    params: Query<IngestParams>,
    body: Result<String, StringRejection>,
) -> Response {
    accept_features(state, Some(layer), params, body).await
}

async fn accept_features(
    State(state): State<AppState>,
    segment: Option<String>,
    Query(params): Query<IngestParams>,
    body: Result<String, StringRejection>,
) -> Response {
    // Layer resolution comes first; an empty target rejects the request
    // before any bytes are parsed.
    let layer = match resolve_layer(&state.config.tiles.base_layer, segment.as_deref()) {
        Ok(layer) => layer,
        Err(e) => return e.into_response(),
    };
    let body = match body {
        Ok(body) => body,
        // Oversized uploads land here via the body-limit layer.
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Out of memory: reduce file/bulk size",
            )
                .into_response()
        }
    };
    let whole_document = params.geojson.as_deref() == Some("true");
    let collection = match parse_body(&body, whole_document) {
        Ok(collection) => collection,
        Err(e) => return e.into_response(),
    };
    state.ingest.submit(IngestBatch { layer, collection }).await;
    (StatusCode::ACCEPTED, "Features Accepted").into_response()
}

#[derive(Debug, Deserialize)]
struct TileParams {
    filter: Option<String>,
}

async fn serve_tile(
    State(state): State<AppState>,
    Path(raw): Path<RawTileCoordinate>,
    Query(params): Query<TileParams>,
) -> Response {
    match state
        .tiler
        .handle(&state.pool, raw, params.filter.as_deref())
        .await
    {
        Ok(bytes) => ([(header::CONTENT_TYPE, CONTENT_TYPE_MVT)], bytes).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::InvalidTileCoordinate { .. }
            | Error::InvalidFilter(_)
            | Error::InvalidLayerName
            | Error::UnsupportedDocument(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::GeoJson(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Json parsing issue: check file format".to_string(),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let bad = Error::InvalidLayerName.into_response();
        assert_eq!(StatusCode::BAD_REQUEST, bad.status());

        let bad = Error::InvalidTileCoordinate { z: -1, x: 0, y: 0 }.into_response();
        assert_eq!(StatusCode::BAD_REQUEST, bad.status());

        let oops = Error::GeometryDecode {
            id: "f".to_string(),
            reason: "truncated".to_string(),
        }
        .into_response();
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, oops.status());
    }
}
