//! # Tile Cistern
//!
//! A vector feature store and Mapbox Vector Tile server.
//!
//! Features arrive as GeoJSON over HTTP, are projected once into
//! normalized web-mercator space, and are persisted in Postgres under a
//! spatial index. Tile requests translate an XYZ coordinate into a
//! spatial predicate, reassemble the matching rows, clip them to a
//! buffer-extended window so adjacent tiles render without seams, and
//! encode the result as a Mapbox Vector Tile.
//!
//! ## Known Limitations
//!
//! Ingestion is fire-and-forget: the accept response only confirms the
//! upload parsed, not that it was stored. Writes are upserts keyed on
//! `(img_date, id)`, so resubmitting a batch is always safe. There is no
//! admission control on concurrent ingestion beyond a bounded worker
//! queue.

// TODO: remove once async fn in traits become stable
use async_trait::async_trait;

use sqlx::PgPool;

pub mod clip;
pub mod config;
pub mod coord;
pub mod encode;
pub mod error;
pub mod geom;
pub mod ingest;
pub mod project;
pub mod query;
pub mod server;
pub mod store;
pub mod tiler;

pub use config::Config;
pub use coord::TileCoordinate;
pub use error::Error;
pub use query::TileFilter;

/// This is the main trait exported by this crate. It is presently rather
/// barebones, but is open for future expansion if other tile formats
/// become relevant.
#[async_trait]
pub trait TileSource: Sized {
    /// Renders the Mapbox vector tile for a slippy map tile in XYZ format.
    async fn render_tile(
        &self,
        pool: &PgPool,
        coord: TileCoordinate,
        filter: &TileFilter,
    ) -> Result<Vec<u8>, Error>;
}
