//! The tile request pipeline: coordinate → query → rows → clip → encode.
//!
//! Each step is its own failure boundary; nothing is retried and no
//! partial payload ever leaves this module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::debug;

use crate::clip::clip;
use crate::config::Config;
use crate::coord::{RawTileCoordinate, TileCoordinate};
use crate::encode::encode;
use crate::error::Error;
use crate::project::transform_tile;
use crate::query::{QueryBuilder, TileFilter};
use crate::store::fetch_features;
use crate::TileSource;

/// Serves encoded tiles for one configured table and layer.
pub struct Tiler {
    query_builder: QueryBuilder,
    base_layer: String,
    extent: u32,
    buffer: u32,
    min_zoom: u8,
    max_zoom: u8,
    default_img_date: NaiveDate,
    query_timeout: Duration,
}

impl Tiler {
    pub fn new(config: &Config) -> Tiler {
        Tiler {
            query_builder: QueryBuilder::new(&config.store.table, config.store.predicate),
            base_layer: config.tiles.base_layer.clone(),
            extent: config.tiles.extent,
            buffer: config.tiles.buffer,
            min_zoom: config.tiles.min_zoom,
            max_zoom: config.tiles.max_zoom,
            default_img_date: config.filter.default_img_date,
            query_timeout: config.query_timeout(),
        }
    }

    /// Entry point for the HTTP layer: validates the raw path and filter
    /// parameters, then renders. Validation failures never reach the store.
    pub async fn handle(
        &self,
        pool: &PgPool,
        raw: RawTileCoordinate,
        raw_filter: Option<&str>,
    ) -> Result<Vec<u8>, Error> {
        let coord = self.check_zoom(TileCoordinate::try_from(raw)?)?;
        let filter = TileFilter::parse(raw_filter, self.default_img_date)?;
        self.render_tile(pool, coord, &filter).await
    }

    /// Rejects zoom levels the deployment does not serve.
    fn check_zoom(&self, coord: TileCoordinate) -> Result<TileCoordinate, Error> {
        if coord.z() < self.min_zoom || coord.z() > self.max_zoom {
            return Err(Error::InvalidTileCoordinate {
                z: i32::from(coord.z()),
                x: i64::from(coord.x()),
                y: i64::from(coord.y()),
            });
        }
        Ok(coord)
    }
}

#[async_trait]
impl TileSource for Tiler {
    async fn render_tile(
        &self,
        pool: &PgPool,
        coord: TileCoordinate,
        filter: &TileFilter,
    ) -> Result<Vec<u8>, Error> {
        let query = self.query_builder.build(coord, filter);
        let fetched = fetch_features(pool, &query, self.query_timeout).await?;
        debug!(
            z = coord.z(),
            x = coord.x(),
            y = coord.y(),
            features = fetched.len(),
            "fetched features for tile"
        );

        let window = coord.clip_window(self.buffer, self.extent);
        let clipped = clip(fetched, &window);
        let local = transform_tile(clipped, coord, self.extent);
        encode(&local, &self.base_layer, self.extent)
    }
}
