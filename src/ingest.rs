//! Fire-and-forget feature ingestion.
//!
//! The request path only validates the layer name and parses the wire
//! body; projection and persistence happen on a detached worker fed
//! through a bounded channel. Once a batch is accepted the caller gets no
//! completion signal: worker failures are logged, and durability requires
//! resubmission (the store write is an upsert, so that is safe).

use chrono::NaiveDate;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Error;
use crate::geom::FeatureCollection;
use crate::project::project_features;
use crate::store::write_collection;

/// Batches waiting for the worker. Submission backpressures briefly when
/// full rather than growing without bound.
const QUEUE_DEPTH: usize = 64;

/// One accepted upload.
#[derive(Debug)]
pub struct IngestBatch {
    pub layer: String,
    pub collection: FeatureCollection,
}

/// Handle for submitting batches to the background worker.
#[derive(Clone)]
pub struct IngestPipeline {
    tx: mpsc::Sender<IngestBatch>,
}

impl IngestPipeline {
    /// Spawns the worker task and returns the submission handle. The
    /// worker drains the queue until every handle is dropped, so pending
    /// batches still flush during shutdown.
    pub fn spawn(
        pool: PgPool,
        table: String,
        default_img_date: NaiveDate,
    ) -> (IngestPipeline, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<IngestBatch>(QUEUE_DEPTH);
        let worker = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                let layer = batch.layer;
                let projected = project_features(batch.collection);
                match write_collection(&pool, &table, &projected, default_img_date).await {
                    Ok(written) => {
                        info!(layer = %layer, written, "ingest batch persisted");
                    }
                    Err(e) => {
                        // The accept response is long gone; logging is the
                        // only visibility this path has.
                        error!(layer = %layer, error = %e, "ingest batch failed");
                    }
                }
            }
        });
        (IngestPipeline { tx }, worker)
    }

    /// Queues a parsed batch. Waits only for queue space, never for
    /// persistence.
    pub async fn submit(&self, batch: IngestBatch) {
        if self.tx.send(batch).await.is_err() {
            error!("ingest worker is gone; dropping batch");
        }
    }
}

/// Resolves the target layer name from the configured base layer and the
/// optional request path segment. Both empty is a synchronous rejection,
/// before any body parsing.
pub fn resolve_layer(base: &str, segment: Option<&str>) -> Result<String, Error> {
    let segment = segment.unwrap_or("");
    match (base.is_empty(), segment.is_empty()) {
        (true, true) => Err(Error::InvalidLayerName),
        (false, true) => Ok(base.to_string()),
        (true, false) => Ok(segment.to_string()),
        (false, false) => Ok(format!("{}.{}", base, segment)),
    }
}

/// Normalizes either wire shape into one in-memory collection.
pub fn parse_body(data: &str, whole_document: bool) -> Result<FeatureCollection, Error> {
    if whole_document {
        FeatureCollection::from_geojson(data)
    } else {
        FeatureCollection::from_lines(data)
    }
}
