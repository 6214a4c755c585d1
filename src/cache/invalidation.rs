//! Collection-wide invalidation.
//!
//! Bumping the generation first means that a listing computed before the
//! mutation, but written to the cache after this sweep, lands under a key no
//! reader will ask for again.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{info, warn};

use super::{
    backend::{CacheError, CacheHandle},
    keys::{Collection, KeySpace},
    metrics::{METRIC_CACHE_INVALIDATE_MS, METRIC_CACHE_INVALIDATED_KEYS},
};

/// What an invalidation pass managed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub collection: Collection,
    /// Generation after the bump, if the bump succeeded.
    pub generation: Option<u64>,
    pub matched: usize,
    pub deleted: u64,
    /// False when any step failed; stale listings may then survive until TTL.
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct InvalidationCoordinator {
    handle: CacheHandle,
    keys: KeySpace,
}

impl InvalidationCoordinator {
    pub fn new(handle: CacheHandle, keys: KeySpace) -> Self {
        Self { handle, keys }
    }

    pub async fn invalidate(&self, collection: Collection) -> InvalidationReport {
        let started = Instant::now();
        let mut report = InvalidationReport {
            collection,
            generation: None,
            matched: 0,
            deleted: 0,
            complete: true,
        };

        match self
            .handle
            .increment(&self.keys.generation_key(collection))
            .await
        {
            Ok(generation) => report.generation = Some(generation),
            Err(err) => {
                report.complete = false;
                warn_failed(collection, "incr", &err);
            }
        }

        let prefix = self.keys.collection_prefix(collection);
        match self.handle.keys_with_prefix(&prefix).await {
            Ok(keys) => {
                report.matched = keys.len();
                match self.handle.delete_many(&keys).await {
                    Ok(deleted) => report.deleted = deleted,
                    Err(CacheError::PartialDelete {
                        deleted,
                        failed,
                        message,
                    }) => {
                        report.deleted = deleted;
                        report.complete = false;
                        warn!(
                            target = "shelf::cache",
                            collection = collection.as_str(),
                            deleted,
                            failed,
                            error = %message,
                            "Cache invalidation deleted only part of the listings"
                        );
                    }
                    Err(err) => {
                        report.complete = false;
                        warn_failed(collection, "delete", &err);
                    }
                }
                if report.deleted > 0 {
                    info!(
                        target = "shelf::cache",
                        collection = collection.as_str(),
                        generation = ?report.generation,
                        keys = ?keys,
                        "Cache invalidated"
                    );
                }
            }
            Err(err) => {
                report.complete = false;
                warn_failed(collection, "scan", &err);
            }
        }

        counter!(METRIC_CACHE_INVALIDATED_KEYS, "collection" => collection.as_str())
            .increment(report.deleted);
        histogram!(METRIC_CACHE_INVALIDATE_MS, "collection" => collection.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        report
    }
}

fn warn_failed(collection: Collection, op: &'static str, err: &CacheError) {
    warn!(
        target = "shelf::cache",
        collection = collection.as_str(),
        op,
        error = %err,
        "Cache invalidation step failed"
    );
}
