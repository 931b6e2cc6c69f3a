//! Caching layer for study metadata.
//!
//! Wraps any [`StudyMetadataService`] so repeated validation runs do not
//! re-fetch the same study. Concurrent requests for one study share a
//! single fetch; failures are not cached.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use trialcheck_core::StudyMetadata;

use crate::config::MetadataCacheConfig;
use crate::sources::{SourceError, StudyMetadataService};

/// Study metadata cache using moka.
pub struct CachedMetadataService {
    inner: Arc<dyn StudyMetadataService>,
    cache: Cache<String, StudyMetadata>,
}

impl CachedMetadataService {
    /// Create a new cache with the given configuration.
    pub fn new(inner: Arc<dyn StudyMetadataService>, config: &MetadataCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();

        Self { inner, cache }
    }

    /// Drop every cached study.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Drop one cached study.
    pub async fn invalidate(&self, study_instance_uid: &str) {
        self.cache.invalidate(study_instance_uid).await;
    }
}

#[async_trait]
impl StudyMetadataService for CachedMetadataService {
    async fn retrieve_by_study_identifier(
        &self,
        study_instance_uid: &str,
    ) -> Result<StudyMetadata, SourceError> {
        self.cache
            .try_get_with(
                study_instance_uid.to_string(),
                self.inner.retrieve_by_study_identifier(study_instance_uid),
            )
            .await
            .map_err(|e| (*e).clone())
    }
}
