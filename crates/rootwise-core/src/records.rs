//! Read services: the user's plant records and the disease catalogue.
//!
//! Reads degrade a missing session to "no data" so read-only screens stay
//! usable while signed out.

use std::sync::Arc;

use rootwise_store::{DocumentStore, Query};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{degrade_auth, CoreResult};
use crate::models::{disease_fields, CareAdvice, Disease, PlantDetail, PlantRecord};
use crate::query::{PlantFilter, QueryParameters};
use crate::urls::StorageUrls;

/// Fetches plant records and catalogue entries.
#[derive(Clone)]
pub struct RecordService {
    documents: Arc<dyn DocumentStore>,
    records_collection: String,
    diseases_collection: String,
    bucket_id: String,
    catalogue_limit: usize,
    urls: StorageUrls,
}

impl RecordService {
    pub fn new(documents: Arc<dyn DocumentStore>, config: &AppConfig) -> Self {
        Self {
            documents,
            records_collection: config.records_collection.clone(),
            diseases_collection: config.diseases_collection.clone(),
            bucket_id: config.bucket_id.clone(),
            catalogue_limit: config.catalogue_limit,
            urls: StorageUrls::new(&config.endpoint, &config.project_id),
        }
    }

    /// Records matching `params`, newest first unless `params` says otherwise.
    /// Parameters without an owner yield nothing.
    pub async fn list_records(&self, params: &QueryParameters) -> CoreResult<Vec<PlantRecord>> {
        if params.owner.is_none() {
            return Ok(Vec::new());
        }
        degrade_auth(self.fetch_records(params).await)
    }

    /// Distinct plant names of an owner, most recently recorded first.
    pub async fn unique_plant_names(&self, owner: &str) -> CoreResult<Vec<String>> {
        let records = self
            .list_records(&QueryParameters::records(owner, PlantFilter::All))
            .await?;
        let mut names: Vec<String> = Vec::new();
        for record in records {
            if !names.contains(&record.plant_name) {
                names.push(record.plant_name);
            }
        }
        Ok(names)
    }

    /// One record with its image URL and care advice.
    ///
    /// A failed catalogue lookup degrades the advice to `Unknown`.
    pub async fn plant_detail(&self, record_id: &str) -> CoreResult<Option<PlantDetail>> {
        let doc = match self.documents.get(&self.records_collection, record_id).await {
            Ok(doc) => doc,
            Err(err) if err.is_unauthorized() => {
                warn!(record_id, "record read without session");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let record = PlantRecord::try_from(doc)?;

        let cure = match self.cure_for(&record.disease).await {
            Ok(cure) => cure,
            Err(err) => {
                warn!(disease = %record.disease, error = %err, "catalogue lookup failed");
                None
            }
        };
        let advice = CareAdvice::for_label(&record.disease, cure.as_deref());
        let image_url = self.image_url(&record.blob_id);
        Ok(Some(PlantDetail {
            record,
            image_url,
            advice,
        }))
    }

    /// Catalogue ordered by name, narrowed by non-blank search text.
    pub async fn search_diseases(&self, text: &str) -> CoreResult<Vec<Disease>> {
        self.catalogue(&QueryParameters::catalogue_capped(text, self.catalogue_limit))
            .await
    }

    pub async fn latest_diseases(&self) -> CoreResult<Vec<Disease>> {
        self.catalogue(&QueryParameters::latest_diseases()).await
    }

    /// Catalogue entries matching `params`.
    pub async fn catalogue(&self, params: &QueryParameters) -> CoreResult<Vec<Disease>> {
        degrade_auth(self.fetch_diseases(params).await)
    }

    /// One catalogue entry. `NotFound` propagates.
    pub async fn disease(&self, id: &str) -> CoreResult<Disease> {
        let doc = self.documents.get(&self.diseases_collection, id).await?;
        Disease::try_from(doc)
    }

    /// View URL of a stored record image.
    pub fn image_url(&self, blob_id: &str) -> String {
        self.urls.file_view(&self.bucket_id, blob_id)
    }

    async fn fetch_records(&self, params: &QueryParameters) -> CoreResult<Vec<PlantRecord>> {
        let docs = self
            .documents
            .list(&self.records_collection, &params.to_queries())
            .await?;
        docs.into_iter().map(PlantRecord::try_from).collect()
    }

    async fn fetch_diseases(&self, params: &QueryParameters) -> CoreResult<Vec<Disease>> {
        let docs = self
            .documents
            .list(&self.diseases_collection, &params.to_queries())
            .await?;
        docs.into_iter().map(Disease::try_from).collect()
    }

    async fn cure_for(&self, label: &str) -> CoreResult<Option<String>> {
        let queries = [Query::equal(disease_fields::NAME, label), Query::limit(1)];
        let docs = self.documents.list(&self.diseases_collection, &queries).await?;
        debug!(label, matches = docs.len(), "catalogue lookup");
        match docs.into_iter().next() {
            Some(doc) => Ok(Disease::try_from(doc)?.cure),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RecordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordService")
            .field("records_collection", &self.records_collection)
            .field("diseases_collection", &self.diseases_collection)
            .finish()
    }
}
