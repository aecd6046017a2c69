//! Blob and record writes for a classified plant.
//!
//! The two writes are independent calls; ordering and compensation are the
//! caller's decision (see `pipeline`).

use std::sync::Arc;

use rootwise_store::{BlobStore, DocumentStore, NewDocumentId, UserIdentity};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::classify::ClassificationResult;
use crate::error::{CoreError, CoreResult};
use crate::media::MediaCapture;
use crate::models::{record_fields, PlantRecord};
use crate::obs;

/// Stateless writer for plant records and their images.
#[derive(Clone)]
pub struct PersistenceClient {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    collection: String,
    bucket: String,
}

impl PersistenceClient {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        collection: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            blobs,
            collection: collection.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store the capture's bytes under a fresh id and return that id.
    pub async fn upload_blob(&self, capture: &MediaCapture) -> CoreResult<String> {
        let upload = capture.to_upload().await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let blob_id = self
            .blobs
            .put(&self.bucket, &id, upload)
            .await
            .map_err(CoreError::from_write)?;
        debug!(blob_id = %blob_id, bucket = %self.bucket, "blob uploaded");
        Ok(blob_id)
    }

    /// Create the record linking owner, plant name, label and blob.
    pub async fn create_record(
        &self,
        owner: &UserIdentity,
        plant_name: &str,
        classification: &ClassificationResult,
        blob_id: &str,
    ) -> CoreResult<PlantRecord> {
        let plant_name = plant_name.trim();
        if plant_name.is_empty() {
            return Err(CoreError::Validation("Please enter a plant name".into()));
        }
        let mut fields = Map::new();
        fields.insert(record_fields::OWNER.into(), Value::from(owner.email.as_str()));
        fields.insert(record_fields::DISEASE.into(), Value::from(classification.label.as_str()));
        fields.insert(record_fields::PLANT_NAME.into(), Value::from(plant_name));
        fields.insert(record_fields::IMAGE.into(), Value::from(blob_id));

        let doc = self
            .documents
            .create(&self.collection, NewDocumentId::Unique, fields)
            .await
            .map_err(CoreError::from_write)?;
        let record = PlantRecord::try_from(doc)?;
        info!(record_id = %record.id, plant = %record.plant_name, "plant record created");
        Ok(record)
    }

    /// Remove a blob that no record references. Failures are logged and
    /// returned.
    pub async fn delete_blob(&self, blob_id: &str) -> CoreResult<()> {
        let result = self.blobs.delete(&self.bucket, blob_id).await;
        match &result {
            Ok(()) => obs::emit_orphan_cleanup(blob_id, None),
            Err(err) => obs::emit_orphan_cleanup(blob_id, Some(&err.to_string())),
        }
        result.map_err(CoreError::from_write)
    }
}

impl std::fmt::Debug for PersistenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceClient")
            .field("collection", &self.collection)
            .field("bucket", &self.bucket)
            .finish()
    }
}
