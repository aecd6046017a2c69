//! Application configuration.

use rootwise_store::appwrite::DEFAULT_ENDPOINT;
use rootwise_store::AppwriteConfig;

/// Maximum number of catalogue entries returned by a search.
pub const CATALOGUE_LIMIT: usize = 100;

/// Number of entries in the "latest diseases" strip.
pub const LATEST_LIMIT: usize = 5;

/// Identifiers and endpoints the core needs at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Backend API endpoint, also the base of stored-file URLs
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    /// Collection holding the disease catalogue
    pub diseases_collection: String,
    /// Collection holding the users' plant records
    pub records_collection: String,
    /// Bucket holding uploaded images
    pub bucket_id: String,
    /// Remote classification endpoint
    pub classifier_url: String,
    pub catalogue_limit: usize,
    pub latest_limit: usize,
}

impl AppConfig {
    pub fn new(
        project_id: impl Into<String>,
        database_id: impl Into<String>,
        classifier_url: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: project_id.into(),
            database_id: database_id.into(),
            diseases_collection: "diseases".to_string(),
            records_collection: "userImages".to_string(),
            bucket_id: "images".to_string(),
            classifier_url: classifier_url.into(),
            catalogue_limit: CATALOGUE_LIMIT,
            latest_limit: LATEST_LIMIT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_collections(
        mut self,
        diseases: impl Into<String>,
        records: impl Into<String>,
    ) -> Self {
        self.diseases_collection = diseases.into();
        self.records_collection = records.into();
        self
    }

    pub fn with_bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.bucket_id = bucket_id.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - ROOTWISE_PROJECT_ID (required)
    /// - ROOTWISE_DATABASE_ID (required)
    /// - ROOTWISE_CLASSIFIER_URL (required)
    /// - ROOTWISE_ENDPOINT (optional, default: Appwrite Cloud Frankfurt)
    /// - ROOTWISE_DISEASES_COLLECTION_ID (optional, default: "diseases")
    /// - ROOTWISE_RECORDS_COLLECTION_ID (optional, default: "userImages")
    /// - ROOTWISE_BUCKET_ID (optional, default: "images")
    /// - ROOTWISE_CATALOGUE_LIMIT (optional, default: 100)
    pub fn from_env() -> std::result::Result<Self, String> {
        let project_id =
            std::env::var("ROOTWISE_PROJECT_ID").map_err(|_| "ROOTWISE_PROJECT_ID not set")?;
        let database_id =
            std::env::var("ROOTWISE_DATABASE_ID").map_err(|_| "ROOTWISE_DATABASE_ID not set")?;
        let classifier_url = std::env::var("ROOTWISE_CLASSIFIER_URL")
            .map_err(|_| "ROOTWISE_CLASSIFIER_URL not set")?;

        let mut config = Self::new(project_id, database_id, classifier_url);
        if let Ok(endpoint) = std::env::var("ROOTWISE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(id) = std::env::var("ROOTWISE_DISEASES_COLLECTION_ID") {
            config.diseases_collection = id;
        }
        if let Ok(id) = std::env::var("ROOTWISE_RECORDS_COLLECTION_ID") {
            config.records_collection = id;
        }
        if let Ok(id) = std::env::var("ROOTWISE_BUCKET_ID") {
            config.bucket_id = id;
        }
        if let Ok(raw) = std::env::var("ROOTWISE_CATALOGUE_LIMIT") {
            config.catalogue_limit = raw
                .parse()
                .map_err(|_| format!("ROOTWISE_CATALOGUE_LIMIT is not a number: {raw}"))?;
        }
        Ok(config)
    }

    /// Backend connection settings derived from this configuration.
    pub fn appwrite(&self) -> AppwriteConfig {
        AppwriteConfig::new(&self.endpoint, &self.project_id, &self.database_id)
    }
}
