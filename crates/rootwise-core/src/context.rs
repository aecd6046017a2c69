//! Application context.
//!
//! Built once at startup and passed by reference to whatever needs the
//! session, the stores or the derived services. Dropping it tears
//! everything down; there is no process-wide state.

use std::sync::Arc;

use rootwise_store::{
    AppwriteClient, BlobStore, DocumentStore, PreferenceStore, SessionService, UserIdentity,
};
use tracing::info;

use crate::binding::{BindingOptions, Refresh, ResourceBinding};
use crate::classify::ClassificationClient;
use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{Disease, PlantRecord};
use crate::persistence::PersistenceClient;
use crate::pipeline::PipelineController;
use crate::profile::AvatarService;
use crate::query::{FilterState, QueryParameters};
use crate::records::RecordService;
use crate::urls::StorageUrls;

/// Binding over the signed-in user; `Some(None)` once known to be signed out.
pub type UserBinding = ResourceBinding<(), Option<UserIdentity>, CoreError>;

/// Binding backing the home screen's record list.
pub type RecordsBinding = ResourceBinding<QueryParameters, Vec<PlantRecord>, CoreError>;

/// Binding backing the disease catalogue.
pub type CatalogueBinding = ResourceBinding<QueryParameters, Vec<Disease>, CoreError>;

/// Backend collaborators.
#[derive(Clone)]
pub struct Backend {
    pub session: Arc<dyn SessionService>,
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub preferences: Arc<dyn PreferenceStore>,
}

impl Backend {
    /// Every port served by one hosted-backend client.
    pub fn appwrite(client: Arc<AppwriteClient>) -> Self {
        Self {
            session: client.clone(),
            documents: client.clone(),
            blobs: client.clone(),
            preferences: client,
        }
    }
}

/// Session-scoped application state.
pub struct AppContext {
    config: AppConfig,
    backend: Backend,
    user: Arc<UserBinding>,
    records: RecordService,
    persistence: PersistenceClient,
    urls: StorageUrls,
}

impl AppContext {
    /// Build the context and load the current user.
    pub async fn start(config: AppConfig, backend: Backend) -> Arc<Self> {
        let session = Arc::clone(&backend.session);
        let user: Arc<UserBinding> = ResourceBinding::with_options(
            move |()| {
                let session = Arc::clone(&session);
                async move { session.current_user().await.map_err(CoreError::from) }
            },
            (),
            BindingOptions { skip: true },
        );
        user.refetch(None).await;

        let records = RecordService::new(Arc::clone(&backend.documents), &config);
        let persistence = PersistenceClient::new(
            Arc::clone(&backend.documents),
            Arc::clone(&backend.blobs),
            config.records_collection.as_str(),
            config.bucket_id.as_str(),
        );
        let urls = StorageUrls::new(&config.endpoint, &config.project_id);

        let context = Arc::new(Self {
            config,
            backend,
            user,
            records,
            persistence,
            urls,
        });
        info!(logged_in = context.is_logged_in(), "application context started");
        context
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The signed-in user, if known.
    pub fn user(&self) -> Option<UserIdentity> {
        self.user.data().flatten()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user().is_some()
    }

    pub fn user_binding(&self) -> Arc<UserBinding> {
        Arc::clone(&self.user)
    }

    /// Re-read the current user.
    pub async fn refresh(&self) -> Option<UserIdentity> {
        self.user.refetch(None).await;
        self.user()
    }

    /// Start a session; a no-op success when one already exists.
    pub async fn sign_in(&self) -> CoreResult<bool> {
        let signed_in = if self.backend.session.is_authenticated().await {
            true
        } else {
            self.backend.session.sign_in().await?
        };
        self.refresh().await;
        info!(signed_in, "sign in");
        Ok(signed_in)
    }

    /// End the session; a no-op success when already signed out.
    pub async fn sign_out(&self) -> CoreResult<bool> {
        let signed_out = if self.backend.session.is_authenticated().await {
            self.backend.session.sign_out().await?
        } else {
            true
        };
        self.refresh().await;
        info!(signed_out, "sign out");
        Ok(signed_out)
    }

    pub fn records(&self) -> &RecordService {
        &self.records
    }

    pub fn persistence(&self) -> &PersistenceClient {
        &self.persistence
    }

    pub fn urls(&self) -> &StorageUrls {
        &self.urls
    }

    pub fn avatars(&self) -> AvatarService {
        AvatarService::new(
            Arc::clone(&self.backend.session),
            Arc::clone(&self.backend.preferences),
            self.persistence.clone(),
            self.urls.clone(),
        )
    }

    /// Records binding for the home screen. Without an owner the binding
    /// starts empty instead of fetching.
    pub fn home_binding(&self, filter: &FilterState) -> Arc<RecordsBinding> {
        let records = self.records.clone();
        let fetch = move |params: QueryParameters| {
            let records = records.clone();
            async move { records.list_records(&params).await }
        };
        match filter.params() {
            Some(params) => ResourceBinding::new(fetch, params),
            None => ResourceBinding::with_options(
                fetch,
                QueryParameters::default(),
                BindingOptions { skip: true },
            ),
        }
    }

    /// Catalogue binding seeded with `search`.
    pub fn catalogue_binding(&self, search: &str) -> Arc<CatalogueBinding> {
        let records = self.records.clone();
        ResourceBinding::new(
            move |params: QueryParameters| {
                let records = records.clone();
                async move { records.catalogue(&params).await }
            },
            QueryParameters::catalogue_capped(search, self.config.catalogue_limit),
        )
    }

    /// A pipeline saving as the signed-in user and refreshing `home` after
    /// each saved record.
    pub fn pipeline(
        &self,
        classifier: Arc<dyn ClassificationClient>,
        home: Arc<dyn Refresh>,
    ) -> PipelineController {
        PipelineController::new(classifier, self.persistence.clone(), self.user_binding(), home)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}
