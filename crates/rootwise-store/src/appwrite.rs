//! Appwrite REST adapter
//!
//! Implements every backend port against the hosted Appwrite API:
//! documents under `/databases`, files under `/storage`, and the session,
//! account and preferences under `/account`. The session secret obtained
//! at sign-in is replayed with the `X-Appwrite-Session` header.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::storage_traits::*;

/// Default Appwrite Cloud endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://fra.cloud.appwrite.io/v1";

/// One-time login token (user id + secret) exchanged for a session.
#[derive(Debug, Clone)]
pub struct LoginToken {
    pub user_id: String,
    pub secret: String,
}

/// Configuration for the Appwrite connection
#[derive(Debug, Clone)]
pub struct AppwriteConfig {
    /// API endpoint including the version segment (e.g. ".../v1")
    pub endpoint: String,
    /// Project id sent with every request
    pub project_id: String,
    /// Database holding the collections
    pub database_id: String,
    /// Existing session secret, if already signed in
    pub session: Option<String>,
    /// Token to exchange for a session on `sign_in`
    pub login_token: Option<LoginToken>,
}

impl AppwriteConfig {
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            database_id: database_id.into(),
            session: None,
            login_token: None,
        }
    }

    /// Reuse an existing session secret
    pub fn with_session(mut self, secret: impl Into<String>) -> Self {
        self.session = Some(secret.into());
        self
    }

    /// Sign in by exchanging a login token
    pub fn with_login_token(mut self, user_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.login_token = Some(LoginToken {
            user_id: user_id.into(),
            secret: secret.into(),
        });
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - ROOTWISE_PROJECT_ID (required)
    /// - ROOTWISE_DATABASE_ID (required)
    /// - ROOTWISE_ENDPOINT (optional, default: Appwrite Cloud Frankfurt)
    /// - ROOTWISE_SESSION (optional)
    /// - ROOTWISE_LOGIN_USER_ID + ROOTWISE_LOGIN_SECRET (optional, both or neither)
    pub fn from_env() -> std::result::Result<Self, String> {
        let project_id =
            std::env::var("ROOTWISE_PROJECT_ID").map_err(|_| "ROOTWISE_PROJECT_ID not set")?;
        let database_id =
            std::env::var("ROOTWISE_DATABASE_ID").map_err(|_| "ROOTWISE_DATABASE_ID not set")?;
        let endpoint =
            std::env::var("ROOTWISE_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let mut config = Self::new(endpoint, project_id, database_id);
        if let Ok(session) = std::env::var("ROOTWISE_SESSION") {
            config = config.with_session(session);
        }
        match (
            std::env::var("ROOTWISE_LOGIN_USER_ID"),
            std::env::var("ROOTWISE_LOGIN_SECRET"),
        ) {
            (Ok(user_id), Ok(secret)) => config = config.with_login_token(user_id, secret),
            (Err(_), Err(_)) => {}
            _ => {
                return Err(
                    "ROOTWISE_LOGIN_USER_ID and ROOTWISE_LOGIN_SECRET must be set together".into(),
                )
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct AccountDto {
    #[serde(rename = "$id")]
    id: String,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct DocumentListDto {
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FileDto {
    #[serde(rename = "$id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionDto {
    secret: String,
}

/// Appwrite client implementing all backend ports
pub struct AppwriteClient {
    config: AppwriteConfig,
    http: reqwest::Client,
    session: RwLock<Option<String>>,
}

impl AppwriteClient {
    /// Create a new client
    pub fn new(config: AppwriteConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rootwise-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Transport(format!("failed to build HTTP client: {e}")))?;
        let session = RwLock::new(config.session.clone());
        Ok(Self {
            config,
            http,
            session,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> StorageResult<Self> {
        let config = AppwriteConfig::from_env().map_err(StorageError::InvalidQuery)?;
        Self::new(config)
    }

    pub fn config(&self) -> &AppwriteConfig {
        &self.config
    }

    /// Current session secret, if any.
    pub fn session_secret(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session(&self, secret: Option<String>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = secret;
    }

    /// Initials avatar URL for a display name.
    pub fn initials_avatar_url(&self, name: &str) -> String {
        let base = self.url("avatars/initials");
        match reqwest::Url::parse_with_params(
            &base,
            &[("name", name), ("project", self.config.project_id.as_str())],
        ) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header("X-Appwrite-Project", &self.config.project_id)
            .header("Accept", "application/json");
        if let Some(secret) = self.session_secret() {
            builder = builder.header("X-Appwrite-Session", secret);
        }
        builder
    }

    async fn check(path: &str, response: Response) -> StorageResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(%status, path, "backend request failed");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized(body),
            StatusCode::NOT_FOUND => StorageError::not_found(path),
            _ => StorageError::Http {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> StorageResult<T> {
        let response = Self::check(path, builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    fn documents_path(&self, collection: &str) -> String {
        format!(
            "databases/{}/collections/{}/documents",
            self.config.database_id, collection
        )
    }

    async fn account(&self) -> StorageResult<AccountDto> {
        self.send_json("account", self.request(Method::GET, "account"))
            .await
    }

    async fn prefs(&self) -> StorageResult<Map<String, Value>> {
        self.send_json("account/prefs", self.request(Method::GET, "account/prefs"))
            .await
    }
}

/// Convert a raw Appwrite document into a [`Document`], validating the
/// system attributes and dropping the remaining `$`-prefixed metadata.
pub fn decode_document(raw: Value) -> StorageResult<Document> {
    let Value::Object(mut map) = raw else {
        return Err(StorageError::Decode("document is not an object".into()));
    };
    let id = match map.remove(DOCUMENT_ID) {
        Some(Value::String(id)) => id,
        _ => return Err(StorageError::Decode("document missing `$id`".into())),
    };
    let created_at = match map.remove(CREATED_AT) {
        Some(Value::String(ts)) => DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| StorageError::Decode(format!("bad `$createdAt` on {id}: {e}")))?
            .with_timezone(&Utc),
        _ => return Err(StorageError::Decode(format!("document {id} missing `$createdAt`"))),
    };
    map.retain(|k, _| !k.starts_with('$'));
    Ok(Document {
        id,
        created_at,
        fields: map,
    })
}

#[async_trait]
impl DocumentStore for AppwriteClient {
    async fn list(&self, collection: &str, queries: &[Query]) -> StorageResult<Vec<Document>> {
        let path = self.documents_path(collection);
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|q| ("queries[]", q.to_wire().to_string()))
            .collect();
        debug!(collection, clauses = queries.len(), "listing documents");
        let list: DocumentListDto = self
            .send_json(&path, self.request(Method::GET, &path).query(&params))
            .await?;
        list.documents.into_iter().map(decode_document).collect()
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Document> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        let raw: Value = self.send_json(&path, self.request(Method::GET, &path)).await?;
        decode_document(raw)
    }

    async fn create(
        &self,
        collection: &str,
        id: NewDocumentId,
        fields: Map<String, Value>,
    ) -> StorageResult<Document> {
        let path = self.documents_path(collection);
        let document_id = match id {
            NewDocumentId::Unique => "unique()".to_string(),
            NewDocumentId::Given(id) => id,
        };
        let body = serde_json::json!({ "documentId": document_id, "data": fields });
        let raw: Value = self
            .send_json(&path, self.request(Method::POST, &path).json(&body))
            .await?;
        let doc = decode_document(raw)?;
        info!(collection, id = %doc.id, "document created");
        Ok(doc)
    }
}

#[async_trait]
impl BlobStore for AppwriteClient {
    async fn put(&self, bucket: &str, id: &str, file: BlobUpload) -> StorageResult<String> {
        let path = format!("storage/buckets/{bucket}/files");
        let size = file.bytes.len();
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.filename)
            .mime_str(&file.mime_type)
            .map_err(|e| StorageError::WriteRejected(format!("invalid mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("fileId", id.to_string())
            .part("file", part);
        let created: FileDto = self
            .send_json(&path, self.request(Method::POST, &path).multipart(form))
            .await?;
        info!(bucket, id = %created.id, size, "file uploaded");
        Ok(created.id)
    }

    async fn delete(&self, bucket: &str, id: &str) -> StorageResult<()> {
        let path = format!("storage/buckets/{bucket}/files/{id}");
        let response = self.request(Method::DELETE, &path).send().await?;
        Self::check(&path, response).await?;
        info!(bucket, id, "file deleted");
        Ok(())
    }
}

#[async_trait]
impl SessionService for AppwriteClient {
    async fn is_authenticated(&self) -> bool {
        self.account().await.is_ok()
    }

    async fn sign_in(&self) -> StorageResult<bool> {
        if self.is_authenticated().await {
            debug!("session already active");
            return Ok(true);
        }
        let Some(token) = &self.config.login_token else {
            warn!("no active session and no login token configured");
            return Ok(false);
        };
        let body = serde_json::json!({ "userId": token.user_id, "secret": token.secret });
        let session: SessionDto = self
            .send_json(
                "account/sessions/token",
                self.request(Method::POST, "account/sessions/token").json(&body),
            )
            .await?;
        self.set_session(Some(session.secret));
        info!(user_id = %token.user_id, "session created");
        Ok(true)
    }

    async fn sign_out(&self) -> StorageResult<bool> {
        if !self.is_authenticated().await {
            self.set_session(None);
            return Ok(true);
        }
        let path = "account/sessions/current";
        let response = self.request(Method::DELETE, path).send().await?;
        Self::check(path, response).await?;
        self.set_session(None);
        info!("session deleted");
        Ok(true)
    }

    async fn current_user(&self) -> StorageResult<Option<UserIdentity>> {
        match self.account().await {
            Ok(account) => {
                let avatar = Some(self.initials_avatar_url(&account.name));
                Ok(Some(UserIdentity {
                    id: account.id,
                    name: account.name,
                    email: account.email,
                    avatar,
                }))
            }
            Err(err) if err.is_unauthorized() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl PreferenceStore for AppwriteClient {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let prefs = self.prefs().await?;
        Ok(prefs
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut prefs = self.prefs().await?;
        prefs.insert(key.to_string(), Value::String(value.to_string()));
        let body = serde_json::json!({ "prefs": prefs });
        let path = "account/prefs";
        let response = self.request(Method::PATCH, path).json(&body).send().await?;
        Self::check(path, response).await?;
        debug!(key, "preference updated");
        Ok(())
    }
}
