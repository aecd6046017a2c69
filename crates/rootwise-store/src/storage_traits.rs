//! Port definitions for the RootWise backend
//!
//! These traits define the external collaborators consumed by the core:
//! - `DocumentStore`: structured records with query filters
//! - `BlobStore`: binary file storage (images)
//! - `SessionService`: authentication and the current account
//! - `PreferenceStore`: per-user key/value preferences
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module; `appwrite` talks to the hosted backend.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Attribute name of the store-assigned creation timestamp.
pub const CREATED_AT: &str = "$createdAt";

/// Attribute name of the document id.
pub const DOCUMENT_ID: &str = "$id";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// A single clause of a document query.
///
/// Clauses compose by conjunction; orderings apply in the order given
/// (first is primary); `Limit` truncates after filtering and ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// Attribute equals value
    Equal { attribute: String, value: Value },
    /// Ascending order on attribute
    OrderAsc(String),
    /// Descending order on attribute
    OrderDesc(String),
    /// Token search on a string attribute
    Search { attribute: String, text: String },
    /// Return at most this many documents
    Limit(usize),
}

impl Query {
    pub fn equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn order_asc(attribute: impl Into<String>) -> Self {
        Query::OrderAsc(attribute.into())
    }

    pub fn order_desc(attribute: impl Into<String>) -> Self {
        Query::OrderDesc(attribute.into())
    }

    pub fn search(attribute: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Search {
            attribute: attribute.into(),
            text: text.into(),
        }
    }

    pub fn limit(n: usize) -> Self {
        Query::Limit(n)
    }

    /// Wire form understood by the hosted backend (one JSON object per clause).
    pub fn to_wire(&self) -> Value {
        match self {
            Query::Equal { attribute, value } => serde_json::json!({
                "method": "equal",
                "attribute": attribute,
                "values": [value],
            }),
            Query::OrderAsc(attribute) => serde_json::json!({
                "method": "orderAsc",
                "attribute": attribute,
            }),
            Query::OrderDesc(attribute) => serde_json::json!({
                "method": "orderDesc",
                "attribute": attribute,
            }),
            Query::Search { attribute, text } => serde_json::json!({
                "method": "search",
                "attribute": attribute,
                "values": [text],
            }),
            Query::Limit(n) => serde_json::json!({
                "method": "limit",
                "values": [n],
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// A stored document: id and creation time are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Look up a string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Look up a string field that must be present.
    pub fn require_str(&self, name: &str) -> StorageResult<&str> {
        self.str_field(name).ok_or_else(|| {
            StorageError::Decode(format!("document {} missing string field `{name}`", self.id))
        })
    }

    /// Attribute value including the `$id` / `$createdAt` system attributes.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            DOCUMENT_ID => Some(Value::String(self.id.clone())),
            CREATED_AT => Some(Value::String(self.created_at.to_rfc3339())),
            other => self.fields.get(other).cloned(),
        }
    }

    /// Compare two documents on one attribute. Missing values sort first.
    pub fn compare_on(&self, other: &Document, attribute: &str) -> Ordering {
        if attribute == CREATED_AT {
            return self.created_at.cmp(&other.created_at);
        }
        match (self.attribute(attribute), other.attribute(attribute)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => compare_values(&a, &b),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// How the id of a new document is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewDocumentId {
    /// Let the store generate a unique id
    Unique,
    /// Use the caller-provided id
    Given(String),
}

/// Structured record storage with query filters.
///
/// Guarantees:
/// - `list` returns documents matching every `Equal`/`Search` clause,
///   ordered by the ordering clauses, truncated by `Limit`.
/// - `create` assigns `created_at`; documents are never mutated afterwards.
/// - `get` returns `StorageError::NotFound` for unknown ids.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List documents of a collection matching the queries.
    async fn list(&self, collection: &str, queries: &[Query]) -> StorageResult<Vec<Document>>;

    /// Fetch one document by id.
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Document>;

    /// Create a document with the given fields.
    async fn create(
        &self,
        collection: &str,
        id: NewDocumentId,
        fields: Map<String, Value>,
    ) -> StorageResult<Document>;
}

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

/// A file to be written to the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Binary file storage.
///
/// Guarantees:
/// - `put(bucket, id, file)` returns `id` once the file is durable.
/// - `delete` of an unknown id fails with `StorageError::NotFound`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a file under the given id, returning the id.
    async fn put(&self, bucket: &str, id: &str, file: BlobUpload) -> StorageResult<String>;

    /// Delete a file.
    async fn delete(&self, bucket: &str, id: &str) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// SessionService
// ---------------------------------------------------------------------------

/// An authenticated account, read-only to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Avatar reference (URL) chosen by the backend
    pub avatar: Option<String>,
}

/// Authentication/session collaborator.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Whether an active session exists.
    async fn is_authenticated(&self) -> bool;

    /// Establish a session. Returns `true` when one exists afterwards.
    async fn sign_in(&self) -> StorageResult<bool>;

    /// End the current session. Returns `true` when none exists afterwards.
    async fn sign_out(&self) -> StorageResult<bool>;

    /// The account behind the active session, if any.
    async fn current_user(&self) -> StorageResult<Option<UserIdentity>>;
}

// ---------------------------------------------------------------------------
// PreferenceStore
// ---------------------------------------------------------------------------

/// Per-user key/value preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Read a preference; `None` when unset.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a preference.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}
