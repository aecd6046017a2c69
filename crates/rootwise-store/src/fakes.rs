//! In-memory fakes for the backend ports (testing and offline use)
//!
//! Provides `MemoryDocumentStore`, `MemoryBlobStore`, `MemorySessionService`
//! and `MemoryPreferenceStore` that satisfy the trait contracts without any
//! external dependencies. Each fake counts calls and can be told to fail
//! writes, so callers can assert on partial-failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Collections {
    docs: HashMap<String, Vec<Document>>,
    last_created: Option<DateTime<Utc>>,
}

/// In-memory document store backed by `HashMap<collection, Vec<Document>>`.
///
/// Creation timestamps are strictly increasing, so `$createdAt` ordering is
/// deterministic even for documents created in the same instant.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Collections>,
    fail_creates: AtomicBool,
    fail_reads: AtomicBool,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` fail with `WriteRejected`.
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `list`/`get` fail with `Transport`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `create` calls observed, failed ones included.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `list` calls observed.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        lock(&self.inner)
            .docs
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Seed a document directly, bypassing failure injection and counters.
    pub fn insert(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Document {
        let mut inner = lock(&self.inner);
        Self::insert_locked(&mut inner, collection, id.to_string(), fields)
    }

    fn insert_locked(
        inner: &mut Collections,
        collection: &str,
        id: String,
        fields: Map<String, Value>,
    ) -> Document {
        let now = Utc::now();
        let created_at = match inner.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        inner.last_created = Some(created_at);
        let doc = Document {
            id,
            created_at,
            fields,
        };
        inner
            .docs
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        doc
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("injected read failure".into()));
        }
        Ok(())
    }
}

/// Evaluate queries against a document set the way the hosted backend does.
pub fn apply_queries(docs: &[Document], queries: &[Query]) -> StorageResult<Vec<Document>> {
    let mut out: Vec<Document> = docs
        .iter()
        .filter(|d| queries.iter().all(|q| matches_clause(d, q)))
        .cloned()
        .collect();

    let orderings: Vec<&Query> = queries
        .iter()
        .filter(|q| matches!(q, Query::OrderAsc(_) | Query::OrderDesc(_)))
        .collect();
    if !orderings.is_empty() {
        out.sort_by(|a, b| {
            for q in &orderings {
                let ord = match q {
                    Query::OrderAsc(attr) => a.compare_on(b, attr),
                    Query::OrderDesc(attr) => b.compare_on(a, attr),
                    _ => std::cmp::Ordering::Equal,
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let mut limits = queries.iter().filter_map(|q| match q {
        Query::Limit(n) => Some(*n),
        _ => None,
    });
    if let Some(n) = limits.next() {
        if limits.next().is_some() {
            return Err(StorageError::InvalidQuery("more than one limit clause".into()));
        }
        out.truncate(n);
    }
    Ok(out)
}

fn matches_clause(doc: &Document, query: &Query) -> bool {
    match query {
        Query::Equal { attribute, value } => doc.attribute(attribute).as_ref() == Some(value),
        Query::Search { attribute, text } => {
            let Some(haystack) = doc.str_field(attribute) else {
                return false;
            };
            let haystack = haystack.to_lowercase();
            text.split_whitespace()
                .all(|token| haystack.contains(&token.to_lowercase()))
        }
        _ => true,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, collection: &str, queries: &[Query]) -> StorageResult<Vec<Document>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let inner = lock(&self.inner);
        let docs = inner.docs.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        apply_queries(docs, queries)
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Document> {
        self.check_reads()?;
        let inner = lock(&self.inner);
        inner
            .docs
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("{collection}/{id}")))
    }

    async fn create(
        &self,
        collection: &str,
        id: NewDocumentId,
        fields: Map<String, Value>,
    ) -> StorageResult<Document> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("injected create failure".into()));
        }
        let mut inner = lock(&self.inner);
        let id = match id {
            NewDocumentId::Unique => uuid::Uuid::new_v4().simple().to_string(),
            NewDocumentId::Given(id) => {
                let taken = inner
                    .docs
                    .get(collection)
                    .is_some_and(|docs| docs.iter().any(|d| d.id == id));
                if taken {
                    return Err(StorageError::WriteRejected(format!(
                        "document {collection}/{id} already exists"
                    )));
                }
                id
            }
        };
        Ok(Self::insert_locked(&mut inner, collection, id, fields))
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// In-memory blob store backed by `HashMap<(bucket, id), BlobUpload>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    files: Mutex<HashMap<(String, String), BlobUpload>>,
    fail_puts: AtomicBool,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with `WriteRejected`.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, bucket: &str, id: &str) -> bool {
        lock(&self.files).contains_key(&(bucket.to_string(), id.to_string()))
    }

    pub fn file(&self, bucket: &str, id: &str) -> Option<BlobUpload> {
        lock(&self.files)
            .get(&(bucket.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of stored files across all buckets.
    pub fn len(&self) -> usize {
        lock(&self.files).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bucket: &str, id: &str, file: BlobUpload) -> StorageResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("injected put failure".into()));
        }
        let mut files = lock(&self.files);
        let key = (bucket.to_string(), id.to_string());
        if files.contains_key(&key) {
            return Err(StorageError::WriteRejected(format!(
                "file {bucket}/{id} already exists"
            )));
        }
        files.insert(key, file);
        Ok(id.to_string())
    }

    async fn delete(&self, bucket: &str, id: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut files = lock(&self.files);
        files
            .remove(&(bucket.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("{bucket}/{id}")))
    }
}

// ---------------------------------------------------------------------------
// MemorySessionService
// ---------------------------------------------------------------------------

/// In-memory session: one known account that is either signed in or not.
#[derive(Debug)]
pub struct MemorySessionService {
    account: UserIdentity,
    active: AtomicBool,
}

impl MemorySessionService {
    /// A session that is already active for `account`.
    pub fn signed_in(account: UserIdentity) -> Self {
        Self {
            account,
            active: AtomicBool::new(true),
        }
    }

    /// A signed-out session; `sign_in` activates `account`.
    pub fn signed_out(account: UserIdentity) -> Self {
        Self {
            account,
            active: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionService for MemorySessionService {
    async fn is_authenticated(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn sign_in(&self) -> StorageResult<bool> {
        self.active.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn sign_out(&self) -> StorageResult<bool> {
        self.active.store(false, Ordering::SeqCst);
        Ok(true)
    }

    async fn current_user(&self) -> StorageResult<Option<UserIdentity>> {
        if self.active.load(Ordering::SeqCst) {
            Ok(Some(self.account.clone()))
        } else {
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryPreferenceStore
// ---------------------------------------------------------------------------

/// In-memory preferences backed by a `HashMap<key, value>`.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    prefs: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.prefs).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        lock(&self.prefs).insert(key.to_string(), value.to_string());
        Ok(())
    }
}
