//! Shared fixtures for rootwise-core integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rootwise_core::{
    AppConfig, AppContext, Backend, ClassificationClient, ClassificationResult, CoreError,
    CoreResult, FilterState, MediaCapture, MediaDevice, PipelineController, RecordsBinding,
    SourceKind,
};
use rootwise_store::fakes::{
    MemoryBlobStore, MemoryDocumentStore, MemoryPreferenceStore, MemorySessionService,
};
use rootwise_store::UserIdentity;
use serde_json::{Map, Value};
use tokio::sync::Notify;

pub const ENDPOINT: &str = "https://backend.test/v1";

pub fn ada() -> UserIdentity {
    UserIdentity {
        id: "user-ada".into(),
        name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        avatar: None,
    }
}

pub fn config() -> AppConfig {
    AppConfig::new("proj", "db", "http://classifier.invalid/predict").with_endpoint(ENDPOINT)
}

pub fn fields(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Application context over in-memory fakes, with handles to inspect them.
pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub docs: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub prefs: Arc<MemoryPreferenceStore>,
    pub session: Arc<MemorySessionService>,
}

impl Harness {
    pub async fn signed_in() -> Self {
        Self::start(MemorySessionService::signed_in(ada())).await
    }

    pub async fn signed_out() -> Self {
        Self::start(MemorySessionService::signed_out(ada())).await
    }

    async fn start(session: MemorySessionService) -> Self {
        let docs = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        let session = Arc::new(session);
        let backend = Backend {
            session: session.clone(),
            documents: docs.clone(),
            blobs: blobs.clone(),
            preferences: prefs.clone(),
        };
        let ctx = AppContext::start(config(), backend).await;
        Self {
            ctx,
            docs,
            blobs,
            prefs,
            session,
        }
    }

    /// Home records binding for the signed-in user.
    pub fn home(&self) -> Arc<RecordsBinding> {
        let filter = FilterState::new(self.ctx.user().map(|u| u.email));
        self.ctx.home_binding(&filter)
    }

    /// Pipeline refreshing a fresh home binding.
    pub fn pipeline(&self, classifier: Arc<dyn ClassificationClient>) -> PipelineController {
        self.ctx.pipeline(classifier, self.home())
    }

    pub fn add_record(&self, plant: &str, disease: &str, blob: &str) -> String {
        self.docs
            .insert(
                "userImages",
                &format!("rec-{}", self.docs.count("userImages") + 1),
                fields(&[
                    ("name", "ada@example.com"),
                    ("plantname", plant),
                    ("disease", disease),
                    ("image", blob),
                ]),
            )
            .id
    }

    pub fn add_disease(&self, id: &str, name: &str, cure: &str) {
        self.docs.insert(
            "diseases",
            id,
            fields(&[("name", name), ("cure", cure), ("image", "https://img.test/x.png")]),
        );
    }
}

/// Write a small image file and describe it.
pub async fn capture_in(dir: &Path, name: &str) -> MediaCapture {
    let path = dir.join(name);
    tokio::fs::write(&path, b"\xff\xd8\xff\xe0fake-jpeg").await.unwrap();
    MediaCapture::from_path(&path).await.unwrap()
}

/// Classifier replaying scripted outcomes, optionally held until released.
pub struct ScriptedClassifier {
    outcomes: Mutex<VecDeque<CoreResult<ClassificationResult>>>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(outcomes: Vec<CoreResult<ClassificationResult>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn gated(outcomes: Vec<CoreResult<ClassificationResult>>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn label(label: &str) -> Arc<Self> {
        Self::new(vec![Ok(ClassificationResult::new(label))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationClient for ScriptedClassifier {
    async fn classify(&self, _capture: &MediaCapture) -> CoreResult<ClassificationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Network("no scripted outcome".into())))
    }
}

/// Device that refuses every permission request.
pub struct DenyingDevice;

#[async_trait]
impl MediaDevice for DenyingDevice {
    async fn request_permission(&self, _kind: SourceKind) -> CoreResult<bool> {
        Ok(false)
    }

    async fn acquire(&self, _kind: SourceKind) -> CoreResult<Option<MediaCapture>> {
        panic!("acquire called without permission")
    }
}
