//! Capture → classify → confirm → persist state machine.
//!
//! ```text
//! Idle ──acquire──▶ Captured ──send──▶ Analyzing ──ok──▶ AwaitingMetadata ──submit──▶ Saving ──ok──▶ Completed
//!   ▲                 │  ▲                 │  └──err──┐         │    ▲                   │
//!   └────discard──────┘  └─────────────────┼──────────┘         │    └───────err─────────┘
//!   ▲                                      │                    │
//!   └──────────discard─────────────────────┘                    │
//!   └──────────cancel───────────────────────────────────────────┘
//! ```
//!
//! Failures revert to the interactive stage preceding the failed call, so
//! the capture and classification survive transient errors. Every snapshot
//! is published on a `watch` channel.
//!
//! Network calls run on spawned tasks and settle against the run that
//! issued them. A call whose run was discarded meanwhile has its result
//! dropped on arrival; the request itself is not aborted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, Instrument};

use crate::binding::Refresh;
use crate::classify::{ClassificationClient, ClassificationResult};
use crate::context::UserBinding;
use crate::error::CoreError;
use crate::media::{MediaCapture, MediaSource};
use crate::models::PlantRecord;
use crate::obs;
use crate::persistence::PersistenceClient;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    Idle,
    Captured,
    Analyzing,
    AwaitingMetadata,
    Saving,
    Completed,
}

impl Stage {
    /// An asynchronous call for the current run is outstanding.
    pub fn is_busy(self) -> bool {
        matches!(self, Stage::Analyzing | Stage::Saving)
    }
}

/// User actions driving the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Acquire,
    Discard,
    Send,
    Cancel,
    Submit,
    Reset,
}

/// Dismissable user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    fn for_error(title: &str, err: &CoreError) -> Self {
        let title = match err {
            CoreError::PermissionDenied(_) => "Permission Denied",
            CoreError::Validation(_) | CoreError::Auth(_) => "Error",
            _ => title,
        };
        Self::new(title, err.to_string())
    }
}

/// Observable pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// Incremented each time a capture starts a new run
    pub run_id: u64,
    pub stage: Stage,
    pub capture: Option<MediaCapture>,
    pub classification: Option<ClassificationResult>,
    pub notice: Option<Notice>,
    /// The record saved by a completed run, which holds nothing else
    pub record: Option<PlantRecord>,
}

/// Pipeline errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A call for the current run is outstanding; the action was ignored.
    #[error("{action:?} ignored while {stage:?} is in progress")]
    Busy { stage: Stage, action: Action },

    #[error("{action:?} is not possible in stage {stage:?}")]
    InvalidTransition { stage: Stage, action: Action },

    /// The run was discarded before its call settled.
    #[error("run {run_id} was abandoned")]
    Abandoned { run_id: u64 },

    #[error(transparent)]
    Failed(#[from] CoreError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

struct Inner {
    classifier: Arc<dyn ClassificationClient>,
    persistence: PersistenceClient,
    user: Arc<UserBinding>,
    home: Arc<dyn Refresh>,
    state: Mutex<PipelineSnapshot>,
    slot: watch::Sender<PipelineSnapshot>,
}

/// Orchestrates one capture run at a time. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<Inner>,
}

impl PipelineController {
    /// `home` is refreshed each time a run saves a record.
    pub fn new(
        classifier: Arc<dyn ClassificationClient>,
        persistence: PersistenceClient,
        user: Arc<UserBinding>,
        home: Arc<dyn Refresh>,
    ) -> Self {
        let (slot, _) = watch::channel(PipelineSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                classifier,
                persistence,
                user,
                home,
                state: Mutex::new(PipelineSnapshot::default()),
                slot,
            }),
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.inner.lock().clone()
    }

    pub fn stage(&self) -> Stage {
        self.inner.lock().stage
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.inner.slot.subscribe()
    }

    /// Acquire media from `source` and start a run with it.
    ///
    /// User cancellation leaves the pipeline idle and returns `Idle`.
    pub async fn acquire(&self, source: &MediaSource) -> PipelineResult<Stage> {
        self.inner.begin(Action::Acquire, &[Stage::Idle])?;
        match source.acquire().await {
            Ok(Some(capture)) => self.accept_capture(capture),
            Ok(None) => Ok(self.stage()),
            Err(err) => {
                let mut state = self.inner.lock();
                state.notice = Some(Notice::for_error("Error", &err));
                self.inner.publish(&state);
                Err(err.into())
            }
        }
    }

    /// Start a run with an already acquired capture.
    pub fn accept_capture(&self, capture: MediaCapture) -> PipelineResult<Stage> {
        let mut state = self.inner.begin(Action::Acquire, &[Stage::Idle])?;
        let from = state.stage;
        *state = PipelineSnapshot {
            run_id: state.run_id + 1,
            stage: Stage::Captured,
            capture: Some(capture),
            ..PipelineSnapshot::default()
        };
        obs::emit_stage_changed(state.run_id, from, state.stage);
        self.inner.publish(&state);
        Ok(state.stage)
    }

    /// Drop the capture (retake). Also abandons an outstanding classification.
    pub fn discard(&self) -> PipelineResult<Stage> {
        self.inner
            .abandon(Action::Discard, &[Stage::Captured, Stage::Analyzing])
    }

    /// Drop capture and classification before saving.
    pub fn cancel(&self) -> PipelineResult<Stage> {
        self.inner.abandon(Action::Cancel, &[Stage::AwaitingMetadata])
    }

    /// Start a fresh run after completion.
    pub fn reset(&self) -> PipelineResult<Stage> {
        self.inner
            .abandon(Action::Reset, &[Stage::Completed, Stage::Idle])
    }

    pub fn dismiss_notice(&self) {
        let mut state = self.inner.lock();
        if state.notice.take().is_some() {
            self.inner.publish(&state);
        }
    }

    /// Send the capture to the classifier.
    ///
    /// On failure the pipeline returns to `Captured` with the capture kept.
    pub async fn send(&self) -> PipelineResult<Stage> {
        let (run_id, capture) = {
            let mut state = self.inner.begin(Action::Send, &[Stage::Captured])?;
            let capture = state.capture.clone().ok_or(PipelineError::InvalidTransition {
                stage: state.stage,
                action: Action::Send,
            })?;
            state.notice = None;
            self.inner.transition(&mut state, Stage::Analyzing);
            (state.run_id, capture)
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                let result = inner.classifier.classify(&capture).await;
                inner.settle_classification(run_id, result)
            }
            .instrument(obs::pipeline_span(run_id)),
        );
        task.await.map_err(|e| {
            PipelineError::Failed(CoreError::Network(format!("classification task failed: {e}")))
        })?
    }

    /// Save the run under `plant_name`.
    ///
    /// A blank name is rejected without any network call. On failure the
    /// pipeline returns to `AwaitingMetadata` with capture and
    /// classification kept; a blob uploaded for a record that could not be
    /// created is deleted.
    pub async fn submit(&self, plant_name: &str) -> PipelineResult<Stage> {
        let (run_id, owner, capture, classification, plant_name) = {
            let mut state = self.inner.begin(Action::Submit, &[Stage::AwaitingMetadata])?;

            let plant_name = plant_name.trim().to_string();
            if plant_name.is_empty() {
                return Err(self.inner.reject(
                    &mut state,
                    CoreError::Validation("Please enter a plant name".into()),
                ));
            }
            let Some(owner) = self.inner.user.data().flatten() else {
                return Err(self
                    .inner
                    .reject(&mut state, CoreError::Auth("sign in to save plants".into())));
            };
            let (Some(capture), Some(classification)) =
                (state.capture.clone(), state.classification.clone())
            else {
                return Err(PipelineError::InvalidTransition {
                    stage: state.stage,
                    action: Action::Submit,
                });
            };
            state.notice = None;
            self.inner.transition(&mut state, Stage::Saving);
            (state.run_id, owner, capture, classification, plant_name)
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                let result = match inner.persistence.upload_blob(&capture).await {
                    Ok(blob_id) => {
                        let created = inner
                            .persistence
                            .create_record(&owner, &plant_name, &classification, &blob_id)
                            .await;
                        if created.is_err() {
                            // Best effort; the outcome is logged by delete_blob.
                            let _ = inner.persistence.delete_blob(&blob_id).await;
                        }
                        created
                    }
                    Err(err) => Err(err),
                };
                let settled = inner.settle_save(run_id, result);
                if settled.is_ok() {
                    inner.home.refresh().await;
                }
                settled
            }
            .instrument(obs::pipeline_span(run_id)),
        );
        task.await.map_err(|e| {
            PipelineError::Failed(CoreError::Persistence(format!("save task failed: {e}")))
        })?
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("state", &*self.inner.lock())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PipelineSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PipelineSnapshot) {
        self.slot.send_replace(state.clone());
    }

    fn transition(&self, state: &mut PipelineSnapshot, to: Stage) {
        obs::emit_stage_changed(state.run_id, state.stage, to);
        state.stage = to;
        self.publish(state);
    }

    /// Lock the state if `action` is allowed in the current stage.
    fn begin(
        &self,
        action: Action,
        allowed: &[Stage],
    ) -> PipelineResult<MutexGuard<'_, PipelineSnapshot>> {
        let state = self.lock();
        if allowed.contains(&state.stage) {
            return Ok(state);
        }
        let stage = state.stage;
        if stage.is_busy() {
            debug!(?stage, ?action, "action ignored while busy");
            Err(PipelineError::Busy { stage, action })
        } else {
            Err(PipelineError::InvalidTransition { stage, action })
        }
    }

    /// Return to `Idle`, dropping everything the run held.
    fn abandon(&self, action: Action, allowed: &[Stage]) -> PipelineResult<Stage> {
        let mut state = self.begin(action, allowed)?;
        let from = state.stage;
        *state = PipelineSnapshot {
            run_id: state.run_id,
            ..PipelineSnapshot::default()
        };
        obs::emit_stage_changed(state.run_id, from, Stage::Idle);
        self.publish(&state);
        Ok(Stage::Idle)
    }

    /// Surface an error without changing stage.
    fn reject(&self, state: &mut PipelineSnapshot, err: CoreError) -> PipelineError {
        state.notice = Some(Notice::for_error("Error", &err));
        self.publish(state);
        err.into()
    }

    /// Take the lock for a settling call, or `None` if its run moved on.
    fn current(&self, run_id: u64, expected: Stage, call: &str) -> Option<MutexGuard<'_, PipelineSnapshot>> {
        let state = self.lock();
        if state.run_id == run_id && state.stage == expected {
            Some(state)
        } else {
            obs::emit_stale_result_discarded(run_id, call);
            None
        }
    }

    fn settle_classification(
        &self,
        run_id: u64,
        result: Result<ClassificationResult, CoreError>,
    ) -> PipelineResult<Stage> {
        let Some(mut state) = self.current(run_id, Stage::Analyzing, "classify") else {
            return Err(PipelineError::Abandoned { run_id });
        };
        match result {
            Ok(classification) => {
                state.classification = Some(classification);
                self.transition(&mut state, Stage::AwaitingMetadata);
                Ok(state.stage)
            }
            Err(err) => {
                state.notice = Some(Notice::for_error("Upload Failed", &err));
                self.transition(&mut state, Stage::Captured);
                Err(err.into())
            }
        }
    }

    fn settle_save(
        &self,
        run_id: u64,
        result: Result<PlantRecord, CoreError>,
    ) -> PipelineResult<Stage> {
        let Some(mut state) = self.current(run_id, Stage::Saving, "save") else {
            return Err(PipelineError::Abandoned { run_id });
        };
        match result {
            Ok(record) => {
                obs::emit_record_saved(run_id, &record.id, &record.blob_id);
                state.capture = None;
                state.classification = None;
                state.record = Some(record);
                self.transition(&mut state, Stage::Completed);
                Ok(state.stage)
            }
            Err(err) => {
                state.notice = Some(Notice::for_error("Saving Failed", &err));
                self.transition(&mut state, Stage::AwaitingMetadata);
                Err(err.into())
            }
        }
    }
}
