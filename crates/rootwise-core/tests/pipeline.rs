//! Pipeline state machine tests over in-memory backends.

mod common;

use std::sync::Arc;

use common::{capture_in, DenyingDevice, Harness, ScriptedClassifier};
use rootwise_core::{
    ClassificationResult, CoreError, FileMediaDevice, GalleryOptions, MediaSource,
    PipelineError, Stage,
};
use tokio::sync::Notify;

/// Drive a pipeline to `AwaitingMetadata` with label `label`.
async fn classified(
    h: &Harness,
    dir: &tempfile::TempDir,
    label: &str,
) -> rootwise_core::PipelineController {
    let ctl = h.pipeline(ScriptedClassifier::label(label));
    ctl.accept_capture(capture_in(dir.path(), "leaf.jpg").await).unwrap();
    assert_eq!(ctl.send().await.unwrap(), Stage::AwaitingMetadata);
    ctl
}

#[tokio::test]
async fn happy_path_saves_one_record_and_refreshes_home() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();

    let home = h.home();
    home.refetch(None).await;
    assert_eq!(home.data(), Some(vec![]));

    let ctl = h
        .ctx
        .pipeline(ScriptedClassifier::label("leaf_blight"), home.clone());
    assert_eq!(
        ctl.accept_capture(capture_in(dir.path(), "leaf.jpg").await).unwrap(),
        Stage::Captured
    );
    assert_eq!(ctl.send().await.unwrap(), Stage::AwaitingMetadata);
    assert_eq!(ctl.submit("Tomato").await.unwrap(), Stage::Completed);

    let snap = ctl.snapshot();
    assert_eq!(snap.capture, None);
    assert_eq!(snap.classification, None);
    let record = snap.record.expect("record saved");
    assert_eq!(record.plant_name, "Tomato");
    assert_eq!(record.disease, "leaf_blight");
    assert_eq!(record.owner, "ada@example.com");
    assert!(h.blobs.contains("images", &record.blob_id));
    assert_eq!(h.docs.count("userImages"), 1);

    let listed = home.data().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
    assert!(!home.loading());
}

#[tokio::test]
async fn blank_plant_name_makes_no_calls() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let ctl = classified(&h, &dir, "leaf_blight").await;

    for name in ["", "   ", "\t\n"] {
        let err = ctl.submit(name).await.unwrap_err();
        assert!(matches!(err, PipelineError::Failed(CoreError::Validation(_))));
    }

    let snap = ctl.snapshot();
    assert_eq!(snap.stage, Stage::AwaitingMetadata);
    assert_eq!(snap.notice.unwrap().message, "Please enter a plant name");
    assert_eq!(h.blobs.put_calls(), 0);
    assert_eq!(h.docs.create_calls(), 0);
}

#[tokio::test]
async fn record_failure_keeps_assets_and_cleans_up_blob() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let ctl = classified(&h, &dir, "leaf_blight").await;
    let before = ctl.snapshot();

    h.docs.set_fail_creates(true);
    let err = ctl.submit("Tomato").await.unwrap_err();
    assert!(matches!(err, PipelineError::Failed(CoreError::Persistence(_))));

    let snap = ctl.snapshot();
    assert_eq!(snap.stage, Stage::AwaitingMetadata);
    assert_eq!(snap.capture, before.capture);
    assert_eq!(snap.classification, before.classification);
    assert_eq!(snap.notice.unwrap().title, "Saving Failed");
    assert_eq!(h.blobs.put_calls(), 1);
    assert_eq!(h.blobs.delete_calls(), 1);
    assert!(h.blobs.is_empty());

    // Retry without recapturing or reclassifying
    h.docs.set_fail_creates(false);
    assert_eq!(ctl.submit("Tomato").await.unwrap(), Stage::Completed);
    assert_eq!(h.docs.count("userImages"), 1);
    assert_eq!(h.blobs.len(), 1);
    assert!(ctl.snapshot().notice.is_none());
}

#[tokio::test]
async fn upload_failure_skips_record_creation() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let ctl = classified(&h, &dir, "rust").await;

    h.blobs.set_fail_puts(true);
    assert!(ctl.submit("Bean").await.is_err());
    assert_eq!(ctl.stage(), Stage::AwaitingMetadata);
    assert_eq!(h.docs.create_calls(), 0);
    assert_eq!(h.blobs.delete_calls(), 0);
}

#[tokio::test]
async fn classification_failure_returns_to_captured() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let classifier = ScriptedClassifier::new(vec![
        Err(CoreError::Server {
            status: 500,
            reason: "Internal Server Error".into(),
        }),
        Ok(ClassificationResult::new("powdery_mildew").with_confidence(0.9)),
    ]);
    let ctl = h.pipeline(classifier.clone());
    let capture = capture_in(dir.path(), "leaf.png").await;
    ctl.accept_capture(capture.clone()).unwrap();

    let err = ctl.send().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Failed(CoreError::Server { status: 500, .. })
    ));
    let snap = ctl.snapshot();
    assert_eq!(snap.stage, Stage::Captured);
    assert_eq!(snap.capture, Some(capture));
    assert_eq!(snap.notice.as_ref().unwrap().title, "Upload Failed");

    ctl.dismiss_notice();
    assert!(ctl.snapshot().notice.is_none());

    assert_eq!(ctl.send().await.unwrap(), Stage::AwaitingMetadata);
    assert_eq!(classifier.calls(), 2);
    assert_eq!(
        ctl.snapshot().classification.unwrap().confidence,
        Some(0.9)
    );
}

#[tokio::test]
async fn actions_are_ignored_while_analyzing() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let classifier = ScriptedClassifier::gated(
        vec![Ok(ClassificationResult::new("leaf_blight"))],
        gate.clone(),
    );
    let ctl = h.pipeline(classifier.clone());
    ctl.accept_capture(capture_in(dir.path(), "leaf.jpg").await).unwrap();

    let pending = tokio::spawn({
        let ctl = ctl.clone();
        async move { ctl.send().await }
    });
    let mut rx = ctl.subscribe();
    rx.wait_for(|s| s.stage == Stage::Analyzing).await.unwrap();

    assert!(matches!(
        ctl.send().await,
        Err(PipelineError::Busy { stage: Stage::Analyzing, .. })
    ));
    assert!(matches!(
        ctl.submit("Tomato").await,
        Err(PipelineError::Busy { .. })
    ));
    assert!(matches!(ctl.cancel(), Err(PipelineError::Busy { .. })));

    gate.notify_one();
    assert_eq!(pending.await.unwrap().unwrap(), Stage::AwaitingMetadata);
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn discarded_run_drops_late_classification() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let classifier = ScriptedClassifier::gated(
        vec![Ok(ClassificationResult::new("leaf_blight"))],
        gate.clone(),
    );
    let ctl = h.pipeline(classifier);
    ctl.accept_capture(capture_in(dir.path(), "first.jpg").await).unwrap();
    let first_run = ctl.snapshot().run_id;

    let pending = tokio::spawn({
        let ctl = ctl.clone();
        async move { ctl.send().await }
    });
    let mut rx = ctl.subscribe();
    rx.wait_for(|s| s.stage == Stage::Analyzing).await.unwrap();

    // Retake while the classifier is still working
    assert_eq!(ctl.discard().unwrap(), Stage::Idle);
    ctl.accept_capture(capture_in(dir.path(), "second.jpg").await).unwrap();

    gate.notify_one();
    assert_eq!(
        pending.await.unwrap(),
        Err(PipelineError::Abandoned { run_id: first_run })
    );

    let snap = ctl.snapshot();
    assert_eq!(snap.stage, Stage::Captured);
    assert!(snap.classification.is_none());
    assert_eq!(snap.capture.unwrap().filename(), "second.jpg");
}

#[tokio::test]
async fn cancel_and_reset_return_to_idle() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();

    let ctl = classified(&h, &dir, "leaf_blight").await;
    assert_eq!(ctl.cancel().unwrap(), Stage::Idle);
    let snap = ctl.snapshot();
    assert!(snap.capture.is_none() && snap.classification.is_none());

    let ctl = classified(&h, &dir, "leaf_blight").await;
    ctl.submit("Tomato").await.unwrap();
    assert!(matches!(
        ctl.accept_capture(capture_in(dir.path(), "next.jpg").await),
        Err(PipelineError::InvalidTransition { stage: Stage::Completed, .. })
    ));
    assert!(matches!(ctl.cancel(), Err(PipelineError::InvalidTransition { .. })));
    assert_eq!(ctl.reset().unwrap(), Stage::Idle);
    assert!(ctl.snapshot().record.is_none());
}

#[tokio::test]
async fn save_without_session_is_an_auth_error() {
    let h = Harness::signed_out().await;
    let dir = tempfile::tempdir().unwrap();
    let ctl = classified(&h, &dir, "leaf_blight").await;

    let err = ctl.submit("Tomato").await.unwrap_err();
    assert!(matches!(err, PipelineError::Failed(CoreError::Auth(_))));
    assert_eq!(ctl.stage(), Stage::AwaitingMetadata);
    assert_eq!(h.blobs.put_calls(), 0);
}

#[tokio::test]
async fn permission_denied_keeps_pipeline_idle() {
    let h = Harness::signed_in().await;
    let ctl = h.pipeline(ScriptedClassifier::label("x"));

    let err = ctl
        .acquire(&MediaSource::camera(Arc::new(DenyingDevice)))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Failed(CoreError::PermissionDenied(_))));
    let snap = ctl.snapshot();
    assert_eq!(snap.stage, Stage::Idle);
    assert_eq!(snap.notice.unwrap().title, "Permission Denied");
}

#[tokio::test]
async fn acquire_from_gallery_file() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("basil.png");
    tokio::fs::write(&path, b"png").await.unwrap();
    let ctl = h.pipeline(ScriptedClassifier::label("healthy"));

    let cancelled = MediaSource::gallery(
        Arc::new(FileMediaDevice::cancelled()),
        GalleryOptions::default(),
    );
    assert_eq!(ctl.acquire(&cancelled).await.unwrap(), Stage::Idle);

    let source = MediaSource::gallery(Arc::new(FileMediaDevice::new(&path)), GalleryOptions::default());
    assert_eq!(ctl.acquire(&source).await.unwrap(), Stage::Captured);
    let capture = ctl.snapshot().capture.unwrap();
    assert_eq!(capture.mime_type, "image/png");
    assert_eq!(capture.size, 3);
}
