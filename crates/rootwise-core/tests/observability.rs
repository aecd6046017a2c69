//! Observability tests for pipeline lifecycle tracing.
//!
//! These tests verify that structured tracing events are emitted for key
//! lifecycle events: stage changes, saved records, orphan cleanup and
//! discarded stale results.

mod common;

use common::{capture_in, Harness, ScriptedClassifier};
use rootwise_core::obs::{
    emit_fetch_discarded, emit_orphan_cleanup, emit_record_saved, emit_stage_changed,
    emit_stale_result_discarded, pipeline_span,
};
use rootwise_core::Stage;
use tracing_test::traced_test;

/// Test: emit_stage_changed creates an info-level event
#[traced_test]
#[test]
fn test_emit_stage_changed_logs_transition() {
    emit_stage_changed(3, Stage::Captured, Stage::Analyzing);
    assert!(logs_contain("pipeline.stage_changed"));
    assert!(logs_contain("Analyzing"));
}

/// Test: a self-transition is not an event
#[traced_test]
#[test]
fn test_emit_stage_changed_skips_noop() {
    emit_stage_changed(3, Stage::Idle, Stage::Idle);
    assert!(!logs_contain("pipeline.stage_changed"));
}

#[traced_test]
#[test]
fn test_emit_record_saved_logs_ids() {
    emit_record_saved(9, "rec-1", "blob-1");
    assert!(logs_contain("rec-1"));
    assert!(logs_contain("blob-1"));
}

#[traced_test]
#[test]
fn test_emit_orphan_cleanup_outcomes() {
    emit_orphan_cleanup("blob-ok", None);
    emit_orphan_cleanup("blob-bad", Some("storage offline"));
    assert!(logs_contain("persistence.orphan_deleted"));
    assert!(logs_contain("persistence.orphan_left"));
    assert!(logs_contain("storage offline"));
}

#[traced_test]
#[test]
fn test_stale_and_discarded_events() {
    emit_stale_result_discarded(4, "classify");
    emit_fetch_discarded(1, 2);
    assert!(logs_contain("pipeline.stale_result_discarded"));
    assert!(logs_contain("binding.fetch_discarded"));
}

#[traced_test]
#[test]
fn test_pipeline_span_tags_events() {
    let span = pipeline_span(42);
    let _guard = span.enter();
    tracing::info!("inside run");
    assert!(logs_contain("run_id=42"));
}

/// Test: a full run emits its lifecycle through the real controller
#[traced_test]
#[tokio::test]
async fn test_full_run_is_traced() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let ctl = h.pipeline(ScriptedClassifier::label("leaf_blight"));

    ctl.accept_capture(capture_in(dir.path(), "leaf.jpg").await).unwrap();
    ctl.send().await.unwrap();
    ctl.submit("Tomato").await.unwrap();

    assert!(logs_contain("AwaitingMetadata"));
    assert!(logs_contain("pipeline.record_saved"));
}
