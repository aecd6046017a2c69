//! Avatar replacement through the preference store.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::Harness;
use rootwise_core::{
    AvatarService, CoreError, FileMediaDevice, GalleryOptions, MediaSource, AVATAR_PREF,
};
use rootwise_store::fakes::MemoryBlobStore;
use rootwise_store::{BlobStore, BlobUpload, PreferenceStore, StorageResult};

/// Preference store noting, at each write, whether a watched blob still exists.
struct WatchingPrefs {
    blobs: Arc<MemoryBlobStore>,
    watched: &'static str,
    blob_present_at_write: Mutex<Vec<bool>>,
}

#[async_trait]
impl PreferenceStore for WatchingPrefs {
    async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        let present = self.blobs.contains("images", self.watched);
        self.blob_present_at_write.lock().unwrap().push(present);
        Ok(())
    }
}

fn upload(name: &str) -> BlobUpload {
    BlobUpload {
        filename: name.into(),
        mime_type: "image/jpeg".into(),
        bytes: vec![1, 2, 3],
    }
}

#[tokio::test]
async fn previous_avatar_blob_is_deleted_before_update() {
    let h = Harness::signed_in().await;
    h.blobs.put("images", "old-avatar", upload("old.jpg")).await.unwrap();
    let old_url = h.ctx.urls().file_view("images", "old-avatar");
    h.prefs.set(AVATAR_PREF, &old_url).await.unwrap();

    let avatars = h.ctx.avatars();
    avatars
        .update_avatar("https://img.test/new.jpg", Some(&old_url))
        .await
        .unwrap();

    assert!(!h.blobs.contains("images", "old-avatar"));
    assert_eq!(h.blobs.delete_calls(), 1);
    assert_eq!(
        avatars.current_avatar().await.unwrap().as_deref(),
        Some("https://img.test/new.jpg")
    );
}

#[tokio::test]
async fn old_blob_is_gone_when_new_url_is_written() {
    let h = Harness::signed_in().await;
    h.blobs.put("images", "old-avatar", upload("old.jpg")).await.unwrap();
    let old_url = h.ctx.urls().file_view("images", "old-avatar");

    let prefs = Arc::new(WatchingPrefs {
        blobs: h.blobs.clone(),
        watched: "old-avatar",
        blob_present_at_write: Mutex::default(),
    });
    let avatars = AvatarService::new(
        h.session.clone(),
        prefs.clone(),
        h.ctx.persistence().clone(),
        h.ctx.urls().clone(),
    );
    avatars
        .update_avatar("https://img.test/new.jpg", Some(&old_url))
        .await
        .unwrap();

    assert_eq!(*prefs.blob_present_at_write.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn failed_delete_keeps_previous_avatar() {
    let h = Harness::signed_in().await;
    let old_url = h.ctx.urls().file_view("images", "never-uploaded");
    h.prefs.set(AVATAR_PREF, &old_url).await.unwrap();

    let err = h
        .ctx
        .avatars()
        .update_avatar("https://img.test/new.jpg", Some(&old_url))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Persistence(_)));
    assert_eq!(h.blobs.delete_calls(), 1);
    assert_eq!(h.prefs.get(AVATAR_PREF).await.unwrap(), Some(old_url));
}

#[tokio::test]
async fn replace_removes_upload_when_update_fails() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("me.png");
    tokio::fs::write(&path, b"png-bytes").await.unwrap();
    let old_url = h.ctx.urls().file_view("images", "never-uploaded");

    let source = MediaSource::gallery(
        Arc::new(FileMediaDevice::new(&path)),
        GalleryOptions::square_crop(),
    );
    let result = h.ctx.avatars().replace_avatar(&source, Some(&old_url)).await;

    assert!(result.is_err());
    assert!(h.blobs.is_empty());
    assert_eq!(h.prefs.get(AVATAR_PREF).await.unwrap(), None);
}

#[tokio::test]
async fn absent_previous_avatar_deletes_nothing() {
    let h = Harness::signed_in().await;
    let avatars = h.ctx.avatars();

    avatars.update_avatar("https://img.test/a.jpg", None).await.unwrap();
    avatars.update_avatar("https://img.test/b.jpg", Some("")).await.unwrap();

    assert_eq!(h.blobs.delete_calls(), 0);
    assert_eq!(
        h.prefs.get(AVATAR_PREF).await.unwrap().as_deref(),
        Some("https://img.test/b.jpg")
    );
}

#[tokio::test]
async fn signed_out_user_has_no_avatar_and_cannot_update() {
    let h = Harness::signed_out().await;
    h.prefs.set(AVATAR_PREF, "https://img.test/stale.jpg").await.unwrap();
    let avatars = h.ctx.avatars();

    assert_eq!(avatars.current_avatar().await.unwrap(), None);
    let err = avatars
        .update_avatar("https://img.test/new.jpg", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Auth(_)));
}

#[tokio::test]
async fn replace_avatar_uploads_picked_image() {
    let h = Harness::signed_in().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("me.png");
    tokio::fs::write(&path, b"png-bytes").await.unwrap();

    let source = MediaSource::gallery(
        Arc::new(FileMediaDevice::new(&path)),
        GalleryOptions::square_crop(),
    );
    let url = h
        .ctx
        .avatars()
        .replace_avatar(&source, None)
        .await
        .unwrap()
        .expect("new avatar url");

    let blob_id = rootwise_core::blob_id_from_url(&url).unwrap();
    let stored = h.blobs.file("images", blob_id).unwrap();
    assert_eq!(stored.mime_type, "image/png");
    assert_eq!(stored.bytes, b"png-bytes");
    assert_eq!(h.prefs.get(AVATAR_PREF).await.unwrap(), Some(url));
}

#[tokio::test]
async fn cancelled_pick_changes_nothing() {
    let h = Harness::signed_in().await;
    let source = MediaSource::gallery(
        Arc::new(FileMediaDevice::cancelled()),
        GalleryOptions::square_crop(),
    );
    assert_eq!(h.ctx.avatars().replace_avatar(&source, None).await.unwrap(), None);
    assert!(h.blobs.is_empty());
    assert_eq!(h.prefs.get(AVATAR_PREF).await.unwrap(), None);
}
