//! Profile avatar stored as a per-user preference.

use std::sync::Arc;

use rootwise_store::{PreferenceStore, SessionService};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::media::MediaSource;
use crate::persistence::PersistenceClient;
use crate::urls::{blob_id_from_url, StorageUrls};

/// Preference key holding the avatar URL.
pub const AVATAR_PREF: &str = "imageUrl";

/// Reads and replaces the signed-in user's avatar.
#[derive(Clone)]
pub struct AvatarService {
    session: Arc<dyn SessionService>,
    preferences: Arc<dyn PreferenceStore>,
    persistence: PersistenceClient,
    urls: StorageUrls,
}

impl AvatarService {
    pub fn new(
        session: Arc<dyn SessionService>,
        preferences: Arc<dyn PreferenceStore>,
        persistence: PersistenceClient,
        urls: StorageUrls,
    ) -> Self {
        Self {
            session,
            preferences,
            persistence,
            urls,
        }
    }

    /// Avatar URL, or `None` when signed out or unset.
    pub async fn current_avatar(&self) -> CoreResult<Option<String>> {
        if !self.session.is_authenticated().await {
            return Ok(None);
        }
        match self.preferences.get(AVATAR_PREF).await {
            Ok(url) => Ok(url.filter(|u| !u.is_empty())),
            Err(err) if err.is_unauthorized() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Store `new_url`, deleting the blob behind a non-empty `old_url` first.
    ///
    /// A failed delete aborts the update; the preference keeps the old URL.
    pub async fn update_avatar(&self, new_url: &str, old_url: Option<&str>) -> CoreResult<()> {
        if !self.session.is_authenticated().await {
            return Err(CoreError::Auth("sign in to change your avatar".into()));
        }
        if let Some(old_blob) = old_url.and_then(blob_id_from_url) {
            if let Err(err) = self.persistence.delete_blob(old_blob).await {
                warn!(blob_id = old_blob, error = %err, "old avatar not deleted, keeping it");
                return Err(err);
            }
        }
        self.preferences
            .set(AVATAR_PREF, new_url)
            .await
            .map_err(CoreError::from_write)?;
        info!("avatar updated");
        Ok(())
    }

    /// Pick an image, upload it and make it the avatar.
    ///
    /// Returns the new URL, or `None` when the user cancelled.
    pub async fn replace_avatar(
        &self,
        source: &MediaSource,
        old_url: Option<&str>,
    ) -> CoreResult<Option<String>> {
        if !self.session.is_authenticated().await {
            return Err(CoreError::Auth("sign in to change your avatar".into()));
        }
        let Some(capture) = source.acquire().await? else {
            return Ok(None);
        };
        let blob_id = self.persistence.upload_blob(&capture).await?;
        let url = self.urls.file_view(self.persistence.bucket(), &blob_id);
        if let Err(err) = self.update_avatar(&url, old_url).await {
            // The upload is unreferenced; the outcome is logged by delete_blob.
            let _ = self.persistence.delete_blob(&blob_id).await;
            return Err(err);
        }
        Ok(Some(url))
    }
}

impl std::fmt::Debug for AvatarService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarService").field("urls", &self.urls).finish()
    }
}
