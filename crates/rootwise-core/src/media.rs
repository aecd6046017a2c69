//! Media acquisition: camera and gallery sources.
//!
//! A [`MediaSource`] asks its [`MediaDevice`] for permission, then for
//! exactly one [`MediaCapture`]. The device abstracts the hardware; the
//! CLI uses [`FileMediaDevice`], tests use scripted devices.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rootwise_store::BlobUpload;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

/// Filename used when a capture URI has no usable last segment.
pub const DEFAULT_FILENAME: &str = "photo.jpg";

/// MIME type used when the extension is unknown or missing.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// A locally held image reference, owned by one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCapture {
    /// URI-like handle (a filesystem path for local files)
    pub uri: String,
    pub mime_type: String,
    pub size: u64,
}

impl MediaCapture {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    /// Describe a file on disk: MIME type from the extension, size from metadata.
    pub async fn from_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CoreError::MediaUnreadable(format!("{}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(CoreError::MediaUnreadable(format!(
                "{} is not a file",
                path.display()
            )));
        }
        let uri = path.to_string_lossy().into_owned();
        let mime_type = infer_mime(&uri);
        Ok(Self::new(uri, mime_type, metadata.len()))
    }

    /// Last path segment of the URI.
    pub fn filename(&self) -> &str {
        self.uri
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
    }

    /// Read the image bytes.
    pub async fn read(&self) -> CoreResult<Vec<u8>> {
        tokio::fs::read(&self.uri)
            .await
            .map_err(|e| CoreError::MediaUnreadable(format!("{}: {e}", self.uri)))
    }

    /// Read the capture into an upload payload for the blob store.
    pub async fn to_upload(&self) -> CoreResult<BlobUpload> {
        Ok(BlobUpload {
            filename: self.filename().to_string(),
            mime_type: self.mime_type.clone(),
            bytes: self.read().await?,
        })
    }
}

/// `image/<extension>`, lowercased; `image/jpeg` when there is no extension.
pub fn infer_mime(uri: &str) -> String {
    let name = uri.rsplit(['/', '\\']).next().unwrap_or(uri);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("image/{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_MIME_TYPE.to_string(),
    }
}

/// Gallery picker configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryOptions {
    /// Offer an editing/cropping step after selection
    pub allows_editing: bool,
    /// Crop aspect ratio `(width, height)`
    pub aspect: Option<(u32, u32)>,
}

impl GalleryOptions {
    /// Square crop, as used for avatars.
    pub fn square_crop() -> Self {
        Self {
            allows_editing: true,
            aspect: Some((1, 1)),
        }
    }
}

/// Where a capture comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Camera,
    Gallery(GalleryOptions),
}

/// Device hardware or media library.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// Ask the user for access. `Ok(false)` means denied.
    async fn request_permission(&self, kind: SourceKind) -> CoreResult<bool>;

    /// Present the capture/selection affordance. `Ok(None)` means the user
    /// cancelled.
    async fn acquire(&self, kind: SourceKind) -> CoreResult<Option<MediaCapture>>;
}

/// A camera or gallery bound to a device.
#[derive(Clone)]
pub struct MediaSource {
    device: Arc<dyn MediaDevice>,
    kind: SourceKind,
}

impl MediaSource {
    pub fn camera(device: Arc<dyn MediaDevice>) -> Self {
        Self {
            device,
            kind: SourceKind::Camera,
        }
    }

    pub fn gallery(device: Arc<dyn MediaDevice>, options: GalleryOptions) -> Self {
        Self {
            device,
            kind: SourceKind::Gallery(options),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Request permission, then acquire one capture.
    ///
    /// Denied permission is `CoreError::PermissionDenied`; user cancellation
    /// is `Ok(None)`.
    pub async fn acquire(&self) -> CoreResult<Option<MediaCapture>> {
        if !self.device.request_permission(self.kind).await? {
            info!(kind = ?self.kind, "media permission denied");
            return Err(CoreError::PermissionDenied(match self.kind {
                SourceKind::Camera => "camera access is required to take a photo".into(),
                SourceKind::Gallery(_) => "media library access is required to pick an image".into(),
            }));
        }
        let capture = self.device.acquire(self.kind).await?;
        match &capture {
            Some(c) => debug!(uri = %c.uri, size = c.size, "media acquired"),
            None => debug!("media acquisition cancelled"),
        }
        Ok(capture)
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSource").field("kind", &self.kind).finish()
    }
}

/// Headless device that "captures" a file from disk.
///
/// Permission is always granted; a missing path acts as a cancelled picker.
#[derive(Debug, Clone, Default)]
pub struct FileMediaDevice {
    path: Option<PathBuf>,
}

impl FileMediaDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A device whose user always cancels.
    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl MediaDevice for FileMediaDevice {
    async fn request_permission(&self, _kind: SourceKind) -> CoreResult<bool> {
        Ok(true)
    }

    async fn acquire(&self, _kind: SourceKind) -> CoreResult<Option<MediaCapture>> {
        match &self.path {
            Some(path) => MediaCapture::from_path(path).await.map(Some),
            None => Ok(None),
        }
    }
}
