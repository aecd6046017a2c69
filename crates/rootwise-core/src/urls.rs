//! Stored-file URL composition.
//!
//! Every URL pointing at an uploaded image is built here and every blob id
//! recovered from such a URL is parsed here, so the layout can change in
//! one place.

/// Composes view URLs for files in the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUrls {
    base: String,
    project_id: String,
}

impl StorageUrls {
    pub fn new(base: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    /// `<base>/storage/buckets/<bucket>/files/<id>/view?project=<project>`
    pub fn file_view(&self, bucket_id: &str, blob_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.base, bucket_id, blob_id, self.project_id
        )
    }
}

/// Recover the blob id from a file view URL: the second-to-last path
/// segment. URLs with fewer than three segments carry no id.
pub fn blob_id_from_url(url: &str) -> Option<&str> {
    let segments: Vec<&str> = url.split('/').collect();
    if segments.len() <= 2 {
        return None;
    }
    segments
        .get(segments.len() - 2)
        .copied()
        .filter(|id| !id.is_empty())
}
