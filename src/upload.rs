//! Image attachments: validation, local previews and resumable uploads.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error};

use crate::backend::{BlobStore, UploadEvent};
use crate::config::{reply_upload_path, tweet_upload_path, ALLOWED_IMAGE_TYPES, MAX_IMAGE_BYTES};
use crate::core::errors::{BackendError, ValidationError};
use crate::core::helpers::new_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn mime_type(&self) -> String {
        match self.content_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => declared.to_ascii_lowercase(),
            _ => mime_guess::from_path(&self.name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string(),
        }
    }
}

pub fn validate_image(file: Option<&ImageFile>) -> Result<(), ValidationError> {
    let file = file.ok_or(ValidationError::NoFileSelected)?;

    let mime = file.mime_type();
    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(ValidationError::InvalidImageType(mime));
    }
    if file.size() > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge(file.size()));
    }
    Ok(())
}

// === Object URLs ===

/// Local preview URLs, resolvable until revoked.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrls {
    live: Arc<Mutex<HashSet<String>>>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, file: &ImageFile) -> String {
        let url = format!("blob:chirp/{}", new_id());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone());
        debug!("Created preview {} for {}", url, file.name);
        url
    }

    pub fn revoke(&self, url: &str) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Local(String),
    Remote(String),
}

impl Preview {
    pub fn url(&self) -> &str {
        match self {
            Preview::Local(url) | Preview::Remote(url) => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Tweet,
    Reply,
}

impl UploadTarget {
    pub fn path(&self, user_id: &str, file: &ImageFile, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis();
        match self {
            UploadTarget::Tweet => tweet_upload_path(user_id, millis, &file.name),
            UploadTarget::Reply => reply_upload_path(user_id, millis, &file.name),
        }
    }
}

// === Upload state ===

pub struct ImageUpload {
    blobs: Arc<dyn BlobStore>,
    urls: ObjectUrls,
    image: Option<ImageFile>,
    preview: Option<Preview>,
    progress: u8,
    uploading: bool,
}

impl ImageUpload {
    pub fn new(blobs: Arc<dyn BlobStore>, urls: ObjectUrls) -> Self {
        Self {
            blobs,
            urls,
            image: None,
            preview: None,
            progress: 0,
            uploading: false,
        }
    }

    /// Validates and selects `file`, replacing any earlier selection.
    /// A rejected file leaves the current state untouched.
    pub fn select(&mut self, file: ImageFile) -> Result<(), ValidationError> {
        validate_image(Some(&file))?;

        self.release_preview();
        self.preview = Some(Preview::Local(self.urls.create(&file)));
        self.image = Some(file);
        Ok(())
    }

    pub fn remove(&mut self) {
        self.image = None;
        self.release_preview();
    }

    pub fn set_existing(&mut self, url: impl Into<String>) {
        self.release_preview();
        self.image = None;
        self.preview = Some(Preview::Remote(url.into()));
    }

    pub fn reset(&mut self) {
        self.remove();
        self.progress = 0;
        self.uploading = false;
    }

    fn release_preview(&mut self) {
        if let Some(Preview::Local(url)) = self.preview.take() {
            self.urls.revoke(&url);
        }
    }

    /// Uploads `file` to `path` and resolves to its download URL.
    /// `on_progress` receives the rounded percentage after every chunk.
    pub async fn upload(
        &mut self,
        file: &ImageFile,
        path: &str,
        mut on_progress: impl FnMut(u8),
    ) -> Result<String, BackendError> {
        self.uploading = true;
        let mut task = self.blobs.upload(path, file.bytes.clone(), &file.mime_type());

        let outcome = loop {
            match task.next_event().await {
                Some(UploadEvent::Progress(progress)) => {
                    self.progress = progress.percent();
                    on_progress(self.progress);
                }
                Some(UploadEvent::Failed(err)) => break Err(err),
                Some(UploadEvent::Completed) => break self.blobs.download_url(task.path()).await,
                None => break Err(BackendError::Canceled),
            }
        };

        self.uploading = false;
        if let Err(err) = &outcome {
            error!("Upload error: {}", err);
        }
        outcome
    }

    pub async fn upload_selected(
        &mut self,
        target: UploadTarget,
        user_id: &str,
        now: DateTime<Utc>,
        on_progress: impl FnMut(u8),
    ) -> Result<Option<String>, BackendError> {
        let Some(file) = self.image.clone() else {
            return Ok(None);
        };
        let path = target.path(user_id, &file, now);
        self.upload(&file, &path, on_progress).await.map(Some)
    }

    pub fn image(&self) -> Option<&ImageFile> {
        self.image.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }
}

impl Drop for ImageUpload {
    fn drop(&mut self) {
        self.release_preview();
    }
}
