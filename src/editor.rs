//! Drafts, the post/reply composer and in-place editing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::error;

use crate::backend::BlobStore;
use crate::config::{MAX_POST_LENGTH, POST_LENGTH_WARNING};
use crate::core::errors::{AppError, ValidationError};
use crate::models::models::{AuthUser, ImageChange, Post, PostEdit, Reply, ReplyEdit};
use crate::policy::ensure_can_edit;
use crate::posts::Posts;
use crate::upload::{ImageFile, ImageUpload, ObjectUrls, Preview, UploadTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharCountStatus {
    Normal,
    Warning,
    Limit,
}

/// Text input capped at the post length limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    content: String,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `value` only if it fits. Returns whether the draft changed.
    pub fn set_content(&mut self, value: &str) -> bool {
        if value.chars().count() > MAX_POST_LENGTH {
            return false;
        }
        self.content = value.to_string();
        true
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    pub fn status(&self) -> CharCountStatus {
        match self.char_count() {
            n if n >= MAX_POST_LENGTH => CharCountStatus::Limit,
            n if n >= POST_LENGTH_WARNING => CharCountStatus::Warning,
            _ => CharCountStatus::Normal,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ComposeTarget {
    Tweet,
    Reply { post_id: String },
}

pub struct Composer {
    target: ComposeTarget,
    draft: Draft,
    image: ImageUpload,
    posting: bool,
}

impl Composer {
    pub fn for_tweet(blobs: Arc<dyn BlobStore>, urls: ObjectUrls) -> Self {
        Self::with_target(ComposeTarget::Tweet, blobs, urls)
    }

    pub fn for_reply(post_id: &str, blobs: Arc<dyn BlobStore>, urls: ObjectUrls) -> Self {
        let target = ComposeTarget::Reply {
            post_id: post_id.to_string(),
        };
        Self::with_target(target, blobs, urls)
    }

    fn with_target(target: ComposeTarget, blobs: Arc<dyn BlobStore>, urls: ObjectUrls) -> Self {
        Self {
            target,
            draft: Draft::new(),
            image: ImageUpload::new(blobs, urls),
            posting: false,
        }
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn set_content(&mut self, value: &str) -> bool {
        self.draft.set_content(value)
    }

    pub fn select_image(&mut self, file: ImageFile) -> Result<(), ValidationError> {
        self.image.select(file)
    }

    pub fn remove_image(&mut self) {
        self.image.remove();
    }

    pub fn image(&self) -> &ImageUpload {
        &self.image
    }

    pub fn can_submit(&self) -> bool {
        !self.posting && (!self.draft.is_blank() || self.image.image().is_some())
    }

    pub fn is_posting(&self) -> bool {
        self.posting
    }

    /// Uploads the selected image, if any, then creates the post or reply.
    /// The form is cleared only after a successful write.
    pub async fn submit(
        &mut self,
        posts: &Posts,
        user: Option<&AuthUser>,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let kind = match self.target {
            ComposeTarget::Tweet => "Tweet",
            ComposeTarget::Reply { .. } => "Reply",
        };
        if self.draft.is_blank() && self.image.image().is_none() {
            return Err(ValidationError::EmptyContent(kind).into());
        }
        let user = user.ok_or(AppError::NotSignedIn)?;

        self.posting = true;
        let result = self.write(posts, user, now).await;
        self.posting = false;

        if result.is_ok() {
            self.draft.clear();
            self.image.reset();
        }
        result
    }

    async fn write(
        &mut self,
        posts: &Posts,
        user: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let upload_target = match self.target {
            ComposeTarget::Tweet => UploadTarget::Tweet,
            ComposeTarget::Reply { .. } => UploadTarget::Reply,
        };
        let image_url = self
            .image
            .upload_selected(upload_target, &user.uid, now, |_| {})
            .await
            .map_err(|e| {
                error!("Error uploading image: {}", e);
                AppError::Upload(e)
            })?;

        let content = self.draft.content();
        match &self.target {
            ComposeTarget::Tweet => posts.post_tweet(Some(user), content, image_url).await,
            ComposeTarget::Reply { post_id } => {
                posts
                    .post_reply(Some(user), post_id, content, image_url)
                    .await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EditTarget {
    Post(Post),
    Reply(Reply),
}

pub struct EditSession {
    target: EditTarget,
    draft: Draft,
    image: ImageUpload,
    saving: bool,
}

impl EditSession {
    pub fn for_post(post: &Post, blobs: Arc<dyn BlobStore>, urls: ObjectUrls) -> Self {
        Self::start(
            EditTarget::Post(post.clone()),
            &post.content,
            post.image_url.as_deref(),
            blobs,
            urls,
        )
    }

    pub fn for_reply(reply: &Reply, blobs: Arc<dyn BlobStore>, urls: ObjectUrls) -> Self {
        Self::start(
            EditTarget::Reply(reply.clone()),
            &reply.content,
            reply.image_url.as_deref(),
            blobs,
            urls,
        )
    }

    fn start(
        target: EditTarget,
        content: &str,
        image_url: Option<&str>,
        blobs: Arc<dyn BlobStore>,
        urls: ObjectUrls,
    ) -> Self {
        let mut image = ImageUpload::new(blobs, urls);
        if let Some(url) = image_url {
            image.set_existing(url);
        }
        Self {
            target,
            draft: Draft {
                content: content.to_string(),
            },
            image,
            saving: false,
        }
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn set_content(&mut self, value: &str) -> bool {
        self.draft.set_content(value)
    }

    pub fn select_image(&mut self, file: ImageFile) -> Result<(), ValidationError> {
        self.image.select(file)
    }

    pub fn remove_image(&mut self) {
        self.image.remove();
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.image.preview()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    fn original_image(&self) -> Option<&str> {
        match &self.target {
            EditTarget::Post(post) => post.image_url.as_deref(),
            EditTarget::Reply(reply) => reply.image_url.as_deref(),
        }
    }

    pub fn cancel(mut self) {
        self.image.reset();
    }

    /// Uploads a newly selected image, then writes the edit. A failed save
    /// leaves the session as it was.
    pub async fn save(
        &mut self,
        posts: &Posts,
        user: Option<&AuthUser>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let kind = match self.target {
            EditTarget::Post(_) => "Tweet",
            EditTarget::Reply(_) => "Reply",
        };
        if self.draft.is_blank() && self.image.preview().is_none() {
            return Err(ValidationError::EmptyContent(kind).into());
        }
        let user = user.ok_or(AppError::NotSignedIn)?;
        match &self.target {
            EditTarget::Post(post) => ensure_can_edit(post, &user.uid, now)?,
            EditTarget::Reply(reply) => ensure_can_edit(reply, &user.uid, now)?,
        }

        self.saving = true;
        let result = self.write(posts, user, now).await;
        self.saving = false;

        if result.is_ok() {
            self.image.reset();
        }
        result
    }

    async fn write(
        &mut self,
        posts: &Posts,
        user: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let upload_target = match self.target {
            EditTarget::Post(_) => UploadTarget::Tweet,
            EditTarget::Reply(_) => UploadTarget::Reply,
        };
        let uploaded = self
            .image
            .upload_selected(upload_target, &user.uid, now, |_| {})
            .await
            .map_err(|e| {
                error!("Error uploading image: {}", e);
                AppError::Upload(e)
            })?;

        let image = match uploaded {
            Some(url) => ImageChange::Replace(url),
            None if self.image.preview().is_none() && self.original_image().is_some() => {
                ImageChange::Remove
            }
            None => ImageChange::Keep,
        };
        let content = self.draft.content().to_string();

        match &self.target {
            EditTarget::Post(post) => {
                let edit = PostEdit {
                    post_id: post.id.clone(),
                    content,
                    image,
                };
                posts.update_post(Some(user), post, edit, now).await
            }
            EditTarget::Reply(reply) => {
                let edit = ReplyEdit {
                    post_id: reply.post_id.clone(),
                    reply_id: reply.id.clone(),
                    content,
                    image,
                };
                posts.update_reply(Some(user), reply, edit, now).await
            }
        }
    }
}
