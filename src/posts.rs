use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde_json::Value;

use crate::backend::{Changes, DocPath, DocumentStore};
use crate::config::{replies_collection, MAX_POST_LENGTH, TWEETS_COLLECTION};
use crate::core::errors::{AppError, ValidationError};
use crate::models::models::{
    AuthUser, EditRequest, FeedItem, ImageChange, Post, PostEdit, Reply, ReplyEdit,
};
use crate::policy::{can_delete, ensure_can_edit};

pub const DELETE_TWEET_PROMPT: &str = "Are you sure you want to delete this tweet?";
pub const DELETE_REPLY_PROMPT: &str = "Are you sure you want to delete this reply?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Unliked,
    /// Nobody is signed in, nothing was written.
    Skipped,
}

/// Single-write mutations on posts and replies. Results show up through the
/// live feed, never through a local cache.
#[derive(Clone)]
pub struct Posts {
    store: Arc<dyn DocumentStore>,
}

pub fn validate_content(
    kind: &'static str,
    content: &str,
    has_image: bool,
) -> Result<(), ValidationError> {
    if content.trim().is_empty() && !has_image {
        return Err(ValidationError::EmptyContent(kind));
    }
    if content.chars().count() > MAX_POST_LENGTH {
        return Err(ValidationError::ContentTooLong);
    }
    Ok(())
}

fn has_image_url(url: Option<&str>) -> bool {
    url.is_some_and(|url| !url.trim().is_empty())
}

fn new_item(user: &AuthUser, content: &str, image_url: Option<String>) -> Changes {
    let mut changes = Changes::new()
        .set("content", content)
        .set("userId", user.uid.as_str())
        .set("userEmail", user.email.as_str())
        .server_timestamp("createdAt")
        .set("likes", Value::Array(Vec::new()));
    if let Some(url) = image_url.filter(|url| has_image_url(Some(url.as_str()))) {
        changes = changes.set("imageUrl", url);
    }
    changes
}

fn edit_changes(content: &str, image: &ImageChange) -> Changes {
    let changes = Changes::new()
        .set("content", content)
        .server_timestamp("edited");
    match image {
        ImageChange::Keep => changes,
        ImageChange::Replace(url) if has_image_url(Some(url.as_str())) => {
            changes.set("imageUrl", url.as_str())
        }
        // a blank replacement clears the image
        ImageChange::Replace(_) | ImageChange::Remove => changes.set("imageUrl", Value::Null),
    }
}

fn like_changes(liked: bool, uid: &str) -> Changes {
    if liked {
        Changes::new().array_remove("likes", uid)
    } else {
        Changes::new().array_union("likes", uid)
    }
}

impl Posts {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn post_tweet(
        &self,
        user: Option<&AuthUser>,
        content: &str,
        image_url: Option<String>,
    ) -> Result<String, AppError> {
        let user = user.ok_or(AppError::NotSignedIn)?;
        validate_content("Tweet", content, has_image_url(image_url.as_deref()))?;

        let id = self
            .store
            .add(TWEETS_COLLECTION, new_item(user, content, image_url))
            .await
            .map_err(|e| {
                error!("Error posting tweet: {}", e);
                e
            })?;
        info!("Tweet {} posted by {}", id, user.uid);
        Ok(id)
    }

    pub async fn post_reply(
        &self,
        user: Option<&AuthUser>,
        post_id: &str,
        content: &str,
        image_url: Option<String>,
    ) -> Result<String, AppError> {
        let user = user.ok_or(AppError::NotSignedIn)?;
        validate_content("Reply", content, has_image_url(image_url.as_deref()))?;

        let id = self
            .store
            .add(&replies_collection(post_id), new_item(user, content, image_url))
            .await
            .map_err(|e| {
                error!("Error posting reply on {}: {}", post_id, e);
                e
            })?;
        info!("Reply {} posted on {} by {}", id, post_id, user.uid);
        Ok(id)
    }

    /// Deletes the post once `confirm` accepts the prompt. Returns whether a
    /// delete was issued. Replies under the post are left to the backend.
    pub async fn delete_post(
        &self,
        user: Option<&AuthUser>,
        post: &Post,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<bool, AppError> {
        let user = user.ok_or(AppError::NotSignedIn)?;
        if !can_delete(post, &user.uid) {
            return Err(AppError::Forbidden("only the author can delete a tweet"));
        }
        if !confirm(DELETE_TWEET_PROMPT) {
            return Ok(false);
        }

        self.store
            .delete(&DocPath::new(TWEETS_COLLECTION, post.id.as_str()))
            .await
            .map_err(|e| {
                error!("Error deleting tweet {}: {}", post.id, e);
                e
            })?;
        info!("Tweet {} deleted", post.id);
        Ok(true)
    }

    pub async fn delete_reply(
        &self,
        user: Option<&AuthUser>,
        reply: &Reply,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<bool, AppError> {
        let user = user.ok_or(AppError::NotSignedIn)?;
        if !can_delete(reply, &user.uid) {
            return Err(AppError::Forbidden("only the author can delete a reply"));
        }
        if !confirm(DELETE_REPLY_PROMPT) {
            return Ok(false);
        }

        self.store
            .delete(&DocPath::new(replies_collection(&reply.post_id), reply.id.as_str()))
            .await
            .map_err(|e| {
                error!("Error deleting reply {}: {}", reply.id, e);
                e
            })?;
        Ok(true)
    }

    pub async fn update_post(
        &self,
        user: Option<&AuthUser>,
        post: &Post,
        edit: PostEdit,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.apply_edit(user, post, EditRequest::Post(edit), now)
            .await
    }

    pub async fn update_reply(
        &self,
        user: Option<&AuthUser>,
        reply: &Reply,
        edit: ReplyEdit,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.apply_edit(user, reply, EditRequest::Reply(edit), now)
            .await
    }

    /// Checks the edit window against `item`, the caller's current view of
    /// the target, then writes the edit.
    pub async fn apply_edit(
        &self,
        user: Option<&AuthUser>,
        item: &impl FeedItem,
        request: EditRequest,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let user = user.ok_or(AppError::NotSignedIn)?;
        ensure_can_edit(item, &user.uid, now)?;

        let (path, parent, content, image, kind) = match &request {
            EditRequest::Post(edit) => (
                DocPath::new(TWEETS_COLLECTION, edit.post_id.as_str()),
                None,
                &edit.content,
                &edit.image,
                "Tweet",
            ),
            EditRequest::Reply(edit) => (
                DocPath::new(replies_collection(&edit.post_id), edit.reply_id.as_str()),
                Some(edit.post_id.as_str()),
                &edit.content,
                &edit.image,
                "Reply",
            ),
        };
        if path.id != item.item_id() || parent != item.parent_id() {
            return Err(AppError::Forbidden("edit does not target this item"));
        }

        let keeps_image = match image {
            ImageChange::Keep => has_image_url(item.image_url()),
            ImageChange::Replace(url) => has_image_url(Some(url.as_str())),
            ImageChange::Remove => false,
        };
        validate_content(kind, content, keeps_image)?;

        self.store
            .update(&path, edit_changes(content, image))
            .await
            .map_err(|e| {
                error!("Error updating {}: {}", path, e);
                e
            })?;
        info!("{} edited", path);
        Ok(())
    }

    pub async fn toggle_like_post(
        &self,
        user: Option<&AuthUser>,
        post: &Post,
    ) -> Result<LikeOutcome, AppError> {
        let Some(user) = user else {
            return Ok(LikeOutcome::Skipped);
        };
        let liked = post.is_liked_by(&user.uid);

        self.store
            .update(
                &DocPath::new(TWEETS_COLLECTION, post.id.as_str()),
                like_changes(liked, &user.uid),
            )
            .await
            .map_err(|e| {
                error!("Error liking tweet {}: {}", post.id, e);
                e
            })?;
        Ok(if liked {
            LikeOutcome::Unliked
        } else {
            LikeOutcome::Liked
        })
    }

    pub async fn toggle_like_reply(
        &self,
        user: Option<&AuthUser>,
        reply: &Reply,
    ) -> Result<LikeOutcome, AppError> {
        let Some(user) = user else {
            return Ok(LikeOutcome::Skipped);
        };
        let liked = reply.is_liked_by(&user.uid);

        self.store
            .update(
                &DocPath::new(replies_collection(&reply.post_id), reply.id.as_str()),
                like_changes(liked, &user.uid),
            )
            .await
            .map_err(|e| {
                error!("Error liking reply {}: {}", reply.id, e);
                e
            })?;
        Ok(if liked {
            LikeOutcome::Unliked
        } else {
            LikeOutcome::Liked
        })
    }
}
