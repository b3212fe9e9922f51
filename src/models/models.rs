use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::DocumentSnapshot;
use crate::core::errors::BackendError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(skip)]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// `None` until the backend has assigned the creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: Vec<String>,
}

impl Post {
    pub fn from_snapshot(doc: &DocumentSnapshot) -> Result<Self, BackendError> {
        let mut post: Post = doc.decode()?;
        post.id = doc.id.clone();
        Ok(post)
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub post_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: Vec<String>,
}

impl Reply {
    pub fn from_snapshot(post_id: &str, doc: &DocumentSnapshot) -> Result<Self, BackendError> {
        let mut reply: Reply = doc.decode()?;
        reply.id = doc.id.clone();
        reply.post_id = post_id.to_string();
        Ok(reply)
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
}

impl UserProfile {
    pub fn from_snapshot(doc: &DocumentSnapshot) -> Result<Self, BackendError> {
        doc.decode()
    }

    pub fn is_following(&self, user_id: &str) -> bool {
        self.following.iter().any(|id| id == user_id)
    }
}

pub trait FeedItem {
    fn item_id(&self) -> &str;
    fn author_id(&self) -> &str;
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn content(&self) -> &str;
    fn image_url(&self) -> Option<&str>;
    /// The post a reply hangs under; `None` for top-level posts.
    fn parent_id(&self) -> Option<&str>;
}

impl FeedItem for Post {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn author_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn parent_id(&self) -> Option<&str> {
        None
    }
}

impl FeedItem for Reply {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn author_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.post_id)
    }
}

/// What an edit does to the item's attached image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageChange {
    #[default]
    Keep,
    Replace(String),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEdit {
    pub post_id: String,
    pub content: String,
    pub image: ImageChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEdit {
    pub post_id: String,
    pub reply_id: String,
    pub content: String,
    pub image: ImageChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    Post(PostEdit),
    Reply(ReplyEdit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Following,
    NotFollowing,
}
