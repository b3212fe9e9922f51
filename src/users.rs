//! The profile page of one user.

use std::sync::Arc;

use log::{error, warn};
use tokio::sync::mpsc;

use crate::auth::profile_path;
use crate::backend::{try_next, DocUpdate, DocumentStore, Query, QueryUpdate, Unsubscribe};
use crate::config::TWEETS_COLLECTION;
use crate::core::errors::{AppError, BackendError};
use crate::follow::toggle_follow;
use crate::models::models::{AuthUser, FollowState, Post, UserProfile};

pub const UNKNOWN_HANDLE: &str = "User";

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileChange {
    Profile,
    Posts,
    Failed(BackendError),
}

enum Incoming {
    Profile(Option<DocUpdate>),
    Posts(Option<QueryUpdate>),
}

/// Newest first; posts still waiting for a server timestamp go last.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

pub struct ProfileView {
    store: Arc<dyn DocumentStore>,
    owner_id: String,
    profile: Option<UserProfile>,
    posts: Vec<Post>,
    loading_posts: bool,
    profile_updates: Option<mpsc::UnboundedReceiver<DocUpdate>>,
    post_updates: Option<mpsc::UnboundedReceiver<QueryUpdate>>,
    unsubscribes: Vec<Unsubscribe>,
}

impl ProfileView {
    pub fn open(store: Arc<dyn DocumentStore>, owner_id: &str) -> Self {
        let (profile_updates, profile_unsubscribe) =
            store.watch(&profile_path(owner_id)).into_parts();
        // no order-by; sorted locally
        let query = Query::collection(TWEETS_COLLECTION).where_eq("userId", owner_id);
        let (post_updates, post_unsubscribe) = store.subscribe(query).into_parts();

        Self {
            store,
            owner_id: owner_id.to_string(),
            profile: None,
            posts: Vec::new(),
            loading_posts: true,
            profile_updates: Some(profile_updates),
            post_updates: Some(post_updates),
            unsubscribes: vec![profile_unsubscribe, post_unsubscribe],
        }
    }

    pub async fn next_change(&mut self) -> Option<ProfileChange> {
        loop {
            let incoming = match (self.profile_updates.as_mut(), self.post_updates.as_mut()) {
                (Some(profile), Some(posts)) => tokio::select! {
                    update = profile.recv() => Incoming::Profile(update),
                    update = posts.recv() => Incoming::Posts(update),
                },
                (Some(profile), None) => Incoming::Profile(profile.recv().await),
                (None, Some(posts)) => Incoming::Posts(posts.recv().await),
                (None, None) => return None,
            };
            if let Some(change) = self.apply(incoming) {
                return Some(change);
            }
        }
    }

    pub fn drain(&mut self) -> Vec<ProfileChange> {
        let mut changes = Vec::new();
        loop {
            let incoming = if let Some(update) = self
                .profile_updates
                .as_mut()
                .and_then(try_next)
            {
                Incoming::Profile(update)
            } else if let Some(update) = self
                .post_updates
                .as_mut()
                .and_then(try_next)
            {
                Incoming::Posts(update)
            } else {
                break;
            };
            if let Some(change) = self.apply(incoming) {
                changes.push(change);
            }
        }
        changes
    }

    fn apply(&mut self, incoming: Incoming) -> Option<ProfileChange> {
        match incoming {
            Incoming::Profile(Some(Ok(Some(doc)))) => match UserProfile::from_snapshot(&doc) {
                Ok(profile) => {
                    self.profile = Some(profile);
                    Some(ProfileChange::Profile)
                }
                Err(err) => {
                    warn!("Unreadable profile {}: {}", self.owner_id, err);
                    None
                }
            },
            Incoming::Profile(Some(Ok(None))) => None,
            Incoming::Profile(Some(Err(err))) => {
                warn!("Error fetching profile {}: {}", self.owner_id, err);
                Some(ProfileChange::Failed(err))
            }
            Incoming::Profile(None) => {
                self.profile_updates = None;
                None
            }
            Incoming::Posts(Some(Ok(snapshot))) => {
                let mut posts: Vec<Post> = snapshot
                    .docs
                    .iter()
                    .filter_map(|doc| match Post::from_snapshot(doc) {
                        Ok(post) => Some(post),
                        Err(err) => {
                            warn!("Skipping unreadable tweet on profile {}: {}", self.owner_id, err);
                            None
                        }
                    })
                    .collect();
                sort_newest_first(&mut posts);
                self.posts = posts;
                self.loading_posts = false;
                Some(ProfileChange::Posts)
            }
            Incoming::Posts(Some(Err(err))) => {
                error!("Error fetching tweets: {}", err);
                self.loading_posts = false;
                Some(ProfileChange::Failed(err))
            }
            Incoming::Posts(None) => {
                self.post_updates = None;
                None
            }
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn is_loading_posts(&self) -> bool {
        self.loading_posts
    }

    pub fn is_own_profile(&self, viewer: Option<&AuthUser>) -> bool {
        viewer.map(|v| v.uid == self.owner_id).unwrap_or(false)
    }

    /// The owner's address as seen on their newest post.
    pub fn display_handle(&self) -> &str {
        self.posts
            .first()
            .map(|post| post.user_email.as_str())
            .unwrap_or(UNKNOWN_HANDLE)
    }

    pub fn follower_count(&self) -> usize {
        self.profile.as_ref().map(|p| p.followers.len()).unwrap_or(0)
    }

    pub fn following_count(&self) -> usize {
        self.profile.as_ref().map(|p| p.following.len()).unwrap_or(0)
    }

    pub fn is_followed_by(&self, viewer_profile: Option<&UserProfile>) -> bool {
        viewer_profile
            .map(|p| p.is_following(&self.owner_id))
            .unwrap_or(false)
    }

    pub async fn toggle_follow(&self, viewer: Option<&AuthUser>) -> Result<FollowState, AppError> {
        let hint = self.posts.first().map(|post| post.user_email.as_str());
        toggle_follow(self.store.as_ref(), viewer, &self.owner_id, hint).await
    }

    pub fn close(&mut self) {
        self.profile_updates = None;
        self.post_updates = None;
        for unsubscribe in self.unsubscribes.drain(..) {
            unsubscribe.call();
        }
    }
}

impl Drop for ProfileView {
    fn drop(&mut self) {
        self.close();
    }
}
