//! Live timeline: one query on `tweets` plus one reply listener per post in
//! the latest result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{StreamExt, StreamMap};

use crate::backend::{Direction, DocumentStore, Query, QueryUpdate, Unsubscribe};
use crate::config::{replies_collection, TWEETS_COLLECTION};
use crate::core::errors::BackendError;
use crate::models::models::{Post, Reply};

#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange {
    Posts {
        added: Vec<String>,
        removed: Vec<String>,
    },
    Replies {
        post_id: String,
    },
    Failed(BackendError),
    Ignored,
}

enum Incoming {
    Posts(Option<QueryUpdate>),
    Replies(String, QueryUpdate),
}

pub struct Feed {
    store: Arc<dyn DocumentStore>,
    posts: Vec<Post>,
    replies: HashMap<String, Vec<Reply>>,
    loading: bool,
    post_updates: Option<mpsc::UnboundedReceiver<QueryUpdate>>,
    post_unsubscribe: Option<Unsubscribe>,
    reply_updates: StreamMap<String, UnboundedReceiverStream<QueryUpdate>>,
    reply_unsubscribes: HashMap<String, Unsubscribe>,
}

impl Feed {
    pub fn open(store: Arc<dyn DocumentStore>) -> Self {
        let query = Query::collection(TWEETS_COLLECTION).order_by("createdAt", Direction::Descending);
        let (updates, unsubscribe) = store.subscribe(query).into_parts();

        Self {
            store,
            posts: Vec::new(),
            replies: HashMap::new(),
            loading: true,
            post_updates: Some(updates),
            post_unsubscribe: Some(unsubscribe),
            reply_updates: StreamMap::new(),
            reply_unsubscribes: HashMap::new(),
        }
    }

    /// Waits for the next update from any listener and applies it.
    /// Returns `None` once the feed is closed.
    pub async fn next_change(&mut self) -> Option<FeedChange> {
        let incoming = {
            let posts = self.post_updates.as_mut()?;
            let replies = &mut self.reply_updates;
            tokio::select! {
                biased;
                update = posts.recv() => Incoming::Posts(update),
                Some((post_id, update)) = replies.next(), if !replies.is_empty() => {
                    Incoming::Replies(post_id, update)
                }
            }
        };

        match incoming {
            Incoming::Posts(Some(update)) => Some(self.apply_posts(update)),
            Incoming::Posts(None) => {
                debug!("Tweet listener closed by the backend");
                self.close();
                None
            }
            Incoming::Replies(post_id, update) => Some(self.apply_replies(post_id, update)),
        }
    }

    /// Applies every update that has already been delivered, without waiting.
    pub fn drain(&mut self) -> Vec<FeedChange> {
        let mut changes = Vec::new();
        loop {
            let post_update = self
                .post_updates
                .as_mut()
                .and_then(|updates| updates.try_recv().ok());
            if let Some(update) = post_update {
                changes.push(self.apply_posts(update));
                continue;
            }

            match tokio::task::unconstrained(self.reply_updates.next()).now_or_never() {
                Some(Some((post_id, update))) => changes.push(self.apply_replies(post_id, update)),
                _ => break,
            }
        }
        changes
    }

    fn apply_posts(&mut self, update: QueryUpdate) -> FeedChange {
        self.loading = false;
        let snapshot = match update {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!("Error fetching tweets: {}", err);
                return FeedChange::Failed(err);
            }
        };

        self.posts = snapshot
            .docs
            .iter()
            .filter_map(|doc| match Post::from_snapshot(doc) {
                Ok(post) => Some(post),
                Err(err) => {
                    warn!("Skipping unreadable tweet: {}", err);
                    None
                }
            })
            .collect();

        let (added, removed) = self.sync_reply_listeners();
        FeedChange::Posts { added, removed }
    }

    fn sync_reply_listeners(&mut self) -> (Vec<String>, Vec<String>) {
        let added: Vec<String> = self
            .posts
            .iter()
            .filter(|post| !self.reply_unsubscribes.contains_key(&post.id))
            .map(|post| post.id.clone())
            .collect();

        let removed: Vec<String> = {
            let current: HashSet<&str> = self.posts.iter().map(|post| post.id.as_str()).collect();
            self.reply_unsubscribes
                .keys()
                .filter(|id| !current.contains(id.as_str()))
                .cloned()
                .collect()
        };

        for post_id in &added {
            self.open_replies(post_id);
        }
        for post_id in &removed {
            self.close_replies(post_id);
        }
        (added, removed)
    }

    fn open_replies(&mut self, post_id: &str) {
        let query = Query::collection(replies_collection(post_id))
            .order_by("createdAt", Direction::Ascending);
        let (updates, unsubscribe) = self.store.subscribe(query).into_parts();

        self.reply_updates
            .insert(post_id.to_string(), UnboundedReceiverStream::new(updates));
        self.reply_unsubscribes
            .insert(post_id.to_string(), unsubscribe);
        debug!("Listening for replies to {}", post_id);
    }

    fn close_replies(&mut self, post_id: &str) {
        self.reply_updates.remove(post_id);
        if let Some(unsubscribe) = self.reply_unsubscribes.remove(post_id) {
            unsubscribe.call();
        }
        self.replies.remove(post_id);
        debug!("Stopped listening for replies to {}", post_id);
    }

    fn apply_replies(&mut self, post_id: String, update: QueryUpdate) -> FeedChange {
        if !self.reply_unsubscribes.contains_key(&post_id) {
            return FeedChange::Ignored;
        }

        let snapshot = match update {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Error fetching replies for {}: {}", post_id, err);
                return FeedChange::Failed(err);
            }
        };

        let replies = snapshot
            .docs
            .iter()
            .filter_map(|doc| match Reply::from_snapshot(&post_id, doc) {
                Ok(reply) => Some(reply),
                Err(err) => {
                    warn!("Skipping unreadable reply: {}", err);
                    None
                }
            })
            .collect();
        self.replies.insert(post_id.clone(), replies);
        FeedChange::Replies { post_id }
    }

    pub fn close(&mut self) {
        self.post_updates = None;
        if let Some(unsubscribe) = self.post_unsubscribe.take() {
            unsubscribe.call();
        }

        let post_ids: Vec<String> = self.reply_unsubscribes.keys().cloned().collect();
        for post_id in post_ids {
            self.reply_updates.remove(&post_id);
        }
        for (_, unsubscribe) in self.reply_unsubscribes.drain() {
            unsubscribe.call();
        }
        self.replies.clear();
        self.loading = false;
    }

    pub fn is_open(&self) -> bool {
        self.post_updates.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == post_id)
    }

    pub fn replies(&self, post_id: &str) -> &[Reply] {
        self.replies
            .get(post_id)
            .map(|replies| replies.as_slice())
            .unwrap_or(&[])
    }

    pub fn reply(&self, post_id: &str, reply_id: &str) -> Option<&Reply> {
        self.replies(post_id).iter().find(|reply| reply.id == reply_id)
    }

    pub fn subscribed_post_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.reply_unsubscribes.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.close();
    }
}
