//! Auth, document and blob seams of the managed backend. [`memory`] has
//! in-process implementations of all three.

pub mod memory;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::core::errors::{AuthError, BackendError};
use crate::models::models::AuthUser;

pub type Fields = Map<String, Value>;
pub type QueryUpdate = Result<QuerySnapshot, BackendError>;
pub type DocUpdate = Result<Option<DocumentSnapshot>, BackendError>;

// === Subscriptions ===

/// Stops a live listener. Runs at most once, on [`Unsubscribe::call`] or drop.
pub struct Unsubscribe {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn call(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct Subscription<T> {
    updates: mpsc::UnboundedReceiver<T>,
    unsubscribe: Unsubscribe,
}

impl<T> Subscription<T> {
    pub fn new(updates: mpsc::UnboundedReceiver<T>, unsubscribe: Unsubscribe) -> Self {
        Self {
            updates,
            unsubscribe,
        }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.updates.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.updates.try_recv().ok()
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<T>, Unsubscribe) {
        (self.updates, self.unsubscribe)
    }

    pub fn unsubscribe(self) {
        self.unsubscribe.call();
    }
}

/// Takes an already-delivered value without waiting: `Some(Some(v))` for a
/// value, `Some(None)` once the sender side is gone, `None` when empty.
pub fn try_next<T>(updates: &mut mpsc::UnboundedReceiver<T>) -> Option<Option<T>> {
    match updates.try_recv() {
        Ok(value) => Some(Some(value)),
        Err(mpsc::error::TryRecvError::Disconnected) => Some(None),
        Err(mpsc::error::TryRecvError::Empty) => None,
    }
}

// === Documents & queries ===

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Fields,
}

impl DocumentSnapshot {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            BackendError::Malformed(format!("document {}: {}", self.id, e))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub docs: Vec<DocumentSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<(String, Value)>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter = Some((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn matches(&self, data: &Fields) -> bool {
        if let Some((field, expected)) = &self.filter {
            if data.get(field) != Some(expected) {
                return false;
            }
        }
        match &self.order_by {
            // documents without the ordering field are not part of an ordered result
            Some(order) => data.contains_key(&order.field),
            None => true,
        }
    }

    pub fn sort(&self, docs: &mut [DocumentSnapshot]) {
        let Some(order) = &self.order_by else {
            docs.sort_by(|a, b| a.id.cmp(&b.id));
            return;
        };
        docs.sort_by(|a, b| {
            let ord = compare_values(a.data.get(&order.field), b.data.get(&order.field))
                .then_with(|| a.id.cmp(&b.id));
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (a.parse::<DateTime<Utc>>(), b.parse::<DateTime<Utc>>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

// === Writes ===

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Replaced by the backend's clock when the write is applied.
    ServerTimestamp,
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    fields: Vec<(String, FieldValue)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldValue::Value(value.into())));
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.fields
            .push((field.to_string(), FieldValue::ServerTimestamp));
        self
    }

    pub fn array_union(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldValue::ArrayUnion(vec![value.into()])));
        self
    }

    pub fn array_remove(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldValue::ArrayRemove(vec![value.into()])));
        self
    }

    pub fn delete(mut self, field: &str) -> Self {
        self.fields.push((field.to_string(), FieldValue::Delete));
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// === Service seams ===

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn add(&self, collection: &str, changes: Changes) -> Result<String, BackendError>;

    async fn set(&self, doc: &DocPath, changes: Changes) -> Result<(), BackendError>;

    async fn update(&self, doc: &DocPath, changes: Changes) -> Result<(), BackendError>;

    async fn get(&self, doc: &DocPath) -> Result<Option<DocumentSnapshot>, BackendError>;

    async fn delete(&self, doc: &DocPath) -> Result<(), BackendError>;

    /// Opens a live query. The current result is pushed first, followed by the
    /// full result again after every change to the collection.
    fn subscribe(&self, query: Query) -> Subscription<QueryUpdate>;

    fn watch(&self, doc: &DocPath) -> Subscription<DocUpdate>;
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_user(&self) -> Option<AuthUser>;

    /// Pushes the current user immediately, then on every sign-in or sign-out.
    fn on_state_changed(&self) -> Subscription<Option<AuthUser>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let ratio = self.bytes_transferred as f64 / self.total_bytes as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Failed(BackendError),
    Completed,
}

#[derive(Debug)]
pub struct UploadTask {
    path: String,
    events: mpsc::UnboundedReceiver<UploadEvent>,
}

impl UploadTask {
    pub fn new(path: impl Into<String>, events: mpsc::UnboundedReceiver<UploadEvent>) -> Self {
        Self {
            path: path.into(),
            events,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> UploadTask;

    async fn download_url(&self, path: &str) -> Result<String, BackendError>;
}

#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthBackend>,
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backend {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self { auth, store, blobs }
    }
}
