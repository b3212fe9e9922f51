//! In-process backend. Holds documents, accounts and blobs in memory and
//! pushes snapshots to listeners synchronously on every write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use argon2::{Argon2, Params};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::warn;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    AuthBackend, Backend, BlobStore, Changes, DocPath, DocUpdate, DocumentSnapshot,
    DocumentStore, FieldValue, Fields, Query, QuerySnapshot, QueryUpdate, Subscription,
    Unsubscribe, UploadEvent, UploadProgress, UploadTask,
};
use crate::config::{
    max_failed_sign_ins, sign_in_lockout, storage_base_url, upload_chunk_bytes, MIN_PASSWORD_LENGTH,
};
use crate::core::errors::{AuthError, BackendError};
use crate::core::helpers::{hash_password, looks_like_email, new_id, verify_password};
use crate::models::models::AuthUser;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// === Clock ===

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// === Document store ===

enum Listener {
    Query {
        query: Query,
        tx: mpsc::UnboundedSender<QueryUpdate>,
    },
    Doc {
        path: DocPath,
        tx: mpsc::UnboundedSender<DocUpdate>,
    },
}

#[derive(Default)]
struct StoreState {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
    failure: Option<BackendError>,
}

impl StoreState {
    fn run_query(&self, query: &Query) -> QuerySnapshot {
        let mut docs: Vec<DocumentSnapshot> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| query.matches(data))
                    .map(|(id, data)| DocumentSnapshot {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        query.sort(&mut docs);
        QuerySnapshot { docs }
    }

    fn read(&self, path: &DocPath) -> Option<DocumentSnapshot> {
        self.collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .map(|data| DocumentSnapshot {
                id: path.id.clone(),
                data: data.clone(),
            })
    }

    fn check_writable(&self) -> Result<(), BackendError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Pushes fresh results to every listener affected by a write to `path`.
    fn notify(&self, path: &DocPath) {
        for listener in self.listeners.values() {
            match listener {
                Listener::Query { query, tx } if query.collection == path.collection => {
                    let _ = tx.send(Ok(self.run_query(query)));
                }
                Listener::Doc { path: watched, tx } if watched == path => {
                    let _ = tx.send(Ok(self.read(path)));
                }
                _ => {}
            }
        }
    }

    fn register(&mut self, listener: Listener) -> u64 {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, listener);
        id
    }
}

fn apply_changes(doc: &mut Fields, changes: &Changes, now: DateTime<Utc>) {
    for (field, value) in changes.iter() {
        match value {
            FieldValue::Value(v) => {
                doc.insert(field.clone(), v.clone());
            }
            FieldValue::ServerTimestamp => {
                let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
                doc.insert(field.clone(), Value::String(stamp));
            }
            FieldValue::ArrayUnion(values) => {
                let entry = doc
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(items) = entry {
                    for v in values {
                        if !items.contains(v) {
                            items.push(v.clone());
                        }
                    }
                }
            }
            FieldValue::ArrayRemove(values) => match doc.get_mut(field) {
                Some(Value::Array(items)) => items.retain(|item| !values.contains(item)),
                _ => {
                    doc.insert(field.clone(), Value::Array(Vec::new()));
                }
            },
            FieldValue::Delete => {
                doc.remove(field);
            }
        }
    }
}

pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    pub fn query_listeners_on(&self, collection: &str) -> usize {
        lock(&self.state)
            .listeners
            .values()
            .filter(|l| matches!(l, Listener::Query { query, .. } if query.collection == collection))
            .count()
    }

    /// Makes every following write fail with `err` until cleared with `None`.
    pub fn fail_writes(&self, err: Option<BackendError>) {
        lock(&self.state).failure = err;
    }

    /// Delivers `err` to every query listener on `collection`.
    pub fn emit_error(&self, collection: &str, err: BackendError) {
        let state = lock(&self.state);
        for listener in state.listeners.values() {
            if let Listener::Query { query, tx } = listener {
                if query.collection == collection {
                    let _ = tx.send(Err(err.clone()));
                }
            }
        }
    }

    pub fn document_count(&self, collection: &str) -> usize {
        lock(&self.state)
            .collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn unsubscribe_handle(&self, id: u64) -> Unsubscribe {
        let state: Weak<Mutex<StoreState>> = Arc::downgrade(&self.state);
        Unsubscribe::new(move || {
            if let Some(state) = state.upgrade() {
                lock(&state).listeners.remove(&id);
            }
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &str, changes: Changes) -> Result<String, BackendError> {
        let mut state = lock(&self.state);
        state.check_writable()?;

        let id = new_id();
        let mut doc = Fields::new();
        apply_changes(&mut doc, &changes, self.clock.now());
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);
        state.notify(&DocPath::new(collection, id.clone()));
        Ok(id)
    }

    async fn set(&self, path: &DocPath, changes: Changes) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.check_writable()?;

        let mut doc = Fields::new();
        apply_changes(&mut doc, &changes, self.clock.now());
        state
            .collections
            .entry(path.collection.clone())
            .or_default()
            .insert(path.id.clone(), doc);
        state.notify(path);
        Ok(())
    }

    async fn update(&self, path: &DocPath, changes: Changes) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.check_writable()?;

        let now = self.clock.now();
        let doc = state
            .collections
            .get_mut(&path.collection)
            .and_then(|docs| docs.get_mut(&path.id))
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        apply_changes(doc, &changes, now);
        state.notify(path);
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> Result<Option<DocumentSnapshot>, BackendError> {
        Ok(lock(&self.state).read(path))
    }

    async fn delete(&self, path: &DocPath) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.check_writable()?;

        let removed = state
            .collections
            .get_mut(&path.collection)
            .and_then(|docs| docs.remove(&path.id));
        if removed.is_some() {
            state.notify(path);
        }
        Ok(())
    }

    fn subscribe(&self, query: Query) -> Subscription<QueryUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            let _ = tx.send(Ok(state.run_query(&query)));
            state.register(Listener::Query { query, tx })
        };
        Subscription::new(rx, self.unsubscribe_handle(id))
    }

    fn watch(&self, path: &DocPath) -> Subscription<DocUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            let _ = tx.send(Ok(state.read(path)));
            state.register(Listener::Doc {
                path: path.clone(),
                tx,
            })
        };
        Subscription::new(rx, self.unsubscribe_handle(id))
    }
}

// === Auth ===

struct Account {
    user: AuthUser,
    password_hash: String,
    disabled: bool,
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<AuthUser>,
    listeners: BTreeMap<u64, mpsc::UnboundedSender<Option<AuthUser>>>,
    next_listener: u64,
}

impl AuthState {
    fn set_current(&mut self, user: Option<AuthUser>) {
        self.current = user;
        for tx in self.listeners.values() {
            let _ = tx.send(self.current.clone());
        }
    }
}

pub struct MemoryAuth {
    state: Arc<Mutex<AuthState>>,
    argon2: Argon2<'static>,
    clock: Arc<dyn Clock>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::with_argon2(Argon2::default())
    }

    /// Uses custom hashing parameters, e.g. cheap ones in tests.
    pub fn with_params(params: Params) -> Self {
        Self::with_argon2(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }

    fn with_argon2(argon2: Argon2<'static>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AuthState::default())),
            argon2,
            clock: Arc::new(SystemClock),
        }
    }

    /// Times sign-in lockouts with `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_disabled(&self, email: &str, disabled: bool) {
        if let Some(account) = lock(&self.state).accounts.get_mut(&email.to_lowercase()) {
            account.disabled = disabled;
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = email.trim().to_lowercase();
        if !looks_like_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        if lock(&self.state).accounts.contains_key(&email) {
            return Err(AuthError::EmailAlreadyInUse);
        }

        let password_hash = hash_password(&self.argon2, password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let user = AuthUser {
            uid: new_id(),
            email: email.clone(),
        };

        let mut state = lock(&self.state);
        if state.accounts.contains_key(&email) {
            return Err(AuthError::EmailAlreadyInUse);
        }
        state.accounts.insert(
            email,
            Account {
                user: user.clone(),
                password_hash,
                disabled: false,
                failed_attempts: 0,
                locked_until: None,
            },
        );
        state.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = email.trim().to_lowercase();
        if !looks_like_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let now = self.clock.now();
        let password_hash = {
            let mut state = lock(&self.state);
            let account = state
                .accounts
                .get_mut(&email)
                .ok_or(AuthError::UserNotFound)?;
            if account.disabled {
                return Err(AuthError::UserDisabled);
            }
            match account.locked_until {
                Some(until) if now < until => return Err(AuthError::TooManyRequests),
                Some(_) => {
                    account.locked_until = None;
                    account.failed_attempts = 0;
                }
                None => {}
            }
            account.password_hash.clone()
        };

        let valid = verify_password(&self.argon2, password, &password_hash);

        let mut state = lock(&self.state);
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or(AuthError::UserNotFound)?;
        if !valid {
            account.failed_attempts += 1;
            if account.failed_attempts >= max_failed_sign_ins() {
                account.locked_until = Some(now + sign_in_lockout());
                warn!("Sign-in for {} locked after {} failures", email, account.failed_attempts);
            }
            return Err(AuthError::WrongPassword);
        }
        account.failed_attempts = 0;
        account.locked_until = None;
        let user = account.user.clone();
        state.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        lock(&self.state).set_current(None);
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        lock(&self.state).current.clone()
    }

    fn on_state_changed(&self) -> Subscription<Option<AuthUser>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            let _ = tx.send(state.current.clone());
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.insert(id, tx);
            id
        };

        let state = Arc::downgrade(&self.state);
        Subscription::new(
            rx,
            Unsubscribe::new(move || {
                if let Some(state) = state.upgrade() {
                    lock(&state).listeners.remove(&id);
                }
            }),
        )
    }
}

// === Blobs ===

struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Default)]
struct BlobState {
    objects: HashMap<String, StoredBlob>,
    failure: Option<BackendError>,
}

pub struct MemoryBlobs {
    state: Mutex<BlobState>,
    base_url: String,
    chunk_bytes: usize,
}

impl MemoryBlobs {
    pub fn new(base_url: impl Into<String>, chunk_bytes: usize) -> Self {
        Self {
            state: Mutex::new(BlobState::default()),
            base_url: base_url.into(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    pub fn from_env() -> Self {
        Self::new(storage_base_url(), upload_chunk_bytes())
    }

    /// Makes every following upload fail with `err` until cleared with `None`.
    pub fn fail_uploads(&self, err: Option<BackendError>) {
        lock(&self.state).failure = err;
    }

    pub fn object(&self, path: &str) -> Option<(Vec<u8>, String)> {
        lock(&self.state)
            .objects
            .get(path)
            .map(|blob| (blob.bytes.clone(), blob.content_type.clone()))
    }

    pub fn object_count(&self) -> usize {
        lock(&self.state).objects.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> UploadTask {
        let (tx, rx) = mpsc::unbounded_channel();
        let total_bytes = bytes.len() as u64;
        let mut state = lock(&self.state);

        if let Some(err) = state.failure.clone() {
            let _ = tx.send(UploadEvent::Progress(UploadProgress {
                bytes_transferred: 0,
                total_bytes,
            }));
            let _ = tx.send(UploadEvent::Failed(err));
            return UploadTask::new(path, rx);
        }

        if bytes.is_empty() {
            let _ = tx.send(UploadEvent::Progress(UploadProgress {
                bytes_transferred: 0,
                total_bytes: 0,
            }));
        }
        let mut transferred = 0u64;
        for chunk in bytes.chunks(self.chunk_bytes) {
            transferred += chunk.len() as u64;
            let _ = tx.send(UploadEvent::Progress(UploadProgress {
                bytes_transferred: transferred,
                total_bytes,
            }));
        }

        state.objects.insert(
            path.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        let _ = tx.send(UploadEvent::Completed);
        UploadTask::new(path, rx)
    }

    async fn download_url(&self, path: &str) -> Result<String, BackendError> {
        if !lock(&self.state).objects.contains_key(path) {
            return Err(BackendError::NotFound(format!("object {}", path)));
        }
        Ok(format!(
            "{}/o/{}?alt=media",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(path)
        ))
    }
}

// === Bundle ===

/// Concrete handles to the in-memory services, for inspection in tests.
#[derive(Clone)]
pub struct MemoryBackend {
    pub auth: Arc<MemoryAuth>,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobs>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_parts(MemoryAuth::new(), Arc::new(SystemClock))
    }

    pub fn with_parts(auth: MemoryAuth, clock: Arc<dyn Clock>) -> Self {
        Self {
            auth: Arc::new(auth.with_clock(clock.clone())),
            store: Arc::new(MemoryStore::new(clock)),
            blobs: Arc::new(MemoryBlobs::from_env()),
        }
    }

    pub fn backend(&self) -> Backend {
        Backend::new(self.auth.clone(), self.store.clone(), self.blobs.clone())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
