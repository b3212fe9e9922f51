//! Sign-in state and the signed-in user's live profile.

use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::backend::{try_next, Backend, Changes, DocPath, DocUpdate, Unsubscribe};
use crate::config::{MIN_PASSWORD_LENGTH, USERS_COLLECTION};
use crate::core::errors::{AppError, ValidationError};
use crate::core::helpers::looks_like_email;
use crate::models::models::{AuthUser, UserProfile};
use crate::routes::Route;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(AuthUser),
    /// Signed out; the client should navigate here.
    Redirect(Route),
    ProfileChanged,
}

pub fn profile_path(user_id: &str) -> DocPath {
    DocPath::new(USERS_COLLECTION, user_id)
}

pub fn new_profile(user_id: &str, email: &str) -> Changes {
    Changes::new()
        .set("email", email)
        .set("userId", user_id)
        .server_timestamp("createdAt")
        .set("followers", serde_json::Value::Array(Vec::new()))
        .set("following", serde_json::Value::Array(Vec::new()))
}

pub fn validate_sign_up(email: &str, password: &str, confirm: &str) -> Result<(), ValidationError> {
    if email.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if !looks_like_email(email) {
        return Err(ValidationError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn validate_sign_in(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    Ok(())
}

enum Incoming {
    Auth(Option<Option<AuthUser>>),
    Profile(Option<DocUpdate>),
}

pub struct Session {
    backend: Backend,
    redirect_on_sign_out: Route,
    user: Option<AuthUser>,
    profile: Option<UserProfile>,
    loading: bool,
    auth_updates: Option<mpsc::UnboundedReceiver<Option<AuthUser>>>,
    auth_unsubscribe: Option<Unsubscribe>,
    profile_updates: Option<mpsc::UnboundedReceiver<DocUpdate>>,
    profile_unsubscribe: Option<Unsubscribe>,
}

impl Session {
    pub fn start(backend: Backend, redirect_on_sign_out: Route) -> Self {
        let (updates, unsubscribe) = backend.auth.on_state_changed().into_parts();
        Self {
            backend,
            redirect_on_sign_out,
            user: None,
            profile: None,
            loading: true,
            auth_updates: Some(updates),
            auth_unsubscribe: Some(unsubscribe),
            profile_updates: None,
            profile_unsubscribe: None,
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_active(&self) -> bool {
        self.auth_updates.is_some()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Waits for the next auth or profile update. `None` after shutdown.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let incoming = {
                let auth = self.auth_updates.as_mut()?;
                match self.profile_updates.as_mut() {
                    Some(profile) => tokio::select! {
                        biased;
                        update = auth.recv() => Incoming::Auth(update),
                        update = profile.recv() => Incoming::Profile(update),
                    },
                    None => Incoming::Auth(auth.recv().await),
                }
            };

            if let Some(event) = self.apply(incoming) {
                return Some(event);
            }
            if self.auth_updates.is_none() {
                return None;
            }
        }
    }

    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            let incoming = if let Some(update) = self
                .auth_updates
                .as_mut()
                .and_then(try_next)
            {
                Incoming::Auth(update)
            } else if let Some(update) = self
                .profile_updates
                .as_mut()
                .and_then(try_next)
            {
                Incoming::Profile(update)
            } else {
                break;
            };

            if let Some(event) = self.apply(incoming) {
                events.push(event);
            }
        }
        events
    }

    fn apply(&mut self, incoming: Incoming) -> Option<SessionEvent> {
        match incoming {
            Incoming::Auth(Some(Some(user))) => Some(self.on_signed_in(user)),
            Incoming::Auth(Some(None)) => Some(self.on_signed_out()),
            Incoming::Auth(None) => {
                warn!("Auth listener closed");
                self.shutdown();
                None
            }
            Incoming::Profile(Some(Ok(Some(doc)))) => match UserProfile::from_snapshot(&doc) {
                Ok(profile) => {
                    self.profile = Some(profile);
                    Some(SessionEvent::ProfileChanged)
                }
                Err(err) => {
                    warn!("Unreadable profile document: {}", err);
                    None
                }
            },
            // a missing profile document keeps the last known one
            Incoming::Profile(Some(Ok(None))) => None,
            Incoming::Profile(Some(Err(err))) => {
                warn!("Error fetching profile: {}", err);
                None
            }
            Incoming::Profile(None) => {
                self.stop_profile();
                None
            }
        }
    }

    fn on_signed_in(&mut self, user: AuthUser) -> SessionEvent {
        let same_user = self.user.as_ref().map(|u| u.uid == user.uid).unwrap_or(false);
        if !same_user {
            self.stop_profile();
            self.profile = None;
            let (updates, unsubscribe) = self
                .backend
                .store
                .watch(&profile_path(&user.uid))
                .into_parts();
            self.profile_updates = Some(updates);
            self.profile_unsubscribe = Some(unsubscribe);
        }

        self.user = Some(user.clone());
        self.loading = false;
        SessionEvent::SignedIn(user)
    }

    fn on_signed_out(&mut self) -> SessionEvent {
        self.stop_profile();
        self.user = None;
        self.profile = None;
        SessionEvent::Redirect(self.redirect_on_sign_out.clone())
    }

    fn stop_profile(&mut self) {
        self.profile_updates = None;
        if let Some(unsubscribe) = self.profile_unsubscribe.take() {
            unsubscribe.call();
        }
    }

    /// Creates the account and its profile document. The auth service signs
    /// the new user in; the session learns about it through its listener.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<AuthUser, AppError> {
        validate_sign_up(email, password, confirm)?;

        let user = self.backend.auth.sign_up(email, password).await.map_err(|e| {
            error!("Sign-up error: {}", e);
            e
        })?;
        self.backend
            .store
            .set(&profile_path(&user.uid), new_profile(&user.uid, &user.email))
            .await?;
        info!("Account created for {}", user.email);
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AppError> {
        validate_sign_in(email, password)?;

        let user = self.backend.auth.sign_in(email, password).await.map_err(|e| {
            error!("Login error: {}", e);
            e
        })?;
        info!("{} signed in", user.email);
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<Route, AppError> {
        self.backend.auth.sign_out().await.map_err(|e| {
            error!("Logout error: {}", e);
            e
        })?;
        Ok(self.redirect_on_sign_out.clone())
    }

    pub fn shutdown(&mut self) {
        self.stop_profile();
        self.auth_updates = None;
        if let Some(unsubscribe) = self.auth_unsubscribe.take() {
            unsubscribe.call();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
