use log::{debug, error, info};

use crate::auth::{new_profile, profile_path};
use crate::backend::{Changes, DocPath, DocumentStore};
use crate::core::errors::{AppError, ValidationError};
use crate::models::models::{AuthUser, FollowState, UserProfile};

/// Placeholder address for a profile created before its owner was seen.
pub const UNKNOWN_EMAIL: &str = "user@example.com";

/// Reads `user_id`'s profile, creating it first when it does not exist yet.
pub async fn ensure_profile(
    store: &dyn DocumentStore,
    user_id: &str,
    email: &str,
) -> Result<UserProfile, AppError> {
    let path = profile_path(user_id);
    if let Some(doc) = store.get(&path).await? {
        return Ok(UserProfile::from_snapshot(&doc)?);
    }

    debug!("Creating profile document for {}", user_id);
    store.set(&path, new_profile(user_id, email)).await?;
    match store.get(&path).await? {
        Some(doc) => Ok(UserProfile::from_snapshot(&doc)?),
        None => Ok(UserProfile {
            user_id: user_id.to_string(),
            email: email.to_string(),
            created_at: None,
            followers: Vec::new(),
            following: Vec::new(),
        }),
    }
}

/// Follows `target_id` if the current user does not follow them yet,
/// otherwise unfollows. Both sides are written with atomic array operators.
pub async fn toggle_follow(
    store: &dyn DocumentStore,
    current_user: Option<&AuthUser>,
    target_id: &str,
    target_email_hint: Option<&str>,
) -> Result<FollowState, AppError> {
    let user = current_user.ok_or(AppError::NotSignedIn)?;
    if user.uid == target_id {
        return Err(ValidationError::SelfFollow.into());
    }

    let result = write_follow(store, user, target_id, target_email_hint).await;
    if let Err(err) = &result {
        error!("Error toggling follow: {}", err);
    }
    result
}

async fn write_follow(
    store: &dyn DocumentStore,
    user: &AuthUser,
    target_id: &str,
    target_email_hint: Option<&str>,
) -> Result<FollowState, AppError> {
    let me = ensure_profile(store, &user.uid, &user.email).await?;
    ensure_profile(store, target_id, target_email_hint.unwrap_or(UNKNOWN_EMAIL)).await?;

    let my_doc: DocPath = profile_path(&user.uid);
    let their_doc: DocPath = profile_path(target_id);

    if me.is_following(target_id) {
        store
            .update(&my_doc, Changes::new().array_remove("following", target_id))
            .await?;
        store
            .update(&their_doc, Changes::new().array_remove("followers", user.uid.as_str()))
            .await?;
        info!("{} unfollowed {}", user.uid, target_id);
        Ok(FollowState::NotFollowing)
    } else {
        store
            .update(&my_doc, Changes::new().array_union("following", target_id))
            .await?;
        store
            .update(&their_doc, Changes::new().array_union("followers", user.uid.as_str()))
            .await?;
        info!("{} followed {}", user.uid, target_id);
        Ok(FollowState::Following)
    }
}
