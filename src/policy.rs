//! Who may change what, and when.

use chrono::{DateTime, Utc};
use log::warn;

use crate::config::edit_window;
use crate::core::errors::AppError;
use crate::models::models::FeedItem;

/// Only the author, and only while `now - createdAt` is under the edit window.
/// An item still waiting for its server timestamp cannot be edited.
pub fn can_edit(item: &impl FeedItem, requester_id: &str, now: DateTime<Utc>) -> bool {
    let Some(created_at) = item.created_at() else {
        return false;
    };
    if item.author_id() != requester_id {
        return false;
    }
    now - created_at < edit_window()
}

pub fn can_delete(item: &impl FeedItem, requester_id: &str) -> bool {
    item.author_id() == requester_id
}

/// [`can_edit`] as an error, telling a foreign author apart from a closed window.
pub fn ensure_can_edit(
    item: &impl FeedItem,
    requester_id: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if item.author_id() != requester_id {
        return Err(AppError::Forbidden("only the author can edit"));
    }
    if !can_edit(item, requester_id, now) {
        warn!("Edit of {} rejected, window closed", item.item_id());
        return Err(AppError::EditWindowClosed);
    }
    Ok(())
}
