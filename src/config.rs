use chrono::Duration;

// === Limits ===
pub const MAX_POST_LENGTH: usize = 280;
pub const POST_LENGTH_WARNING: usize = 260;
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn edit_window() -> Duration {
    Duration::minutes(5)
}

// === Collections ===
pub const TWEETS_COLLECTION: &str = "tweets";
pub const USERS_COLLECTION: &str = "users";
pub const REPLIES_COLLECTION: &str = "replies";

pub fn replies_collection(post_id: &str) -> String {
    format!("{}/{}/{}", TWEETS_COLLECTION, post_id, REPLIES_COLLECTION)
}

pub fn tweet_upload_path(user_id: &str, millis: i64, file_name: &str) -> String {
    format!("tweets/{}/{}_{}", user_id, millis, file_name)
}

pub fn reply_upload_path(user_id: &str, millis: i64, file_name: &str) -> String {
    format!("replies/{}/{}_{}", user_id, millis, file_name)
}

// === Env-overridable settings ===
pub fn banner_duration_ms() -> u64 {
    std::env::var("CHIRP_BANNER_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(3000)
}

pub fn storage_base_url() -> String {
    std::env::var("CHIRP_STORAGE_BASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "memory://chirp-blobs".to_string())
}

pub fn upload_chunk_bytes() -> usize {
    std::env::var("CHIRP_UPLOAD_CHUNK_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

pub fn max_failed_sign_ins() -> u32 {
    std::env::var("CHIRP_MAX_FAILED_SIGN_INS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(5)
}

pub fn sign_in_lockout() -> Duration {
    std::env::var("CHIRP_SIGN_IN_LOCKOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v >= 0)
        .map(Duration::seconds)
        .unwrap_or_else(|| Duration::minutes(5))
}
