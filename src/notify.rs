//! Timed success and error banners.

use chrono::{DateTime, Duration, Utc};
use log::error;

use crate::config::banner_duration_ms;
use crate::core::errors::{Action, AppError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Banner {
    message: String,
    /// `None` keeps the banner until it is replaced or cleared.
    expires_at: Option<DateTime<Utc>>,
}

impl Banner {
    fn new(message: &str, duration_ms: u64, now: DateTime<Utc>) -> Self {
        let expires_at = match duration_ms {
            0 => None,
            ms => Some(now + Duration::milliseconds(ms.min(i64::MAX as u64) as i64)),
        };
        Self {
            message: message.to_string(),
            expires_at,
        }
    }

    fn visible_at(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.expires_at {
            Some(expires_at) if now >= expires_at => None,
            _ => Some(&self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notifications {
    duration_ms: u64,
    success: Option<Banner>,
    error: Option<Banner>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifications {
    pub fn new() -> Self {
        Self::with_duration(banner_duration_ms())
    }

    pub fn with_duration(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            success: None,
            error: None,
        }
    }

    pub fn show_success(&mut self, message: &str, now: DateTime<Utc>) {
        self.show_success_for(message, self.duration_ms, now);
    }

    pub fn show_success_for(&mut self, message: &str, duration_ms: u64, now: DateTime<Utc>) {
        self.success = Some(Banner::new(message, duration_ms, now));
    }

    pub fn show_error(&mut self, message: &str, now: DateTime<Utc>) {
        self.show_error_for(message, self.duration_ms, now);
    }

    pub fn show_error_for(&mut self, message: &str, duration_ms: u64, now: DateTime<Utc>) {
        self.error = Some(Banner::new(message, duration_ms, now));
    }

    pub fn clear(&mut self) {
        self.success = None;
        self.error = None;
    }

    pub fn active_success(&self, now: DateTime<Utc>) -> Option<&str> {
        self.success.as_ref().and_then(|b| b.visible_at(now))
    }

    pub fn active_error(&self, now: DateTime<Utc>) -> Option<&str> {
        self.error.as_ref().and_then(|b| b.visible_at(now))
    }

    /// Logs a failed `action` and shows its banner. Returns whether it failed.
    pub fn report<T>(
        &mut self,
        action: Action,
        result: &Result<T, AppError>,
        now: DateTime<Utc>,
    ) -> bool {
        match result {
            Ok(_) => false,
            Err(err) => {
                error!("{:?} failed: {}", action, err);
                self.show_error(&err.user_message(action), now);
                true
            }
        }
    }
}
