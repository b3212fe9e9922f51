mod common;

use chrono::{Duration, TimeZone, Utc};

use chirp::editor::{CharCountStatus, Draft};
use chirp::format::{format_account_date, format_relative};
use chirp::models::{Post, Reply};
use chirp::notify::Notifications;
use chirp::policy::{can_delete, can_edit};
use chirp::{Action, AppError, AuthError, BackendError, ValidationError};

fn post_by(user_id: &str, created_at: Option<chrono::DateTime<Utc>>) -> Post {
    Post {
        id: "p1".to_string(),
        user_id: user_id.to_string(),
        user_email: format!("{}@chirp.dev", user_id),
        content: "hello".to_string(),
        image_url: None,
        created_at,
        edited: None,
        likes: vec![],
    }
}

#[test]
fn test_edit_window_boundary() {
    let created = common::start_time();
    let post = post_by("alice", Some(created));

    assert!(can_edit(&post, "alice", created));
    assert!(can_edit(&post, "alice", created + Duration::seconds(299)));
    assert!(!can_edit(&post, "alice", created + Duration::seconds(300)));
    assert!(!can_edit(&post, "alice", created + Duration::minutes(6)));
    assert!(!can_edit(&post, "bob", created + Duration::seconds(10)));

    let pending = post_by("alice", None);
    assert!(!can_edit(&pending, "alice", created));

    let reply = Reply {
        id: "r1".to_string(),
        post_id: "p1".to_string(),
        user_id: "bob".to_string(),
        user_email: "bob@chirp.dev".to_string(),
        content: "hi".to_string(),
        image_url: None,
        created_at: Some(created),
        edited: None,
        likes: vec![],
    };
    assert!(can_edit(&reply, "bob", created + Duration::seconds(60)));
    assert!(can_delete(&reply, "bob"));
    assert!(!can_delete(&reply, "alice"));
    assert!(can_delete(&pending, "alice"));
}

#[test]
fn test_draft_caps_length() {
    let mut draft = Draft::new();
    assert!(draft.is_blank());
    assert_eq!(draft.status(), CharCountStatus::Normal);

    assert!(draft.set_content(&"a".repeat(259)));
    assert_eq!(draft.status(), CharCountStatus::Normal);

    assert!(draft.set_content(&"a".repeat(260)));
    assert_eq!(draft.status(), CharCountStatus::Warning);

    assert!(draft.set_content(&"ü".repeat(280)));
    assert_eq!(draft.char_count(), 280);
    assert_eq!(draft.status(), CharCountStatus::Limit);

    // over the cap: rejected, draft unchanged
    assert!(!draft.set_content(&"b".repeat(281)));
    assert_eq!(draft.content(), "ü".repeat(280));

    draft.clear();
    assert_eq!(draft.char_count(), 0);
}

#[test]
fn test_format_relative() {
    let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();

    assert_eq!(format_relative(None, now), "Just now");
    assert_eq!(format_relative(Some(now - Duration::seconds(59)), now), "Just now");
    assert_eq!(format_relative(Some(now - Duration::seconds(60)), now), "1m");
    assert_eq!(format_relative(Some(now - Duration::minutes(59)), now), "59m");
    assert_eq!(format_relative(Some(now - Duration::hours(3)), now), "3h");
    assert_eq!(format_relative(Some(now - Duration::days(6)), now), "6d");
    assert_eq!(format_relative(Some(now - Duration::days(19)), now), "Mar 1, 2024");
    // clock skew
    assert_eq!(format_relative(Some(now + Duration::seconds(5)), now), "Just now");
}

#[test]
fn test_format_account_date() {
    let ts = Utc.with_ymd_and_hms(2023, 11, 5, 8, 30, 0).unwrap();
    assert_eq!(format_account_date(Some(ts)), "November 2023");
    assert_eq!(format_account_date(None), "Recently");
}

#[test]
fn test_banners_expire() {
    let now = common::start_time();
    let mut banners = Notifications::with_duration(3000);

    banners.show_success("Saved", now);
    assert_eq!(banners.active_success(now), Some("Saved"));
    assert_eq!(
        banners.active_success(now + Duration::milliseconds(2999)),
        Some("Saved")
    );
    assert_eq!(banners.active_success(now + Duration::milliseconds(3000)), None);

    banners.show_error_for("Sticky", 0, now);
    assert_eq!(banners.active_error(now + Duration::days(1)), Some("Sticky"));

    banners.clear();
    assert_eq!(banners.active_error(now), None);
    assert_eq!(banners.active_success(now), None);
}

#[test]
fn test_report_picks_banner_text() {
    let now = common::start_time();
    let mut banners = Notifications::with_duration(3000);

    let ok: Result<(), AppError> = Ok(());
    assert!(!banners.report(Action::LikeTweet, &ok, now));
    assert_eq!(banners.active_error(now), None);

    let failed: Result<(), AppError> =
        Err(BackendError::Unavailable("offline".to_string()).into());
    assert!(banners.report(Action::DeleteReply, &failed, now));
    assert_eq!(
        banners.active_error(now),
        Some("Failed to delete reply. Please try again.")
    );

    let invalid: Result<(), AppError> = Err(ValidationError::PasswordMismatch.into());
    banners.report(Action::SignUp, &invalid, now);
    assert_eq!(banners.active_error(now), Some("Passwords do not match"));

    let auth: Result<(), AppError> = Err(AuthError::TooManyRequests.into());
    banners.report(Action::SignIn, &auth, now);
    assert_eq!(
        banners.active_error(now),
        Some("Too many failed login attempts. Please try again later.")
    );

    let auth: Result<(), AppError> = Err(AuthError::EmailAlreadyInUse.into());
    banners.report(Action::SignUp, &auth, now);
    assert_eq!(
        banners.active_error(now),
        Some("This email is already registered")
    );
}
