mod common;

use std::time::Duration as StdDuration;

use chrono::Duration;

use chirp::auth::{Session, SessionEvent};
use chirp::backend::{AuthBackend, DocumentStore};
use chirp::core::db::{seed_demo_data, DEMO_ACCOUNTS};
use chirp::follow::toggle_follow;
use chirp::models::{FollowState, ImageChange, PostEdit};
use chirp::routes::Route;
use chirp::users::ProfileView;
use chirp::{AppError, AuthError, Feed, LikeOutcome, Posts, ValidationError};

#[tokio::test]
async fn test_full_feed_flow() {
    let env = common::env();
    let a = env.user("a").await;
    let b = env.user("b").await;
    let posts = Posts::new(env.memory.store.clone());
    let mut feed = Feed::open(env.memory.store.clone());

    // 1. A posts "hello"
    let post_id = posts.post_tweet(Some(&a), "hello", None).await.unwrap();
    feed.drain();
    assert_eq!(feed.posts().len(), 1);
    let post = feed.post(&post_id).cloned().unwrap();
    assert_eq!(post.content, "hello");
    assert!(post.likes.is_empty());
    assert!(feed.replies(&post_id).is_empty());

    // 2. B likes it
    let outcome = posts.toggle_like_post(Some(&b), &post).await.unwrap();
    assert_eq!(outcome, LikeOutcome::Liked);
    feed.drain();
    assert_eq!(feed.post(&post_id).unwrap().likes, vec![b.uid.clone()]);

    // 3. B likes again
    let post = feed.post(&post_id).cloned().unwrap();
    let outcome = posts.toggle_like_post(Some(&b), &post).await.unwrap();
    assert_eq!(outcome, LikeOutcome::Unliked);
    feed.drain();
    assert!(feed.post(&post_id).unwrap().likes.is_empty());

    // 4. A edits within a minute
    env.clock.advance(Duration::seconds(45));
    let post = feed.post(&post_id).cloned().unwrap();
    let edit = PostEdit {
        post_id: post_id.clone(),
        content: "hello, world".to_string(),
        image: ImageChange::Keep,
    };
    posts
        .update_post(Some(&a), &post, edit, env.now())
        .await
        .unwrap();
    feed.drain();
    let edited = feed.post(&post_id).unwrap();
    assert_eq!(edited.content, "hello, world");
    assert_eq!(edited.edited, Some(env.now()));

    // 5. Six minutes later the edit is refused
    env.clock.advance(Duration::minutes(6));
    let post = feed.post(&post_id).cloned().unwrap();
    let edit = PostEdit {
        post_id: post_id.clone(),
        content: "too late".to_string(),
        image: ImageChange::Keep,
    };
    let result = posts.update_post(Some(&a), &post, edit, env.now()).await;
    assert_eq!(result, Err(AppError::EditWindowClosed));

    // 6. B replies
    posts
        .post_reply(Some(&b), &post_id, "nice", None)
        .await
        .unwrap();
    feed.drain();
    assert_eq!(feed.replies(&post_id).len(), 1);
    assert_eq!(feed.replies(&post_id)[0].user_email, "b@chirp.dev");

    feed.close();
    assert_eq!(env.memory.store.listener_count(), 0);
}

#[tokio::test]
async fn test_sign_up_creates_profile_and_signs_in() {
    let env = common::env();
    let mut session = Session::start(env.memory.backend(), Route::Login);

    // signed out at start
    assert_eq!(session.drain(), vec![SessionEvent::Redirect(Route::Login)]);
    assert!(session.user().is_none());

    let user = session
        .sign_up("carol@chirp.dev", "secret99", "secret99")
        .await
        .unwrap();
    let events = session.drain();
    assert!(events.contains(&SessionEvent::SignedIn(user.clone())));
    assert!(events.contains(&SessionEvent::ProfileChanged));
    assert!(!session.is_loading());

    let profile = session.profile().expect("profile should be loaded");
    assert_eq!(profile.user_id, user.uid);
    assert_eq!(profile.email, "carol@chirp.dev");
    assert!(profile.followers.is_empty());
    assert!(profile.created_at.is_some());
}

#[tokio::test]
async fn test_sign_up_validation() {
    let env = common::env();
    let session = Session::start(env.memory.backend(), Route::Login);

    let cases = [
        ("", "secret99", "secret99", ValidationError::MissingFields),
        ("not-an-email", "secret99", "secret99", ValidationError::InvalidEmail),
        ("dave@chirp.dev", "12345", "12345", ValidationError::PasswordTooShort),
        ("dave@chirp.dev", "secret99", "secret98", ValidationError::PasswordMismatch),
    ];
    for (email, password, confirm, expected) in cases {
        let result = session.sign_up(email, password, confirm).await;
        assert_eq!(result, Err(AppError::Validation(expected)));
    }
    assert!(env.memory.auth.current_user().is_none());

    session
        .sign_up("dave@chirp.dev", "secret99", "secret99")
        .await
        .unwrap();
    let again = session
        .sign_up("dave@chirp.dev", "secret99", "secret99")
        .await
        .unwrap_err();
    assert_eq!(again, AppError::Auth(AuthError::EmailAlreadyInUse));
    assert_eq!(
        again.user_message(chirp::Action::SignUp),
        "This email is already registered"
    );
}

#[tokio::test]
async fn test_sign_in_errors() {
    let env = common::env();
    env.user("erin").await;
    env.memory.auth.sign_out().await.unwrap();
    let session = Session::start(env.memory.backend(), Route::Login);

    let result = session.sign_in("", "x").await;
    assert_eq!(
        result,
        Err(AppError::Validation(ValidationError::MissingFields))
    );

    let err = session
        .sign_in("nobody@chirp.dev", "password123")
        .await
        .unwrap_err();
    assert_eq!(
        err.user_message(chirp::Action::SignIn),
        "No account found with this email address"
    );

    let err = session
        .sign_in("erin@chirp.dev", "wrong-pass")
        .await
        .unwrap_err();
    assert_eq!(
        err.user_message(chirp::Action::SignIn),
        "Incorrect password. Please try again."
    );

    env.memory.auth.set_disabled("erin@chirp.dev", true);
    let err = session
        .sign_in("erin@chirp.dev", "password123")
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Auth(AuthError::UserDisabled));

    env.memory.auth.set_disabled("erin@chirp.dev", false);
    let user = session.sign_in("erin@chirp.dev", "password123").await.unwrap();
    assert_eq!(user.email, "erin@chirp.dev");

    // repeated failures lock the account for a while, not forever
    for _ in 0..5 {
        let err = session.sign_in("erin@chirp.dev", "wrong-pass").await.unwrap_err();
        assert_eq!(err, AppError::Auth(AuthError::WrongPassword));
    }
    let err = session
        .sign_in("erin@chirp.dev", "password123")
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Auth(AuthError::TooManyRequests));

    env.clock.advance(Duration::minutes(4));
    let err = session
        .sign_in("erin@chirp.dev", "password123")
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Auth(AuthError::TooManyRequests));

    env.clock.advance(Duration::minutes(1));
    let user = session.sign_in("erin@chirp.dev", "password123").await.unwrap();
    assert_eq!(user.email, "erin@chirp.dev");

    // the count starts over after a successful sign-in
    let err = session.sign_in("erin@chirp.dev", "wrong-pass").await.unwrap_err();
    assert_eq!(err, AppError::Auth(AuthError::WrongPassword));
}

#[tokio::test]
async fn test_sign_out_redirects_and_stops_profile() {
    let env = common::env();
    let mut session = Session::start(env.memory.backend(), Route::Login);
    session
        .sign_up("frank@chirp.dev", "secret99", "secret99")
        .await
        .unwrap();
    session.drain();
    assert!(session.user().is_some());
    // auth listener + profile watch
    assert_eq!(env.memory.store.listener_count(), 1);
    assert_eq!(env.memory.auth.listener_count(), 1);

    let route = session.sign_out().await.unwrap();
    assert_eq!(route, Route::Login);
    let event = tokio::time::timeout(StdDuration::from_secs(1), session.next_event())
        .await
        .expect("sign-out should be delivered");
    assert_eq!(event, Some(SessionEvent::Redirect(Route::Login)));
    assert!(session.user().is_none());
    assert!(session.profile().is_none());
    assert_eq!(env.memory.store.listener_count(), 0);

    session.shutdown();
    assert_eq!(env.memory.auth.listener_count(), 0);
    assert_eq!(session.next_event().await, None);
}

#[test]
fn test_routes() {
    assert_eq!(Route::parse("/"), Route::Home);
    assert_eq!(Route::parse("/login"), Route::Login);
    assert_eq!(Route::parse("/signup/"), Route::Signup);
    assert_eq!(Route::parse("/profile/abc123"), Route::Profile("abc123".to_string()));
    assert_eq!(
        Route::parse("/nope"),
        Route::NotFound("/nope".to_string())
    );
    assert_eq!(Route::Profile("abc".to_string()).to_string(), "/profile/abc");

    assert_eq!(Route::Home.guard(false), Route::Login);
    assert_eq!(Route::Profile("x".to_string()).guard(false), Route::Login);
    assert_eq!(Route::Home.guard(true), Route::Home);
    assert_eq!(Route::Signup.guard(false), Route::Signup);
}

#[tokio::test]
async fn test_follow_toggle() {
    let env = common::env();
    let alice = env.user("alice").await;
    let bob = env.user("bob").await;
    let store = env.memory.store.as_ref();

    // self-follow is rejected
    let result = toggle_follow(store, Some(&alice), &alice.uid, None).await;
    assert_eq!(
        result,
        Err(AppError::Validation(ValidationError::SelfFollow))
    );

    // profiles are created lazily
    let state = toggle_follow(store, Some(&alice), &bob.uid, Some(&bob.email))
        .await
        .unwrap();
    assert_eq!(state, FollowState::Following);

    let mut view = ProfileView::open(env.memory.store.clone(), &bob.uid);
    view.drain();
    let profile = view.profile().expect("bob's profile should exist");
    assert_eq!(profile.email, "bob@chirp.dev");
    assert_eq!(profile.followers, vec![alice.uid.clone()]);
    assert_eq!(view.follower_count(), 1);

    // second toggle unfollows
    let state = view.toggle_follow(Some(&alice)).await.unwrap();
    assert_eq!(state, FollowState::NotFollowing);
    view.drain();
    assert_eq!(view.follower_count(), 0);

    let alice_doc = env
        .memory
        .store
        .get(&chirp::auth::profile_path(&alice.uid))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice_doc.data["following"], serde_json::json!([]));
}

#[tokio::test]
async fn test_profile_view() {
    let env = common::env();
    let alice = env.user("alice").await;
    let bob = env.user("bob").await;
    let posts = Posts::new(env.memory.store.clone());

    let mut view = ProfileView::open(env.memory.store.clone(), &alice.uid);
    view.drain();
    assert!(!view.is_loading_posts());
    assert_eq!(view.display_handle(), "User");
    assert!(view.is_own_profile(Some(&alice)));
    assert!(!view.is_own_profile(Some(&bob)));

    posts.post_tweet(Some(&alice), "older", None).await.unwrap();
    env.clock.advance(Duration::minutes(2));
    posts.post_tweet(Some(&alice), "newer", None).await.unwrap();
    posts.post_tweet(Some(&bob), "not mine", None).await.unwrap();
    view.drain();

    let contents: Vec<&str> = view.posts().iter().map(|p| p.content.as_str()).collect();
    assert_eq!(contents, vec!["newer", "older"]);
    assert_eq!(view.display_handle(), "alice@chirp.dev");

    let state = view.toggle_follow(Some(&bob)).await.unwrap();
    assert_eq!(state, FollowState::Following);
    let bob_profile = chirp::follow::ensure_profile(env.memory.store.as_ref(), &bob.uid, &bob.email)
        .await
        .unwrap();
    assert!(view.is_followed_by(Some(&bob_profile)));

    view.close();
    assert_eq!(env.memory.store.listener_count(), 0);
}

#[tokio::test]
async fn test_profile_view_skips_unreadable_posts() {
    let env = common::env();
    let alice = env.user("alice").await;
    let posts = Posts::new(env.memory.store.clone());
    posts.post_tweet(Some(&alice), "readable", None).await.unwrap();

    // right owner, wrong shape
    env.memory
        .store
        .add(
            "tweets",
            chirp::backend::Changes::new()
                .set("userId", alice.uid.as_str())
                .set("likes", "everyone")
                .server_timestamp("createdAt"),
        )
        .await
        .unwrap();

    let mut view = ProfileView::open(env.memory.store.clone(), &alice.uid);
    view.drain();
    assert!(!view.is_loading_posts());
    assert_eq!(view.posts().len(), 1);
    assert_eq!(view.posts()[0].content, "readable");
}

#[tokio::test]
async fn test_seed_demo_data_is_idempotent() {
    let env = common::env();
    let backend = env.memory.backend();

    seed_demo_data(&backend).await.unwrap();
    seed_demo_data(&backend).await.unwrap();

    assert_eq!(env.memory.store.document_count("tweets"), 4);
    assert_eq!(env.memory.store.document_count("users"), 3);
    assert!(env.memory.auth.current_user().is_none());

    let (test_email, test_password) = DEMO_ACCOUNTS[0];
    let (bob_email, bob_password) = DEMO_ACCOUNTS[2];
    let test = backend.auth.sign_in(test_email, test_password).await.unwrap();
    let bob = backend.auth.sign_in(bob_email, bob_password).await.unwrap();

    let profile = chirp::follow::ensure_profile(env.memory.store.as_ref(), &test.uid, &test.email)
        .await
        .unwrap();
    assert_eq!(profile.following, vec![bob.uid.clone()]);
}
