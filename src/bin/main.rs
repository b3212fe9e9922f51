use chrono::Duration;
use log::{info, warn};

use chirp::auth::Session;
use chirp::core::db::{seed_demo_data, DEMO_ACCOUNTS};
use chirp::core::helpers::now;
use chirp::format::format_relative;
use chirp::models::{ImageChange, PostEdit};
use chirp::notify::Notifications;
use chirp::routes::Route;
use chirp::{Action, Feed, MemoryBackend, Posts};

fn log_feed(feed: &Feed) {
    info!("Feed: {} posts", feed.posts().len());
    for post in feed.posts() {
        info!(
            "  [{}] {}: {:?} ({} likes, {} replies{})",
            format_relative(post.created_at, now()),
            post.user_email,
            post.content,
            post.likes.len(),
            feed.replies(&post.id).len(),
            if post.edited.is_some() { ", edited" } else { "" }
        );
    }
}

async fn run() -> anyhow::Result<()> {
    let memory = MemoryBackend::new();
    let backend = memory.backend();
    seed_demo_data(&backend).await?;

    let mut session = Session::start(backend.clone(), Route::Login);
    let posts = Posts::new(backend.store.clone());
    let mut banners = Notifications::new();
    let mut feed = Feed::open(backend.store.clone());
    feed.drain();
    log_feed(&feed);

    let (a_email, a_password) = DEMO_ACCOUNTS[1];
    let (b_email, b_password) = DEMO_ACCOUNTS[2];

    let a = session.sign_in(a_email, a_password).await?;
    session.drain();
    let post_id = posts.post_tweet(Some(&a), "hello", None).await?;
    feed.drain();

    let b = session.sign_in(b_email, b_password).await?;
    session.drain();
    for _ in 0..2 {
        if let Some(post) = feed.post(&post_id).cloned() {
            let outcome = posts.toggle_like_post(Some(&b), &post).await;
            banners.report(Action::LikeTweet, &outcome, now());
            feed.drain();
            info!("{:?} -> likes {:?}", outcome, feed.post(&post_id).map(|p| &p.likes));
        }
    }

    if let Some(post) = feed.post(&post_id).cloned() {
        let edit = PostEdit {
            post_id: post_id.clone(),
            content: "hello, edited".to_string(),
            image: ImageChange::Keep,
        };
        let result = posts.update_post(Some(&a), &post, edit.clone(), now()).await;
        banners.report(Action::EditTweet, &result, now());
        feed.drain();

        let late = now() + Duration::minutes(6);
        let result = posts.update_post(Some(&a), &post, edit, late).await;
        if banners.report(Action::EditTweet, &result, late) {
            warn!("Late edit refused: {:?}", banners.active_error(late));
        }
    }

    let reply_id = posts
        .post_reply(Some(&b), &post_id, "hi there", None)
        .await?;
    feed.drain();
    info!("Reply {} posted", reply_id);
    log_feed(&feed);

    let route = session.sign_out().await?;
    for event in session.drain() {
        info!("Session event: {:?}", event);
    }
    info!("Signed out, navigating to {}", route);

    feed.close();
    session.shutdown();
    info!("Listeners left open: {}", memory.store.listener_count());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    run().await
}
