use log::info;

use crate::auth::{new_profile, profile_path};
use crate::backend::Backend;
use crate::core::errors::AuthError;
use crate::follow::{ensure_profile, toggle_follow};
use crate::models::models::AuthUser;
use crate::posts::Posts;

pub const DEMO_ACCOUNTS: &[(&str, &str)] = &[
    ("test@chirp.dev", "test1234"),
    ("alice@chirp.dev", "alice1234"),
    ("bob@chirp.dev", "bob12345"),
];

fn demo_posts(email: &str) -> &'static [&'static str] {
    match email {
        "test@chirp.dev" => &["This is my first post on Chirp!"],
        "alice@chirp.dev" => &[
            "Welcome to my feed! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
        "bob@chirp.dev" => &[
            "Hey everyone! Just joined Chirp, looking forward to connecting with you all.",
        ],
        _ => &[],
    }
}

/// Returns the account and whether it was created by this call.
async fn demo_account(
    backend: &Backend,
    email: &str,
    password: &str,
) -> anyhow::Result<(AuthUser, bool)> {
    match backend.auth.sign_in(email, password).await {
        Ok(user) => Ok((user, false)),
        Err(AuthError::UserNotFound) => {
            let user = backend.auth.sign_up(email, password).await?;
            backend
                .store
                .set(&profile_path(&user.uid), new_profile(&user.uid, &user.email))
                .await?;
            Ok((user, true))
        }
        Err(err) => Err(err.into()),
    }
}

/// Creates the demo accounts (test, alice, bob), their posts and a
/// test -> bob follow. Accounts that already exist are left alone.
/// Leaves nobody signed in.
pub async fn seed_demo_data(backend: &Backend) -> anyhow::Result<()> {
    let posts = Posts::new(backend.store.clone());
    let mut users = Vec::new();

    for (email, password) in DEMO_ACCOUNTS {
        let (user, created) = demo_account(backend, email, password).await?;
        if created {
            for content in demo_posts(email) {
                posts.post_tweet(Some(&user), content, None).await?;
            }
            info!("Seeded demo account {}", email);
        }
        users.push(user);
    }

    if let [test, _, bob] = users.as_slice() {
        let profile = ensure_profile(backend.store.as_ref(), &test.uid, &test.email).await?;
        if !profile.is_following(&bob.uid) {
            toggle_follow(backend.store.as_ref(), Some(test), &bob.uid, Some(&bob.email)).await?;
        }
    }

    backend.auth.sign_out().await?;
    Ok(())
}
