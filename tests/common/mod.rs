#![allow(dead_code)]

use std::sync::Arc;

use argon2::Params;
use chrono::{DateTime, TimeZone, Utc};

use chirp::backend::memory::{ManualClock, MemoryAuth, MemoryBackend};
use chirp::models::AuthUser;
use chirp::upload::ImageFile;

pub struct TestEnv {
    pub memory: MemoryBackend,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// In-memory backend with cheap password hashing and a clock that only
/// moves when the test says so.
pub fn env() -> TestEnv {
    let _ = env_logger::builder().is_test(true).try_init();

    let params = Params::new(8, 1, 1, None).expect("Argon2 params should be valid");
    let clock = Arc::new(ManualClock::new(start_time()));
    let memory = MemoryBackend::with_parts(MemoryAuth::with_params(params), clock.clone());
    TestEnv { memory, clock }
}

impl TestEnv {
    pub fn now(&self) -> DateTime<Utc> {
        use chirp::backend::memory::Clock;
        self.clock.now()
    }

    pub async fn user(&self, name: &str) -> AuthUser {
        use chirp::backend::AuthBackend;
        self.memory
            .auth
            .sign_up(&format!("{}@chirp.dev", name), "password123")
            .await
            .expect("Failed to create account")
    }
}

pub fn image(name: &str, content_type: Option<&str>, size: usize) -> ImageFile {
    ImageFile::new(name, content_type, vec![7u8; size])
}
