#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix_web::web;
use blogpoint::auth::create_jwt;
use blogpoint::config::AppConfig;
use blogpoint::mail::{MailError, Mailer};
use blogpoint::models::{Id, Language, NewUser};
use blogpoint::password::hash_password;
use blogpoint::rate_limit::RateLimiterFacade;
use blogpoint::repo::inmem::InMemRepo;
use blogpoint::repo::UserRepo;
use blogpoint::storage::{object_url, ObjectMeta, ObjectStore, StorageError};
use blogpoint::AppState;

pub const PASSWORD: &str = "secret123";

pub fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "testsecret-abcdefghijklmnopqrstuvwxyz012345");
    }
}

// ---------------- In-memory object store (tests only) ----------------
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, mime: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.inner.lock().unwrap().insert(key.to_string(), (bytes, mime.to_string()));
        Ok(())
    }
    async fn stat(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        let map = self.inner.lock().unwrap();
        let (bytes, mime) = map.get(key).ok_or(StorageError::NotFound)?;
        Ok(ObjectMeta { size: bytes.len() as i64, content_type: Some(mime.clone()) })
    }
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.lock().unwrap().remove(key).map(|_| ()).ok_or(StorageError::NotFound)
    }
    fn public_url(&self, key: &str) -> String {
        object_url("http://storage.test", "bucket", key)
    }
}

// ---------------- Mailer that keeps what it was asked to send ----------------
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    /// Six characters following `marker` in the latest mail to `to`.
    fn last_token_after(&self, to: &str, marker: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, _, html) = sent.iter().rev().find(|(rcpt, _, _)| rcpt == to)?;
        let start = html.find(marker)? + marker.len();
        html.get(start..start + 6).map(str::to_string)
    }

    pub fn last_code(&self, to: &str) -> Option<String> {
        self.last_token_after(to, "letter-spacing: 4px;\">")
    }

    pub fn last_reset_token(&self, to: &str) -> Option<String> {
        self.last_token_after(to, "?token=")
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string(), html.to_string()));
        Ok(())
    }
}

/// Handles shared between a test and the app it drives.
pub struct TestCtx {
    pub repo: InMemRepo,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub config: AppConfig,
    pub rate_limiter: Option<RateLimiterFacade>,
}

impl TestCtx {
    pub fn new() -> Self {
        ensure_secret();
        Self {
            repo: InMemRepo::new(),
            store: Arc::new(MemoryStore::default()),
            mailer: Arc::new(RecordingMailer::default()),
            config: AppConfig { reset_link_base: "http://front.test/reset".into(), ..AppConfig::default() },
            rate_limiter: None,
        }
    }

    pub fn data(&self) -> web::Data<AppState> {
        web::Data::new(AppState {
            repo: Arc::new(self.repo.clone()),
            store: self.store.clone(),
            mailer: self.mailer.clone(),
            rate_limiter: self.rate_limiter.clone(),
            config: Arc::new(self.config.clone()),
        })
    }

    /// Create an account directly in the store and return its id and a session token.
    pub async fn user(&self, login: &str) -> (Id, String) {
        let user = self
            .repo
            .create_user(NewUser {
                login: login.to_string(),
                email: format!("{login}@example.com"),
                password_hash: hash_password(PASSWORD).unwrap(),
                language: Language::Ru,
            })
            .await
            .unwrap();
        let token = create_jwt(user.id, chrono::Duration::hours(1)).unwrap();
        (user.id, token)
    }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

/// Multipart body with a single `file` field.
pub fn multipart(file_name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "XBLOGPOINTBOUNDARY";
    let mut body: Vec<u8> = Vec::new();
    let disp = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    );
    body.extend_from_slice(disp.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// Minimal 1x1 PNG
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}
