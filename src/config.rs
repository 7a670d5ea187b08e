//! Runtime configuration read from the environment.

use std::time::Duration;

use crate::statistics::{RankingWeights, RECOMMENDED_WINDOW_DAYS};

fn string_env(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
fn usize_env(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn i64_env(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub endpoint: String,
    /// Endpoint browsers use to fetch objects; may differ from the internal one.
    pub public_endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    /// Empty host puts the mailer in log-only mode.
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_ttl: chrono::Duration,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub reset_link_base: String,
    pub max_upload_bytes: usize,
    pub enable_hsts: bool,
    pub cleanup_interval: Duration,
    pub unverified_account_ttl: chrono::Duration,
    pub statistics_interval: Duration,
    pub recommended_window_days: i64,
    pub ranking_weights: RankingWeights,
    pub storage: StorageConfig,
    pub smtp: SmtpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".into(),
            database_url: String::new(),
            db_max_connections: 5,
            jwt_ttl: chrono::Duration::hours(1),
            cookie_secure: false,
            frontend_url: "http://localhost:5173".into(),
            reset_link_base: "http://localhost:5173/reset-password".into(),
            max_upload_bytes: 50 * 1024 * 1024,
            enable_hsts: false,
            cleanup_interval: Duration::from_secs(12 * 3600),
            unverified_account_ttl: chrono::Duration::hours(24),
            statistics_interval: Duration::from_secs(24 * 3600),
            recommended_window_days: RECOMMENDED_WINDOW_DAYS,
            ranking_weights: RankingWeights::DEFAULT,
            storage: StorageConfig {
                endpoint: "http://localhost:9000".into(),
                public_endpoint: "http://localhost:9000".into(),
                bucket: "blogpoint-bucket".into(),
                region: "us-east-1".into(),
                access_key: String::new(),
                secret_key: String::new(),
            },
            smtp: SmtpConfig {
                host: String::new(),
                port: 587,
                username: None,
                password: None,
                from: "BlogPoint <no-reply@blogpoint.local>".into(),
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let d = AppConfig::default();
        let endpoint = string_env("S3_ENDPOINT", &d.storage.endpoint);
        let public_endpoint = string_env("S3_PUBLIC_ENDPOINT", &endpoint);
        Self {
            bind_addr: string_env("BIND_ADDR", &d.bind_addr),
            database_url: string_env("DATABASE_URL", ""),
            db_max_connections: u64_env("DB_MAX_CONNECTIONS", d.db_max_connections as u64) as u32,
            jwt_ttl: chrono::Duration::seconds(i64_env("JWT_TTL_SECS", d.jwt_ttl.num_seconds())),
            cookie_secure: bool_env("COOKIE_SECURE", d.cookie_secure),
            frontend_url: string_env("FRONTEND_URL", &d.frontend_url),
            reset_link_base: string_env("RESET_LINK_BASE", &d.reset_link_base),
            max_upload_bytes: usize_env("MAX_UPLOAD_BYTES", d.max_upload_bytes),
            enable_hsts: bool_env("ENABLE_HSTS", d.enable_hsts),
            cleanup_interval: Duration::from_secs(u64_env("CLEANUP_INTERVAL_SECS", d.cleanup_interval.as_secs())),
            unverified_account_ttl: chrono::Duration::hours(i64_env(
                "UNVERIFIED_ACCOUNT_TTL_HOURS",
                d.unverified_account_ttl.num_hours(),
            )),
            statistics_interval: Duration::from_secs(u64_env("STATISTICS_INTERVAL_SECS", d.statistics_interval.as_secs())),
            recommended_window_days: i64_env("RECOMMENDED_WINDOW_DAYS", d.recommended_window_days),
            ranking_weights: d.ranking_weights,
            storage: StorageConfig {
                endpoint,
                public_endpoint,
                bucket: string_env("S3_BUCKET", &d.storage.bucket),
                region: string_env("S3_REGION", &d.storage.region),
                access_key: string_env("S3_ACCESS_KEY", ""),
                secret_key: string_env("S3_SECRET_KEY", ""),
            },
            smtp: SmtpConfig {
                host: string_env("SMTP_HOST", ""),
                port: u64_env("SMTP_PORT", d.smtp.port as u64) as u16,
                username: std::env::var("SMTP_USERNAME").ok(),
                password: std::env::var("SMTP_PASSWORD").ok(),
                from: string_env("SMTP_FROM", &d.smtp.from),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_intervals() {
        let c = AppConfig::default();
        assert_eq!(c.cleanup_interval, Duration::from_secs(43_200));
        assert_eq!(c.statistics_interval, Duration::from_secs(86_400));
        assert_eq!(c.recommended_window_days, 7);
        assert_eq!(c.storage.bucket, "blogpoint-bucket");
    }
}
