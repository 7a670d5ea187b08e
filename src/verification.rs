//! One-time codes for email verification, password reset and account deletion.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::ApiError;
use crate::models::{CodePurpose, Id, VerificationCode};
use crate::repo::{Repo, RepoError};

pub const CODE_LENGTH: usize = 6;
pub const CODE_TTL_MINUTES: i64 = 10;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Replace the user's code for `purpose` with a fresh one and return it.
pub async fn issue(repo: &dyn Repo, user_id: Id, purpose: CodePurpose, now: DateTime<Utc>) -> Result<String, ApiError> {
    let code = generate_code();
    repo.replace_code(user_id, purpose, &code, now + Duration::minutes(CODE_TTL_MINUTES))
        .await?;
    Ok(code)
}

/// Look up an unexpired code and delete it. Unknown or expired codes are a validation error.
pub async fn consume(
    repo: &dyn Repo,
    user_id: Option<Id>,
    purpose: CodePurpose,
    code: &str,
    now: DateTime<Utc>,
) -> Result<VerificationCode, ApiError> {
    let code = code.trim().to_ascii_uppercase();
    let row = repo
        .find_active_code(user_id, purpose, &code, now)
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::validation("Invalid or expired code"),
            other => other.into(),
        })?;
    repo.delete_code(row.id).await?;
    Ok(row)
}
