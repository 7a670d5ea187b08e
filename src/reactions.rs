use crate::error::{not_found_as, ApiError};
use crate::models::{Id, ReactionKind};
use crate::repo::Repo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Added,
    Removed,
    Updated,
}

impl ReactionOutcome {
    pub fn message(self) -> &'static str {
        match self {
            ReactionOutcome::Added => "Reaction added",
            ReactionOutcome::Removed => "Reaction removed",
            ReactionOutcome::Updated => "Reaction updated",
        }
    }
}

/// Toggle semantics: same kind again removes, the other kind flips in place.
/// Post counters are left alone; snapshots reconcile them.
pub async fn set_reaction(
    repo: &dyn Repo,
    user_id: Id,
    post_id: Id,
    kind: ReactionKind,
) -> Result<ReactionOutcome, ApiError> {
    if post_id == 0 {
        return Err(ApiError::validation("Post id is required"));
    }
    let like = kind.is_like();
    let outcome = match repo.get_reaction(user_id, post_id).await? {
        None => {
            repo.insert_reaction(user_id, post_id, like)
                .await
                .map_err(not_found_as("Post not found"))?;
            ReactionOutcome::Added
        }
        Some(existing) if existing.reaction == like => {
            repo.delete_reaction(user_id, post_id).await?;
            ReactionOutcome::Removed
        }
        Some(_) => {
            repo.update_reaction(user_id, post_id, like).await?;
            ReactionOutcome::Updated
        }
    };
    tracing::debug!(user_id, post_id, ?outcome, "reaction set");
    Ok(outcome)
}
