use crate::error::{not_found_as, ApiError};
use crate::models::{Comment, CommentView, Id, NewComment};
use crate::repo::Repo;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Row removed; it had no replies.
    Removed,
    /// Row kept for its replies, content cleared.
    Redacted,
}

pub async fn create_comment(
    repo: &dyn Repo,
    user_id: Id,
    post_id: Id,
    content: &str,
    parent_id: Option<Id>,
) -> Result<Comment, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Comment content is required"));
    }
    repo.get_post(post_id).await.map_err(not_found_as("Post not found"))?;
    if let Some(parent_id) = parent_id {
        let parent = repo
            .get_comment(parent_id)
            .await
            .map_err(not_found_as("Parent comment not found"))?;
        if parent.post_id != post_id {
            return Err(ApiError::validation("Parent comment belongs to another post"));
        }
    }
    let comment = repo
        .create_comment(NewComment { post_id, parent_id, user_id, content: content.to_string() })
        .await?;
    Ok(comment)
}

pub async fn delete_comment(repo: &dyn Repo, user_id: Id, comment_id: Id) -> Result<DeleteOutcome, ApiError> {
    let comment = repo
        .get_comment(comment_id)
        .await
        .map_err(not_found_as("Comment not found"))?;
    if comment.user_id != user_id {
        return Err(ApiError::forbidden("You are not the author of this comment"));
    }
    if repo.count_replies(comment_id).await? == 0 {
        repo.delete_comment(comment_id).await?;
        Ok(DeleteOutcome::Removed)
    } else {
        repo.redact_comment(comment_id).await?;
        Ok(DeleteOutcome::Redacted)
    }
}

/// Clamp a requested page size into `1..=MAX_PAGE_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

pub async fn list_comments(
    repo: &dyn Repo,
    post_id: Id,
    parent_id: Option<Id>,
    offset: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<CommentView>, ApiError> {
    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::validation("Invalid offset"));
    }
    repo.get_post(post_id).await.map_err(not_found_as("Post not found"))?;
    Ok(repo.list_comments(post_id, parent_id, offset, clamp_limit(limit)).await?)
}
