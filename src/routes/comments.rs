use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::views::{comment_response, CommentResponse};
use super::{ok_data, ok_message, positive_id, AppState};
use crate::auth::Auth;
use crate::comments::{self, DeleteOutcome};
use crate::error::ApiError;
use crate::models::{CommentView, Id};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: Id,
    pub content: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CommentsQuery {
    pub post_id: Id,
    /// Omit for root-level comments.
    pub parent_id: Option<Id>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/createComment",
    request_body = CreateCommentRequest,
    responses(
        (status = 200, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Empty content or parent on another post"),
        (status = 404, description = "Post or parent not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.post_id <= 0 {
        return Err(ApiError::validation("Post id is required"));
    }
    let repo = data.repo.as_ref();
    let parent_id = body.parent_id.filter(|id| *id != 0);
    let comment = comments::create_comment(repo, auth.user_id, body.post_id, &body.content, parent_id).await?;
    let author = repo.get_user(auth.user_id).await?;
    let logo = match author.logo_id {
        Some(id) => repo.get_file(id).await.ok(),
        None => None,
    };
    let view = CommentView {
        id: comment.id,
        post_id: comment.post_id,
        parent_id: comment.parent_id,
        user_id: comment.user_id,
        content: comment.content,
        is_deleted: comment.is_deleted,
        created_at: comment.created_at,
        replies_count: 0,
        author_login: author.login,
        author_logo_id: logo.as_ref().map(|f| f.id),
        author_logo_key: logo.map(|f| f.filename),
    };
    Ok(ok_data(comment_response(view, data.store.as_ref()), "Comment created successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/deleteComment/{id}",
    params(("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Removed, or redacted when it has replies", body = super::MessageResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let comment_id = positive_id(&path, "comment")?;
    let message = match comments::delete_comment(data.repo.as_ref(), auth.user_id, comment_id).await? {
        DeleteOutcome::Removed => "Comment deleted successfully",
        DeleteOutcome::Redacted => "Comment marked as deleted",
    };
    Ok(ok_message(message))
}

#[utoipa::path(
    get,
    path = "/api/getPostComments",
    params(CommentsQuery),
    responses((status = 200, description = "Oldest first", body = [CommentResponse]), (status = 404, description = "Post not found"))
)]
pub async fn get_post_comments(data: web::Data<AppState>, query: web::Query<CommentsQuery>) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    if q.post_id <= 0 {
        return Err(ApiError::validation("Invalid post id"));
    }
    let parent_id = q.parent_id.filter(|id| *id != 0);
    let views = comments::list_comments(data.repo.as_ref(), q.post_id, parent_id, q.offset, q.limit).await?;
    let store = data.store.as_ref();
    let items: Vec<CommentResponse> = views.into_iter().map(|v| comment_response(v, store)).collect();
    Ok(ok_data(items, ""))
}
