use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::views::{post_response, post_responses};
use super::{ok_data, ok_message, positive_id, AppState};
use crate::attachments::release_previous;
use crate::auth::Auth;
use crate::error::{not_found_as, ApiError};
use crate::models::{Id, NewPost, Post, ReactionKind, UpdatePost};
use crate::reactions;
use crate::repo::{Repo, RepoError};
use crate::statistics::{recommended_posts, RECOMMENDED_PAGE_SIZE};

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(range(min = 1, message = "Channel id is required"))]
    pub channel_id: Id,
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    #[validate(length(min = 1, message = "At least one tag is required"))]
    pub tags: Vec<Id>,
    pub post_images: Vec<Id>,
    pub post_files: Vec<Id>,
    pub preview_image_id: Option<Id>,
}

/// Absent fields and empty strings are left alone; present lists replace.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct EditPostRequest {
    #[validate(range(min = 1, message = "Post id is required"))]
    pub post_id: Id,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    pub content: Option<String>,
    #[validate(length(min = 1, message = "At least one tag is required"))]
    pub tags: Option<Vec<Id>>,
    pub post_images: Option<Vec<Id>>,
    pub post_files: Option<Vec<Id>>,
    pub preview_image_id: Option<Id>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ReactionRequest {
    pub post_id: Id,
    /// `like` or `dislike`.
    pub reaction: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based, defaults to 1.
    pub page: Option<i64>,
}

fn page_number(query: &PageQuery) -> Result<i64, ApiError> {
    match query.page.unwrap_or(1) {
        p if p >= 1 => Ok(p),
        _ => Err(ApiError::validation("Invalid page value")),
    }
}

fn post_write_error(e: RepoError) -> ApiError {
    match e {
        RepoError::Conflict => ApiError::conflict("Post with this title already exists in the channel"),
        RepoError::NotFound => ApiError::not_found("Channel not found"),
        other => other.into(),
    }
}

/// A preview must exist, belong to the caller and be an image.
async fn check_preview(repo: &dyn Repo, user_id: Id, file_id: Id) -> Result<(), ApiError> {
    let file = match repo.get_file(file_id).await {
        Ok(file) => file,
        Err(RepoError::NotFound) => return Err(ApiError::validation("Error preview image does not exist")),
        Err(e) => return Err(e.into()),
    };
    if file.owner_id != user_id {
        return Err(ApiError::forbidden("You don't own the preview image"));
    }
    if !file.is_image() {
        return Err(ApiError::validation("Preview image file type is not allowed"));
    }
    Ok(())
}

/// The post, provided the caller owns its channel.
async fn owned_post(repo: &dyn Repo, user_id: Id, post_id: Id) -> Result<Post, ApiError> {
    let post = repo.get_post(post_id).await.map_err(not_found_as("Post not found"))?;
    let channel = repo.get_channel(post.channel_id).await.map_err(not_found_as("Channel not found"))?;
    if channel.owner_id != user_id {
        return Err(ApiError::forbidden("You are not the owner of this post"));
    }
    Ok(post)
}

#[utoipa::path(
    post,
    path = "/api/createPost",
    request_body = CreatePostRequest,
    responses(
        (status = 200, description = "Post created", body = super::views::PostResponse),
        (status = 400, description = "Invalid data or attachments"),
        (status = 403, description = "Not the channel owner or attachment owner"),
        (status = 409, description = "Title taken in this channel")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_post(auth: Auth, data: web::Data<AppState>, body: web::Json<CreatePostRequest>) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    req.validate()?;
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    let repo = data.repo.as_ref();
    let channel = repo.get_channel(req.channel_id).await.map_err(not_found_as("Channel not found"))?;
    if channel.owner_id != auth.user_id {
        return Err(ApiError::forbidden("You are not the owner of this channel"));
    }
    if let Some(preview_id) = req.preview_image_id {
        check_preview(repo, auth.user_id, preview_id).await?;
    }
    let post = repo
        .create_post(NewPost {
            channel_id: channel.id,
            owner_id: auth.user_id,
            title,
            content: req.content,
            preview_image_id: req.preview_image_id,
            tag_ids: req.tags,
            image_ids: req.post_images,
            file_ids: req.post_files,
        })
        .await
        .map_err(post_write_error)?;
    tracing::info!(post_id = post.id, channel_id = channel.id, "post created");
    Ok(ok_data(post_response(repo, data.store.as_ref(), &post).await?, "Post created successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/editPost",
    request_body = EditPostRequest,
    responses(
        (status = 200, description = "Post updated", body = super::views::PostResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn edit_post(auth: Auth, data: web::Data<AppState>, body: web::Json<EditPostRequest>) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    req.validate()?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    let current = owned_post(repo, auth.user_id, req.post_id).await?;
    if let Some(preview_id) = req.preview_image_id {
        check_preview(repo, auth.user_id, preview_id).await?;
    }
    let upd = UpdatePost {
        owner_id: auth.user_id,
        title: req.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        content: req.content.filter(|c| !c.is_empty()),
        preview_image_id: req.preview_image_id,
        tag_ids: req.tags,
        image_ids: req.post_images,
        file_ids: req.post_files,
    };
    let post = repo.update_post(current.id, upd).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::conflict("Post with this title already exists in the channel"),
        RepoError::NotFound => ApiError::not_found("Post not found"),
        other => other.into(),
    })?;
    if let Some(old_preview) = current.preview_image_id.filter(|old| Some(*old) != post.preview_image_id) {
        release_previous(repo, store, old_preview).await?;
    }
    Ok(ok_data(post_response(repo, store, &post).await?, "Post edited successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/deletePost/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted", body = super::MessageResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let post_id = positive_id(&path, "post")?;
    let repo = data.repo.as_ref();
    owned_post(repo, auth.user_id, post_id).await?;
    repo.delete_post(post_id).await.map_err(not_found_as("Post not found"))?;
    tracing::info!(post_id, "post deleted");
    Ok(ok_message("Post deleted successfully"))
}

#[utoipa::path(
    get,
    path = "/api/getPost/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses((status = 200, description = "Post; counts as a view", body = super::views::PostResponse), (status = 404, description = "Post not found"))
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let post_id = positive_id(&path, "post")?;
    let repo = data.repo.as_ref();
    repo.increment_views(post_id).await.map_err(not_found_as("Post not found"))?;
    let post = repo.get_post(post_id).await.map_err(not_found_as("Post not found"))?;
    Ok(ok_data(post_response(repo, data.store.as_ref(), &post).await?, ""))
}

#[utoipa::path(
    get,
    path = "/api/getPosts/{channelId}",
    params(("channelId" = i64, Path, description = "Channel id"), PageQuery),
    responses((status = 200, description = "Newest first, ten per page", body = [super::views::PostResponse]), (status = 404, description = "Channel not found"))
)]
pub async fn get_posts(data: web::Data<AppState>, path: web::Path<String>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let page = page_number(&query)?;
    let repo = data.repo.as_ref();
    repo.get_channel(channel_id).await.map_err(not_found_as("Channel not found"))?;
    let posts = repo
        .list_channel_posts(channel_id, (page - 1) * RECOMMENDED_PAGE_SIZE, RECOMMENDED_PAGE_SIZE)
        .await?;
    let message = if posts.is_empty() { "No posts found" } else { "" };
    Ok(ok_data(post_responses(repo, data.store.as_ref(), &posts).await?, message))
}

#[utoipa::path(
    get,
    path = "/api/getRecommendedPosts",
    params(PageQuery),
    responses((status = 200, description = "Best rated recent posts", body = [super::views::PostResponse]), (status = 400, description = "Invalid page value"))
)]
pub async fn get_recommended_posts(data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let page = page_number(&query)?;
    let repo = data.repo.as_ref();
    let cfg = &data.config;
    let posts = recommended_posts(repo, Utc::now(), cfg.recommended_window_days, cfg.ranking_weights, page).await?;
    let message = if posts.is_empty() { "No posts found" } else { "" };
    Ok(ok_data(post_responses(repo, data.store.as_ref(), &posts).await?, message))
}

#[utoipa::path(
    post,
    path = "/api/setReaction",
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Reaction added, removed or updated", body = super::MessageResponse),
        (status = 400, description = "Invalid reaction"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_reaction(auth: Auth, data: web::Data<AppState>, body: web::Json<ReactionRequest>) -> Result<HttpResponse, ApiError> {
    let kind = ReactionKind::parse(body.reaction.trim()).ok_or_else(|| ApiError::validation("Invalid reaction value"))?;
    let outcome = reactions::set_reaction(data.repo.as_ref(), auth.user_id, body.post_id, kind).await?;
    Ok(ok_message(outcome.message()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_start_at_one() {
        assert_eq!(page_number(&PageQuery { page: None }).unwrap(), 1);
        assert_eq!(page_number(&PageQuery { page: Some(3) }).unwrap(), 3);
        assert!(page_number(&PageQuery { page: Some(0) }).is_err());
    }
}
