//! JSON shapes returned by handlers and the lookups that assemble them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{Category, Channel, CommentView, FileRecord, Id, Language, Post, Tag, User};
use crate::repo::{Repo, RepoError};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: Id,
    pub url: String,
}

impl FileResponse {
    pub fn new(file: &FileRecord, store: &dyn ObjectStore) -> Self {
        Self { id: file.id, url: store.public_url(&file.filename) }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileResponse {
    pub id: Id,
    pub url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Id,
    pub login: String,
    pub email: String,
    pub language: Language,
    pub is_verified: bool,
    pub logo: Option<FileResponse>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub category: Option<Category>,
    pub owner_id: Id,
    pub subs_count: i64,
    pub logo: Option<FileResponse>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Id,
    pub channel: ChannelResponse,
    pub preview_image: Option<FileResponse>,
    pub title: String,
    pub content: String,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub views_count: i64,
    pub post_images: Vec<FileResponse>,
    pub post_files: Vec<FileResponse>,
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthorResponse {
    pub id: Id,
    pub login: String,
    pub logo: Option<FileResponse>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Id,
    pub post_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Id>,
    pub content: String,
    pub is_deleted: bool,
    pub replies_count: i64,
    pub created_at: DateTime<Utc>,
    pub user: AuthorResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// Resolve an optional slot to a file; a dangling reference renders as no file.
async fn slot_file(repo: &dyn Repo, file_id: Option<Id>) -> Result<Option<FileRecord>, ApiError> {
    let Some(id) = file_id else { return Ok(None) };
    match repo.get_file(id).await {
        Ok(file) => Ok(Some(file)),
        Err(RepoError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn user_response(repo: &dyn Repo, store: &dyn ObjectStore, user: &User) -> Result<UserResponse, ApiError> {
    let logo = slot_file(repo, user.logo_id).await?.map(|f| FileResponse::new(&f, store));
    Ok(UserResponse {
        id: user.id,
        login: user.login.clone(),
        email: user.email.clone(),
        language: user.language,
        is_verified: user.is_verified,
        logo,
    })
}

pub async fn channel_response(
    repo: &dyn Repo,
    store: &dyn ObjectStore,
    channel: &Channel,
) -> Result<ChannelResponse, ApiError> {
    let category = match channel.category_id {
        Some(id) => match repo.get_category(id).await {
            Ok(c) => Some(c),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let logo = slot_file(repo, channel.logo_id).await?.map(|f| FileResponse::new(&f, store));
    Ok(ChannelResponse {
        id: channel.id,
        name: channel.name.clone(),
        description: channel.description.clone(),
        category,
        owner_id: channel.owner_id,
        subs_count: channel.subs_count,
        logo,
        created_at: channel.created_at,
    })
}

pub async fn channel_responses(
    repo: &dyn Repo,
    store: &dyn ObjectStore,
    channels: &[Channel],
) -> Result<Vec<ChannelResponse>, ApiError> {
    let mut out = Vec::with_capacity(channels.len());
    for channel in channels {
        out.push(channel_response(repo, store, channel).await?);
    }
    Ok(out)
}

pub async fn post_response(repo: &dyn Repo, store: &dyn ObjectStore, post: &Post) -> Result<PostResponse, ApiError> {
    let channel = repo.get_channel(post.channel_id).await?;
    let channel = channel_response(repo, store, &channel).await?;
    let preview_image = slot_file(repo, post.preview_image_id).await?.map(|f| FileResponse::new(&f, store));
    let post_images = repo.post_images(post.id).await?.iter().map(|f| FileResponse::new(f, store)).collect();
    let post_files = repo.post_files(post.id).await?.iter().map(|f| FileResponse::new(f, store)).collect();
    let tags = repo.tags_for_post(post.id).await?;
    Ok(PostResponse {
        id: post.id,
        channel,
        preview_image,
        title: post.title.clone(),
        content: post.content.clone(),
        likes_count: post.likes_count,
        dislikes_count: post.dislikes_count,
        views_count: post.views_count,
        post_images,
        post_files,
        tags,
        created_at: post.created_at,
    })
}

pub async fn post_responses(repo: &dyn Repo, store: &dyn ObjectStore, posts: &[Post]) -> Result<Vec<PostResponse>, ApiError> {
    let mut out = Vec::with_capacity(posts.len());
    for post in posts {
        out.push(post_response(repo, store, post).await?);
    }
    Ok(out)
}

pub fn comment_response(view: CommentView, store: &dyn ObjectStore) -> CommentResponse {
    let logo = match (view.author_logo_id, view.author_logo_key.as_deref()) {
        (Some(id), Some(key)) => Some(FileResponse { id, url: store.public_url(key) }),
        _ => None,
    };
    CommentResponse {
        id: view.id,
        post_id: view.post_id,
        parent_id: view.parent_id,
        content: view.content,
        is_deleted: view.is_deleted,
        replies_count: view.replies_count,
        created_at: view.created_at,
        user: AuthorResponse { id: view.user_id, login: view.author_login, logo },
    }
}
