use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// BIGSERIAL everywhere
pub type Id = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "user_language", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ru" => Some(Language::Ru),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "code_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    EmailVerification,
    PasswordReset,
    AccountDeletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(ReactionKind::Like),
            "dislike" => Some(ReactionKind::Dislike),
            _ => None,
        }
    }

    /// Storage encoding: `true` is a like.
    pub fn is_like(self) -> bool {
        matches!(self, ReactionKind::Like)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub login: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub language: Language,
    pub is_verified: bool,
    pub logo_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub language: Language,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub login: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationCode {
    pub id: Id,
    pub user_id: Id,
    pub code: String,
    pub purpose: CodePurpose,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub color: String,
}

/// Tag joined with its category's color.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Id,
    pub category_id: Id,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Channel {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub category_id: Option<Id>,
    pub owner_id: Id,
    pub subs_count: i64,
    pub logo_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub description: String,
    pub category_id: Option<Id>,
    pub owner_id: Id,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateChannel {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the category.
    pub category_id: Option<Option<Id>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub channel_id: Id,
    pub preview_image_id: Option<Id>,
    pub title: String,
    pub content: String,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a post in one transaction. Attachment ids
/// are checked against `owner_id` inside the transaction.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub channel_id: Id,
    pub owner_id: Id,
    pub title: String,
    pub content: String,
    pub preview_image_id: Option<Id>,
    pub tag_ids: Vec<Id>,
    pub image_ids: Vec<Id>,
    pub file_ids: Vec<Id>,
}

/// `None` leaves a field or association untouched; a present list replaces it.
#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub owner_id: Id,
    pub title: Option<String>,
    pub content: Option<String>,
    pub preview_image_id: Option<Id>,
    pub tag_ids: Option<Vec<Id>>,
    pub image_ids: Option<Vec<Id>>,
    pub file_ids: Option<Vec<Id>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostReaction {
    pub post_id: Id,
    pub user_id: Id,
    pub reaction: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub user_id: Id,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub user_id: Id,
    pub content: String,
}

/// A comment row enriched with its live reply count and author summary.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentView {
    pub id: Id,
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub user_id: Id,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub replies_count: i64,
    pub author_login: String,
    pub author_logo_id: Option<Id>,
    pub author_logo_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Id,
    pub owner_id: Id,
    pub filename: String, // object storage key
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_image(&self) -> bool {
        self.mime_type.split('/').next() == Some("image")
    }
}

#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub owner_id: Id,
    pub filename: String,
    pub mime_type: String,
}

/// The five per-channel counters tracked by statistics snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatCounters {
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub posts: i64,
    pub comments: i64,
}

impl StatCounters {
    /// Element-wise `self - previous`.
    pub fn delta(&self, previous: &StatCounters) -> StatCounters {
        StatCounters {
            views: self.views - previous.views,
            likes: self.likes - previous.likes,
            dislikes: self.dislikes - previous.dislikes,
            posts: self.posts - previous.posts,
            comments: self.comments - previous.comments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChannelStatistics {
    pub id: Id,
    pub channel_id: Id,
    pub date: NaiveDate,
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub posts: i64,
    pub comments: i64,
}

impl ChannelStatistics {
    pub fn counters(&self) -> StatCounters {
        StatCounters {
            views: self.views,
            likes: self.likes,
            dislikes: self.dislikes,
            posts: self.posts,
            comments: self.comments,
        }
    }
}
