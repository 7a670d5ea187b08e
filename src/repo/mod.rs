use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::*;
use crate::statistics::RankingWeights;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("{0}")] Validation(String),
    #[error("{0}")] Forbidden(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Outcome of an unverified-account sweep. `files` are the records that went
/// with the accounts; their objects are still in storage.
#[derive(Debug, Default, Clone)]
pub struct SweptUsers {
    pub users: u64,
    pub files: Vec<FileRecord>,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// `Conflict` when the login or email is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_login(&self, login: &str) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
    async fn set_password(&self, id: Id, password_hash: String) -> RepoResult<()>;
    async fn set_language(&self, id: Id, language: Language) -> RepoResult<()>;
    async fn mark_verified(&self, id: Id) -> RepoResult<()>;
    async fn set_user_logo(&self, id: Id, logo_id: Option<Id>) -> RepoResult<()>;
    /// Removes the user and everything hanging off it.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
    /// Removes unverified accounts created before `cutoff`, same cascade as
    /// `delete_user`.
    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> RepoResult<SweptUsers>;
}

#[async_trait]
pub trait VerificationRepo: Send + Sync {
    /// Drops any existing codes for (user, purpose) and stores the new one.
    async fn replace_code(
        &self,
        user_id: Id,
        purpose: CodePurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<VerificationCode>;
    /// Unexpired code matching `code` and `purpose`, optionally scoped to a user.
    async fn find_active_code(
        &self,
        user_id: Option<Id>,
        purpose: CodePurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<VerificationCode>;
    async fn delete_code(&self, id: Id) -> RepoResult<()>;
    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait TaxonomyRepo: Send + Sync {
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    async fn tags_for_post(&self, post_id: Id) -> RepoResult<Vec<Tag>>;
}

#[async_trait]
pub trait ChannelRepo: Send + Sync {
    async fn create_channel(&self, new: NewChannel) -> RepoResult<Channel>;
    async fn get_channel(&self, id: Id) -> RepoResult<Channel>;
    async fn update_channel(&self, id: Id, upd: UpdateChannel) -> RepoResult<Channel>;
    async fn delete_channel(&self, id: Id) -> RepoResult<()>;
    async fn list_owned_channels(&self, owner_id: Id) -> RepoResult<Vec<Channel>>;
    async fn list_subscribed_channels(&self, user_id: Id) -> RepoResult<Vec<Channel>>;
    async fn list_popular_channels(&self, limit: i64) -> RepoResult<Vec<Channel>>;
    async fn list_channel_ids(&self) -> RepoResult<Vec<Id>>;
    async fn set_channel_logo(&self, id: Id, logo_id: Option<Id>) -> RepoResult<()>;
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    /// `Conflict` when the pair already exists.
    async fn subscribe(&self, user_id: Id, channel_id: Id) -> RepoResult<()>;
    /// `NotFound` when there is nothing to remove.
    async fn unsubscribe(&self, user_id: Id, channel_id: Id) -> RepoResult<()>;
}

/// Every denormalized counter mutation goes through here.
#[async_trait]
pub trait CounterRepo: Send + Sync {
    /// Adds `delta` to `subs_count`, never going below zero.
    async fn adjust_subscribers(&self, channel_id: Id, delta: i64) -> RepoResult<()>;
    async fn increment_views(&self, post_id: Id) -> RepoResult<()>;
    /// Recomputes likes/dislikes of every post in the channel from the reactions table.
    async fn reconcile_reaction_counts(&self, channel_id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Inserts the post with its tags and attachments atomically.
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    /// Newest first.
    async fn list_channel_posts(&self, channel_id: Id, offset: i64, limit: i64) -> RepoResult<Vec<Post>>;
    async fn post_images(&self, post_id: Id) -> RepoResult<Vec<FileRecord>>;
    async fn post_files(&self, post_id: Id) -> RepoResult<Vec<FileRecord>>;
    /// Ids of posts created at or after `since`, best rated first.
    async fn ranked_post_ids(
        &self,
        since: DateTime<Utc>,
        weights: RankingWeights,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Id>>;
    /// Unordered; missing ids are skipped.
    async fn get_posts_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait ReactionRepo: Send + Sync {
    async fn get_reaction(&self, user_id: Id, post_id: Id) -> RepoResult<Option<PostReaction>>;
    async fn insert_reaction(&self, user_id: Id, post_id: Id, like: bool) -> RepoResult<()>;
    async fn update_reaction(&self, user_id: Id, post_id: Id, like: bool) -> RepoResult<()>;
    async fn delete_reaction(&self, user_id: Id, post_id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn count_replies(&self, id: Id) -> RepoResult<i64>;
    /// Marks the comment deleted and clears its content.
    async fn redact_comment(&self, id: Id) -> RepoResult<()>;
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
    /// Oldest first; `parent_id = None` selects root comments.
    async fn list_comments(
        &self,
        post_id: Id,
        parent_id: Option<Id>,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<CommentView>>;
}

#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn create_file(&self, new: NewFileRecord) -> RepoResult<FileRecord>;
    async fn get_file(&self, id: Id) -> RepoResult<FileRecord>;
    /// Also clears every slot and join row pointing at the file.
    async fn delete_file_record(&self, id: Id) -> RepoResult<()>;
    async fn list_user_files(&self, owner_id: Id) -> RepoResult<Vec<FileRecord>>;
    /// True while any logo, preview or post attachment still points at the file.
    async fn file_is_referenced(&self, id: Id) -> RepoResult<bool>;
}

#[async_trait]
pub trait StatisticsRepo: Send + Sync {
    /// Live aggregate over the channel's posts and their comments.
    async fn channel_counters(&self, channel_id: Id) -> RepoResult<StatCounters>;
    async fn replace_snapshot(
        &self,
        channel_id: Id,
        date: NaiveDate,
        counters: StatCounters,
    ) -> RepoResult<ChannelStatistics>;
    async fn get_snapshot(&self, channel_id: Id, date: NaiveDate) -> RepoResult<Option<ChannelStatistics>>;
}

pub trait Repo:
    UserRepo
    + VerificationRepo
    + TaxonomyRepo
    + ChannelRepo
    + SubscriptionRepo
    + CounterRepo
    + PostRepo
    + ReactionRepo
    + CommentRepo
    + FileRepo
    + StatisticsRepo
{
}

impl<T> Repo for T where
    T: UserRepo
        + VerificationRepo
        + TaxonomyRepo
        + ChannelRepo
        + SubscriptionRepo
        + CounterRepo
        + PostRepo
        + ReactionRepo
        + CommentRepo
        + FileRepo
        + StatisticsRepo
{
}

/// Rating used by the recommended feed.
pub fn rating(weights: &RankingWeights, views: i64, likes: i64, dislikes: i64, comments: i64) -> i64 {
    views * weights.views + likes * weights.likes + dislikes * weights.dislikes + comments * weights.comments
}
