use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::*;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) => match db.code().as_deref() {
                Some("23505") => RepoError::Conflict,
                Some("23503") => RepoError::NotFound,
                _ => RepoError::Internal(e.to_string()),
            },
            other => RepoError::Internal(other.to_string()),
        }
    }
}

const USER_COLS: &str = "id, login, email, password_hash, language, is_verified, logo_id, created_at";
const CHANNEL_COLS: &str = "id, name, description, category_id, owner_id, subs_count, logo_id, created_at";
const POST_COLS: &str =
    "id, channel_id, preview_image_id, title, content, likes_count, dislikes_count, views_count, created_at";
const FILE_COLS: &str = "id, owner_id, filename, mime_type, created_at";

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Tag, image and file checks shared by create and edit, run inside the caller's transaction.
async fn check_attachments(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Id,
    tag_ids: Option<&[Id]>,
    image_ids: Option<&[Id]>,
    file_ids: Option<&[Id]>,
) -> RepoResult<()> {
    if let Some(tag_ids) = tag_ids {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
            .bind(tag_ids)
            .fetch_one(&mut **tx)
            .await?;
        if found != distinct(tag_ids).len() as i64 {
            return Err(RepoError::Validation("One or more tag Ids are invalid".into()));
        }
    }
    for (ids, image) in [(image_ids, true), (file_ids, false)] {
        let Some(ids) = ids else { continue };
        let ids = distinct(ids);
        let files = sqlx::query_as::<_, FileRecord>(&format!("SELECT {FILE_COLS} FROM files WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut **tx)
            .await?;
        if files.len() != ids.len() {
            let what = if image { "post image" } else { "post file" };
            return Err(RepoError::Validation(format!("One or more {what} Ids are invalid")));
        }
        for file in &files {
            if file.owner_id != owner_id {
                return Err(RepoError::Forbidden(format!("You don't own file with Id {}", file.id)));
            }
            if image && !file.is_image() {
                return Err(RepoError::Validation(format!("File with Id {} is not an image", file.id)));
            }
        }
    }
    Ok(())
}

async fn replace_assoc(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    column: &str,
    post_id: Id,
    ids: &[Id],
) -> RepoResult<()> {
    sqlx::query(&format!("DELETE FROM {table} WHERE post_id = $1"))
        .bind(post_id)
        .execute(&mut **tx)
        .await?;
    if !ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {table} (post_id, {column}) SELECT $1, unnest($2::BIGINT[]) ON CONFLICT DO NOTHING"
        ))
        .bind(post_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn distinct(ids: &[Id]) -> Vec<Id> {
    let mut v = ids.to_vec();
    v.sort_unstable();
    v.dedup();
    v
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (login, email, password_hash, language) VALUES ($1,$2,$3,$4) RETURNING {USER_COLS}"
        ))
        .bind(&new.login)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.language)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        Ok(sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn find_user_by_login(&self, login: &str) -> RepoResult<User> {
        Ok(sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE login = $1"))
            .bind(login)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        Ok(sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET login = COALESCE($2, login), email = COALESCE($3, email) WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(upd.login.as_ref())
        .bind(upd.email.as_ref())
        .fetch_one(&self.pool)
        .await?)
    }
    async fn set_password(&self, id: Id, password_hash: String) -> RepoResult<()> {
        let r = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn set_language(&self, id: Id, language: Language) -> RepoResult<()> {
        let r = sqlx::query("UPDATE users SET language = $2 WHERE id = $1")
            .bind(id)
            .bind(language)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn mark_verified(&self, id: Id) -> RepoResult<()> {
        let r = sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn set_user_logo(&self, id: Id, logo_id: Option<Id>) -> RepoResult<()> {
        let r = sqlx::query("UPDATE users SET logo_id = $2 WHERE id = $1")
            .bind(id)
            .bind(logo_id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE channels SET subs_count = GREATEST(subs_count - 1, 0)
             WHERE id IN (SELECT channel_id FROM subscriptions WHERE user_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let r = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *tx).await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        tx.commit().await?;
        Ok(())
    }
    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> RepoResult<SweptUsers> {
        let mut tx = self.pool.begin().await?;
        let stale: Vec<Id> = sqlx::query_scalar(
            "SELECT id FROM users WHERE is_verified = FALSE AND created_at < $1 FOR UPDATE",
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;
        if stale.is_empty() {
            return Ok(SweptUsers::default());
        }
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLS} FROM files WHERE owner_id = ANY($1)"
        ))
        .bind(&stale)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE channels c SET subs_count = GREATEST(c.subs_count - s.n, 0)
             FROM (SELECT channel_id, COUNT(*) AS n FROM subscriptions
                   WHERE user_id = ANY($1) GROUP BY channel_id) s
             WHERE c.id = s.channel_id",
        )
        .bind(&stale)
        .execute(&mut *tx)
        .await?;
        let r = sqlx::query("DELETE FROM users WHERE id = ANY($1)").bind(&stale).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(SweptUsers { users: r.rows_affected(), files })
    }
}

#[async_trait]
impl VerificationRepo for PgRepo {
    async fn replace_code(
        &self,
        user_id: Id,
        purpose: CodePurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<VerificationCode> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM verification_codes WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, VerificationCode>(
            "INSERT INTO verification_codes (user_id, code, purpose, expires_at) VALUES ($1,$2,$3,$4)
             RETURNING id, user_id, code, purpose, expires_at, created_at",
        )
        .bind(user_id)
        .bind(code)
        .bind(purpose)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }
    async fn find_active_code(
        &self,
        user_id: Option<Id>,
        purpose: CodePurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<VerificationCode> {
        Ok(sqlx::query_as::<_, VerificationCode>(
            "SELECT id, user_id, code, purpose, expires_at, created_at FROM verification_codes
             WHERE code = $1 AND purpose = $2 AND expires_at > $3 AND ($4::BIGINT IS NULL OR user_id = $4)
             ORDER BY id DESC LIMIT 1",
        )
        .bind(code)
        .bind(purpose)
        .bind(now)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }
    async fn delete_code(&self, id: Id) -> RepoResult<()> {
        let r = sqlx::query("DELETE FROM verification_codes WHERE id = $1").bind(id).execute(&self.pool).await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let r = sqlx::query("DELETE FROM verification_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}

#[async_trait]
impl TaxonomyRepo for PgRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, color FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?)
    }
    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, color FROM categories WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        Ok(sqlx::query_as::<_, Tag>(
            "SELECT t.id, t.category_id, t.name, c.color FROM tags t JOIN categories c ON c.id = t.category_id ORDER BY t.id",
        )
        .fetch_all(&self.pool)
        .await?)
    }
    async fn tags_for_post(&self, post_id: Id) -> RepoResult<Vec<Tag>> {
        Ok(sqlx::query_as::<_, Tag>(
            "SELECT t.id, t.category_id, t.name, c.color FROM post_tags pt
             JOIN tags t ON t.id = pt.tag_id
             JOIN categories c ON c.id = t.category_id
             WHERE pt.post_id = $1 ORDER BY t.id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ChannelRepo for PgRepo {
    async fn create_channel(&self, new: NewChannel) -> RepoResult<Channel> {
        Ok(sqlx::query_as::<_, Channel>(&format!(
            "INSERT INTO channels (name, description, category_id, owner_id) VALUES ($1,$2,$3,$4) RETURNING {CHANNEL_COLS}"
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.category_id)
        .bind(new.owner_id)
        .fetch_one(&self.pool)
        .await?)
    }
    async fn get_channel(&self, id: Id) -> RepoResult<Channel> {
        Ok(sqlx::query_as::<_, Channel>(&format!("SELECT {CHANNEL_COLS} FROM channels WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn update_channel(&self, id: Id, upd: UpdateChannel) -> RepoResult<Channel> {
        // $4 distinguishes "leave category" from "set category to $5 (possibly NULL)"
        Ok(sqlx::query_as::<_, Channel>(&format!(
            "UPDATE channels SET name = COALESCE($2, name), description = COALESCE($3, description),
                 category_id = CASE WHEN $4 THEN $5 ELSE category_id END
             WHERE id = $1 RETURNING {CHANNEL_COLS}"
        ))
        .bind(id)
        .bind(upd.name.as_ref())
        .bind(upd.description.as_ref())
        .bind(upd.category_id.is_some())
        .bind(upd.category_id.flatten())
        .fetch_one(&self.pool)
        .await?)
    }
    async fn delete_channel(&self, id: Id) -> RepoResult<()> {
        let r = sqlx::query("DELETE FROM channels WHERE id = $1").bind(id).execute(&self.pool).await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn list_owned_channels(&self, owner_id: Id) -> RepoResult<Vec<Channel>> {
        Ok(sqlx::query_as::<_, Channel>(&format!("SELECT {CHANNEL_COLS} FROM channels WHERE owner_id = $1 ORDER BY id"))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }
    async fn list_subscribed_channels(&self, user_id: Id) -> RepoResult<Vec<Channel>> {
        Ok(sqlx::query_as::<_, Channel>(
            "SELECT c.id, c.name, c.description, c.category_id, c.owner_id, c.subs_count, c.logo_id, c.created_at
             FROM channels c JOIN subscriptions s ON s.channel_id = c.id
             WHERE s.user_id = $1 ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }
    async fn list_popular_channels(&self, limit: i64) -> RepoResult<Vec<Channel>> {
        Ok(sqlx::query_as::<_, Channel>(&format!(
            "SELECT {CHANNEL_COLS} FROM channels ORDER BY subs_count DESC, id ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
    async fn list_channel_ids(&self) -> RepoResult<Vec<Id>> {
        Ok(sqlx::query_scalar("SELECT id FROM channels ORDER BY id").fetch_all(&self.pool).await?)
    }
    async fn set_channel_logo(&self, id: Id, logo_id: Option<Id>) -> RepoResult<()> {
        let r = sqlx::query("UPDATE channels SET logo_id = $2 WHERE id = $1")
            .bind(id)
            .bind(logo_id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepo for PgRepo {
    async fn subscribe(&self, user_id: Id, channel_id: Id) -> RepoResult<()> {
        sqlx::query("INSERT INTO subscriptions (user_id, channel_id) VALUES ($1,$2)")
            .bind(user_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
    async fn unsubscribe(&self, user_id: Id, channel_id: Id) -> RepoResult<()> {
        let r = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND channel_id = $2")
            .bind(user_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl CounterRepo for PgRepo {
    async fn adjust_subscribers(&self, channel_id: Id, delta: i64) -> RepoResult<()> {
        let r = sqlx::query("UPDATE channels SET subs_count = GREATEST(subs_count + $2, 0) WHERE id = $1")
            .bind(channel_id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn increment_views(&self, post_id: Id) -> RepoResult<()> {
        let r = sqlx::query("UPDATE posts SET views_count = views_count + 1 WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn reconcile_reaction_counts(&self, channel_id: Id) -> RepoResult<()> {
        sqlx::query(
            "UPDATE posts p SET
                 likes_count = (SELECT COUNT(*) FROM post_reactions r WHERE r.post_id = p.id AND r.reaction),
                 dislikes_count = (SELECT COUNT(*) FROM post_reactions r WHERE r.post_id = p.id AND NOT r.reaction)
             WHERE p.channel_id = $1",
        )
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let mut tx = self.pool.begin().await?;
        let post = sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (channel_id, preview_image_id, title, content) VALUES ($1,$2,$3,$4) RETURNING {POST_COLS}"
        ))
        .bind(new.channel_id)
        .bind(new.preview_image_id)
        .bind(&new.title)
        .bind(&new.content)
        .fetch_one(&mut *tx)
        .await?;
        check_attachments(&mut tx, new.owner_id, Some(&new.tag_ids), Some(&new.image_ids), Some(&new.file_ids)).await?;
        replace_assoc(&mut tx, "post_tags", "tag_id", post.id, &new.tag_ids).await?;
        replace_assoc(&mut tx, "post_images", "file_id", post.id, &new.image_ids).await?;
        replace_assoc(&mut tx, "post_files", "file_id", post.id, &new.file_ids).await?;
        tx.commit().await?;
        Ok(post)
    }
    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        Ok(sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        let mut tx = self.pool.begin().await?;
        let post = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content),
                 preview_image_id = COALESCE($4, preview_image_id)
             WHERE id = $1 RETURNING {POST_COLS}"
        ))
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.content.as_ref())
        .bind(upd.preview_image_id)
        .fetch_one(&mut *tx)
        .await?;
        check_attachments(
            &mut tx,
            upd.owner_id,
            upd.tag_ids.as_deref(),
            upd.image_ids.as_deref(),
            upd.file_ids.as_deref(),
        )
        .await?;
        if let Some(ref ids) = upd.tag_ids { replace_assoc(&mut tx, "post_tags", "tag_id", id, ids).await?; }
        if let Some(ref ids) = upd.image_ids { replace_assoc(&mut tx, "post_images", "file_id", id, ids).await?; }
        if let Some(ref ids) = upd.file_ids { replace_assoc(&mut tx, "post_files", "file_id", id, ids).await?; }
        tx.commit().await?;
        Ok(post)
    }
    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let r = sqlx::query("DELETE FROM posts WHERE id = $1").bind(id).execute(&self.pool).await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn list_channel_posts(&self, channel_id: Id, offset: i64, limit: i64) -> RepoResult<Vec<Post>> {
        Ok(sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLS} FROM posts WHERE channel_id = $1 ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(channel_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
    async fn post_images(&self, post_id: Id) -> RepoResult<Vec<FileRecord>> {
        Ok(sqlx::query_as::<_, FileRecord>(
            "SELECT f.id, f.owner_id, f.filename, f.mime_type, f.created_at
             FROM post_images pi JOIN files f ON f.id = pi.file_id WHERE pi.post_id = $1 ORDER BY f.id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }
    async fn post_files(&self, post_id: Id) -> RepoResult<Vec<FileRecord>> {
        Ok(sqlx::query_as::<_, FileRecord>(
            "SELECT f.id, f.owner_id, f.filename, f.mime_type, f.created_at
             FROM post_files pf JOIN files f ON f.id = pf.file_id WHERE pf.post_id = $1 ORDER BY f.id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }
    async fn ranked_post_ids(
        &self,
        since: DateTime<Utc>,
        weights: RankingWeights,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Id>> {
        Ok(sqlx::query_scalar(
            "SELECT p.id FROM posts p
             LEFT JOIN (SELECT post_id, COUNT(*) AS n FROM comments GROUP BY post_id) c ON c.post_id = p.id
             WHERE p.created_at >= $1
             ORDER BY (p.views_count * $2 + p.likes_count * $3 + p.dislikes_count * $4 + COALESCE(c.n, 0) * $5) DESC,
                      p.id DESC
             OFFSET $6 LIMIT $7",
        )
        .bind(since)
        .bind(weights.views)
        .bind(weights.likes)
        .bind(weights.dislikes)
        .bind(weights.comments)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
    async fn get_posts_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Post>> {
        Ok(sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl ReactionRepo for PgRepo {
    async fn get_reaction(&self, user_id: Id, post_id: Id) -> RepoResult<Option<PostReaction>> {
        Ok(sqlx::query_as::<_, PostReaction>(
            "SELECT post_id, user_id, reaction FROM post_reactions WHERE user_id = $1 AND post_id = $2",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?)
    }
    async fn insert_reaction(&self, user_id: Id, post_id: Id, like: bool) -> RepoResult<()> {
        sqlx::query("INSERT INTO post_reactions (post_id, user_id, reaction) VALUES ($1,$2,$3)")
            .bind(post_id)
            .bind(user_id)
            .bind(like)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
    async fn update_reaction(&self, user_id: Id, post_id: Id, like: bool) -> RepoResult<()> {
        let r = sqlx::query("UPDATE post_reactions SET reaction = $3 WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .bind(like)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn delete_reaction(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
        let r = sqlx::query("DELETE FROM post_reactions WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        Ok(sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (post_id, parent_id, user_id, content) VALUES ($1,$2,$3,$4)
             RETURNING id, post_id, parent_id, user_id, content, is_deleted, created_at",
        )
        .bind(new.post_id)
        .bind(new.parent_id)
        .bind(new.user_id)
        .bind(&new.content)
        .fetch_one(&self.pool)
        .await?)
    }
    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        Ok(sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, parent_id, user_id, content, is_deleted, created_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?)
    }
    async fn count_replies(&self, id: Id) -> RepoResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn redact_comment(&self, id: Id) -> RepoResult<()> {
        let r = sqlx::query("UPDATE comments SET is_deleted = TRUE, content = '' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        let r = sqlx::query("DELETE FROM comments WHERE id = $1").bind(id).execute(&self.pool).await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn list_comments(
        &self,
        post_id: Id,
        parent_id: Option<Id>,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<CommentView>> {
        Ok(sqlx::query_as::<_, CommentView>(
            "SELECT c.id, c.post_id, c.parent_id, c.user_id, c.content, c.is_deleted, c.created_at,
                    (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id) AS replies_count,
                    u.login AS author_login, u.logo_id AS author_logo_id, f.filename AS author_logo_key
             FROM comments c
             JOIN users u ON u.id = c.user_id
             LEFT JOIN files f ON f.id = u.logo_id
             WHERE c.post_id = $1 AND c.parent_id IS NOT DISTINCT FROM $2
             ORDER BY c.created_at ASC, c.id ASC
             OFFSET $3 LIMIT $4",
        )
        .bind(post_id)
        .bind(parent_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl FileRepo for PgRepo {
    async fn create_file(&self, new: NewFileRecord) -> RepoResult<FileRecord> {
        Ok(sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files (owner_id, filename, mime_type) VALUES ($1,$2,$3) RETURNING {FILE_COLS}"
        ))
        .bind(new.owner_id)
        .bind(&new.filename)
        .bind(&new.mime_type)
        .fetch_one(&self.pool)
        .await?)
    }
    async fn get_file(&self, id: Id) -> RepoResult<FileRecord> {
        Ok(sqlx::query_as::<_, FileRecord>(&format!("SELECT {FILE_COLS} FROM files WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
    async fn delete_file_record(&self, id: Id) -> RepoResult<()> {
        // slots and join rows are cleared by ON DELETE SET NULL / CASCADE
        let r = sqlx::query("DELETE FROM files WHERE id = $1").bind(id).execute(&self.pool).await?;
        if r.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
    async fn list_user_files(&self, owner_id: Id) -> RepoResult<Vec<FileRecord>> {
        Ok(sqlx::query_as::<_, FileRecord>(&format!("SELECT {FILE_COLS} FROM files WHERE owner_id = $1 ORDER BY id"))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }
    async fn file_is_referenced(&self, id: Id) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE logo_id = $1)
                 OR EXISTS (SELECT 1 FROM channels WHERE logo_id = $1)
                 OR EXISTS (SELECT 1 FROM posts WHERE preview_image_id = $1)
                 OR EXISTS (SELECT 1 FROM post_images WHERE file_id = $1)
                 OR EXISTS (SELECT 1 FROM post_files WHERE file_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    views: i64,
    likes: i64,
    dislikes: i64,
    posts: i64,
    comments: i64,
}

#[async_trait]
impl StatisticsRepo for PgRepo {
    async fn channel_counters(&self, channel_id: Id) -> RepoResult<StatCounters> {
        let row = sqlx::query_as::<_, CounterRow>(
            "SELECT COALESCE(SUM(p.views_count), 0)::BIGINT AS views,
                    COALESCE(SUM(p.likes_count), 0)::BIGINT AS likes,
                    COALESCE(SUM(p.dislikes_count), 0)::BIGINT AS dislikes,
                    COUNT(p.id) AS posts,
                    (SELECT COUNT(*) FROM comments c JOIN posts cp ON cp.id = c.post_id WHERE cp.channel_id = $1) AS comments
             FROM posts p WHERE p.channel_id = $1",
        )
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(StatCounters {
            views: row.views,
            likes: row.likes,
            dislikes: row.dislikes,
            posts: row.posts,
            comments: row.comments,
        })
    }
    async fn replace_snapshot(
        &self,
        channel_id: Id,
        date: NaiveDate,
        counters: StatCounters,
    ) -> RepoResult<ChannelStatistics> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM channel_statistics WHERE channel_id = $1 AND date = $2")
            .bind(channel_id)
            .bind(date)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, ChannelStatistics>(
            "INSERT INTO channel_statistics (channel_id, date, views, likes, dislikes, posts, comments)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             RETURNING id, channel_id, date, views, likes, dislikes, posts, comments",
        )
        .bind(channel_id)
        .bind(date)
        .bind(counters.views)
        .bind(counters.likes)
        .bind(counters.dislikes)
        .bind(counters.posts)
        .bind(counters.comments)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }
    async fn get_snapshot(&self, channel_id: Id, date: NaiveDate) -> RepoResult<Option<ChannelStatistics>> {
        Ok(sqlx::query_as::<_, ChannelStatistics>(
            "SELECT id, channel_id, date, views, likes, dislikes, posts, comments
             FROM channel_statistics WHERE channel_id = $1 AND date = $2",
        )
        .bind(channel_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?)
    }
}
