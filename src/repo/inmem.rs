use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::*;

#[derive(Debug, Clone)]
struct TagRow {
    id: Id,
    category_id: Id,
    name: String,
}

#[derive(Default)]
struct State {
    users: HashMap<Id, User>,
    codes: HashMap<Id, VerificationCode>,
    categories: HashMap<Id, Category>,
    tags: HashMap<Id, TagRow>,
    channels: HashMap<Id, Channel>,
    subscriptions: HashSet<(Id, Id)>, // (user, channel)
    posts: HashMap<Id, Post>,
    post_tags: HashMap<Id, Vec<Id>>,
    post_images: HashMap<Id, Vec<Id>>,
    post_files: HashMap<Id, Vec<Id>>,
    reactions: HashMap<(Id, Id), bool>, // (user, post) -> like
    comments: HashMap<Id, Comment>,
    files: HashMap<Id, FileRecord>,
    stats: HashMap<(Id, NaiveDate), ChannelStatistics>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn tag(&self, row: &TagRow) -> Tag {
        let color = self
            .categories
            .get(&row.category_id)
            .map(|c| c.color.clone())
            .unwrap_or_default();
        Tag { id: row.id, category_id: row.category_id, name: row.name.clone(), color }
    }

    fn files_by_ids(&self, ids: Option<&Vec<Id>>) -> Vec<FileRecord> {
        ids.map(|ids| ids.iter().filter_map(|id| self.files.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Same checks the Postgres transaction runs before attaching anything.
    fn check_attachments(
        &self,
        owner_id: Id,
        tag_ids: Option<&[Id]>,
        image_ids: Option<&[Id]>,
        file_ids: Option<&[Id]>,
    ) -> RepoResult<()> {
        if let Some(tag_ids) = tag_ids {
            if tag_ids.iter().any(|id| !self.tags.contains_key(id)) {
                return Err(RepoError::Validation("One or more tag Ids are invalid".into()));
            }
        }
        if let Some(image_ids) = image_ids {
            for id in image_ids {
                let file = self
                    .files
                    .get(id)
                    .ok_or_else(|| RepoError::Validation("One or more post image Ids are invalid".into()))?;
                check_attachment(file, owner_id, true)?;
            }
        }
        if let Some(file_ids) = file_ids {
            for id in file_ids {
                let file = self
                    .files
                    .get(id)
                    .ok_or_else(|| RepoError::Validation("One or more post file Ids are invalid".into()))?;
                check_attachment(file, owner_id, false)?;
            }
        }
        Ok(())
    }

    fn remove_comment_tree(&mut self, id: Id) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.comments.remove(&current).is_some() {
                stack.extend(
                    self.comments
                        .values()
                        .filter(|c| c.parent_id == Some(current))
                        .map(|c| c.id),
                );
            }
        }
    }

    fn remove_post(&mut self, id: Id) {
        self.posts.remove(&id);
        self.post_tags.remove(&id);
        self.post_images.remove(&id);
        self.post_files.remove(&id);
        self.reactions.retain(|(_, post_id), _| *post_id != id);
        self.comments.retain(|_, c| c.post_id != id);
    }

    fn remove_channel(&mut self, id: Id) {
        let posts: Vec<Id> = self.posts.values().filter(|p| p.channel_id == id).map(|p| p.id).collect();
        for post_id in posts {
            self.remove_post(post_id);
        }
        self.subscriptions.retain(|(_, channel_id)| *channel_id != id);
        self.stats.retain(|(channel_id, _), _| *channel_id != id);
        self.channels.remove(&id);
    }

    fn remove_file(&mut self, id: Id) {
        for user in self.users.values_mut() {
            if user.logo_id == Some(id) { user.logo_id = None; }
        }
        for channel in self.channels.values_mut() {
            if channel.logo_id == Some(id) { channel.logo_id = None; }
        }
        for post in self.posts.values_mut() {
            if post.preview_image_id == Some(id) { post.preview_image_id = None; }
        }
        for ids in self.post_images.values_mut().chain(self.post_files.values_mut()) {
            ids.retain(|f| *f != id);
        }
        self.files.remove(&id);
    }

    fn remove_user(&mut self, id: Id) {
        self.codes.retain(|_, c| c.user_id != id);
        let owned: Vec<Id> = self.channels.values().filter(|c| c.owner_id == id).map(|c| c.id).collect();
        for channel_id in owned {
            self.remove_channel(channel_id);
        }
        let authored: Vec<Id> = self.comments.values().filter(|c| c.user_id == id).map(|c| c.id).collect();
        for comment_id in authored {
            self.remove_comment_tree(comment_id);
        }
        self.reactions.retain(|(user_id, _), _| *user_id != id);
        let subscribed: Vec<Id> = self
            .subscriptions
            .iter()
            .filter(|(user_id, _)| *user_id == id)
            .map(|(_, channel_id)| *channel_id)
            .collect();
        for channel_id in subscribed {
            if let Some(channel) = self.channels.get_mut(&channel_id) {
                channel.subs_count = (channel.subs_count - 1).max(0);
            }
        }
        self.subscriptions.retain(|(user_id, _)| *user_id != id);
        let files: Vec<Id> = self.files.values().filter(|f| f.owner_id == id).map(|f| f.id).collect();
        for file_id in files {
            self.remove_file(file_id);
        }
        self.users.remove(&id);
    }

    fn replace_assoc(map: &mut HashMap<Id, Vec<Id>>, post_id: Id, ids: &[Id]) {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) { unique.push(*id); }
        }
        map.insert(post_id, unique);
    }
}

fn check_attachment(file: &FileRecord, owner_id: Id, image: bool) -> RepoResult<()> {
    if file.owner_id != owner_id {
        return Err(RepoError::Forbidden(format!("You don't own file with Id {}", file.id)));
    }
    if image && !file.is_image() {
        return Err(RepoError::Validation(format!("File with Id {} is not an image", file.id)));
    }
    Ok(())
}

/// Categories and tags every fresh store starts with; mirrors the seed migration.
const SEED_CATEGORIES: &[(Id, &str, &str)] = &[
    (1, "Личный блог", "#FF9800"),
    (2, "Технологии", "#2196F3"),
    (3, "Путешествия", "#4CAF50"),
];
const SEED_TAGS: &[(Id, Id, &str)] = &[
    (1, 1, "Мотивация"),
    (2, 1, "Дневник"),
    (3, 2, "Программирование"),
    (4, 2, "Гаджеты"),
    (5, 3, "Европа"),
    (6, 3, "Азия"),
];

#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        let mut state = State::default();
        for (id, name, color) in SEED_CATEGORIES {
            state.categories.insert(*id, Category { id: *id, name: name.to_string(), color: color.to_string() });
        }
        for (id, category_id, name) in SEED_TAGS {
            state.tags.insert(*id, TagRow { id: *id, category_id: *category_id, name: name.to_string() });
        }
        Self { state: Arc::new(RwLock::new(state)) }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shift a post's creation time; lets tests build posts outside the feed window.
    pub fn backdate_post(&self, post_id: Id, created_at: DateTime<Utc>) -> RepoResult<()> {
        let mut s = self.write();
        let post = s.posts.get_mut(&post_id).ok_or(RepoError::NotFound)?;
        post.created_at = created_at;
        Ok(())
    }

    /// Shift an account's creation time (cleanup sweep tests).
    pub fn backdate_user(&self, user_id: Id, created_at: DateTime<Utc>) -> RepoResult<()> {
        let mut s = self.write();
        let user = s.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        user.created_at = created_at;
        Ok(())
    }
}

impl Default for InMemRepo {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write();
        if s.users.values().any(|u| u.login == new.login || u.email == new.email) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let user = User {
            id,
            login: new.login,
            email: new.email,
            password_hash: new.password_hash,
            language: new.language,
            is_verified: false,
            logo_id: None,
            created_at: Utc::now(),
        };
        s.users.insert(id, user.clone());
        Ok(user)
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read().users.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn find_user_by_login(&self, login: &str) -> RepoResult<User> {
        self.read().users.values().find(|u| u.login == login).cloned().ok_or(RepoError::NotFound)
    }
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        self.read().users.values().find(|u| u.email == email).cloned().ok_or(RepoError::NotFound)
    }
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let mut s = self.write();
        let taken = s.users.values().any(|u| {
            u.id != id
                && (upd.login.as_deref() == Some(u.login.as_str())
                    || upd.email.as_deref() == Some(u.email.as_str()))
        });
        if taken {
            return Err(RepoError::Conflict);
        }
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(login) = upd.login { user.login = login; }
        if let Some(email) = upd.email { user.email = email; }
        Ok(user.clone())
    }
    async fn set_password(&self, id: Id, password_hash: String) -> RepoResult<()> {
        let mut s = self.write();
        s.users.get_mut(&id).ok_or(RepoError::NotFound)?.password_hash = password_hash;
        Ok(())
    }
    async fn set_language(&self, id: Id, language: Language) -> RepoResult<()> {
        let mut s = self.write();
        s.users.get_mut(&id).ok_or(RepoError::NotFound)?.language = language;
        Ok(())
    }
    async fn mark_verified(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        s.users.get_mut(&id).ok_or(RepoError::NotFound)?.is_verified = true;
        Ok(())
    }
    async fn set_user_logo(&self, id: Id, logo_id: Option<Id>) -> RepoResult<()> {
        let mut s = self.write();
        if logo_id.is_some_and(|f| !s.files.contains_key(&f)) {
            return Err(RepoError::NotFound);
        }
        s.users.get_mut(&id).ok_or(RepoError::NotFound)?.logo_id = logo_id;
        Ok(())
    }
    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        if !s.users.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        s.remove_user(id);
        Ok(())
    }
    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> RepoResult<SweptUsers> {
        let mut s = self.write();
        let stale: Vec<Id> = s
            .users
            .values()
            .filter(|u| !u.is_verified && u.created_at < cutoff)
            .map(|u| u.id)
            .collect();
        let files: Vec<FileRecord> = s.files.values().filter(|f| stale.contains(&f.owner_id)).cloned().collect();
        for id in &stale {
            s.remove_user(*id);
        }
        Ok(SweptUsers { users: stale.len() as u64, files })
    }
}

#[async_trait]
impl VerificationRepo for InMemRepo {
    async fn replace_code(
        &self,
        user_id: Id,
        purpose: CodePurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<VerificationCode> {
        let mut s = self.write();
        if !s.users.contains_key(&user_id) {
            return Err(RepoError::NotFound);
        }
        s.codes.retain(|_, c| !(c.user_id == user_id && c.purpose == purpose));
        let id = s.next_id();
        let row = VerificationCode {
            id,
            user_id,
            code: code.to_string(),
            purpose,
            expires_at,
            created_at: Utc::now(),
        };
        s.codes.insert(id, row.clone());
        Ok(row)
    }
    async fn find_active_code(
        &self,
        user_id: Option<Id>,
        purpose: CodePurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<VerificationCode> {
        self.read()
            .codes
            .values()
            .find(|c| {
                c.code == code
                    && c.purpose == purpose
                    && c.expires_at > now
                    && user_id.map_or(true, |u| c.user_id == u)
            })
            .cloned()
            .ok_or(RepoError::NotFound)
    }
    async fn delete_code(&self, id: Id) -> RepoResult<()> {
        self.write().codes.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }
    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut s = self.write();
        let before = s.codes.len();
        s.codes.retain(|_, c| c.expires_at > now);
        Ok((before - s.codes.len()) as u64)
    }
}

#[async_trait]
impl TaxonomyRepo for InMemRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let mut v: Vec<_> = self.read().categories.values().cloned().collect();
        v.sort_by_key(|c| c.id);
        Ok(v)
    }
    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.read().categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let s = self.read();
        let mut v: Vec<_> = s.tags.values().map(|t| s.tag(t)).collect();
        v.sort_by_key(|t| t.id);
        Ok(v)
    }
    async fn tags_for_post(&self, post_id: Id) -> RepoResult<Vec<Tag>> {
        let s = self.read();
        let mut v: Vec<_> = s
            .post_tags
            .get(&post_id)
            .map(|ids| ids.iter().filter_map(|id| s.tags.get(id)).map(|t| s.tag(t)).collect())
            .unwrap_or_default();
        v.sort_by_key(|t: &Tag| t.id);
        Ok(v)
    }
}

#[async_trait]
impl ChannelRepo for InMemRepo {
    async fn create_channel(&self, new: NewChannel) -> RepoResult<Channel> {
        let mut s = self.write();
        if s.channels.values().any(|c| c.name == new.name) {
            return Err(RepoError::Conflict);
        }
        if !s.users.contains_key(&new.owner_id)
            || new.category_id.is_some_and(|c| !s.categories.contains_key(&c))
        {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let channel = Channel {
            id,
            name: new.name,
            description: new.description,
            category_id: new.category_id,
            owner_id: new.owner_id,
            subs_count: 0,
            logo_id: None,
            created_at: Utc::now(),
        };
        s.channels.insert(id, channel.clone());
        Ok(channel)
    }
    async fn get_channel(&self, id: Id) -> RepoResult<Channel> {
        self.read().channels.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn update_channel(&self, id: Id, upd: UpdateChannel) -> RepoResult<Channel> {
        let mut s = self.write();
        if let Some(ref name) = upd.name {
            if s.channels.values().any(|c| c.name == *name && c.id != id) {
                return Err(RepoError::Conflict);
            }
        }
        if let Some(Some(category_id)) = upd.category_id {
            if !s.categories.contains_key(&category_id) {
                return Err(RepoError::NotFound);
            }
        }
        let channel = s.channels.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name { channel.name = name; }
        if let Some(description) = upd.description { channel.description = description; }
        if let Some(category_id) = upd.category_id { channel.category_id = category_id; }
        Ok(channel.clone())
    }
    async fn delete_channel(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        if !s.channels.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        s.remove_channel(id);
        Ok(())
    }
    async fn list_owned_channels(&self, owner_id: Id) -> RepoResult<Vec<Channel>> {
        let mut v: Vec<_> = self.read().channels.values().filter(|c| c.owner_id == owner_id).cloned().collect();
        v.sort_by_key(|c| c.id);
        Ok(v)
    }
    async fn list_subscribed_channels(&self, user_id: Id) -> RepoResult<Vec<Channel>> {
        let s = self.read();
        let mut v: Vec<_> = s
            .subscriptions
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, c)| s.channels.get(c).cloned())
            .collect();
        v.sort_by_key(|c| c.id);
        Ok(v)
    }
    async fn list_popular_channels(&self, limit: i64) -> RepoResult<Vec<Channel>> {
        let mut v: Vec<_> = self.read().channels.values().cloned().collect();
        v.sort_by(|a, b| b.subs_count.cmp(&a.subs_count).then(a.id.cmp(&b.id)));
        v.truncate(limit.max(0) as usize);
        Ok(v)
    }
    async fn list_channel_ids(&self) -> RepoResult<Vec<Id>> {
        let mut v: Vec<_> = self.read().channels.keys().copied().collect();
        v.sort_unstable();
        Ok(v)
    }
    async fn set_channel_logo(&self, id: Id, logo_id: Option<Id>) -> RepoResult<()> {
        let mut s = self.write();
        if logo_id.is_some_and(|f| !s.files.contains_key(&f)) {
            return Err(RepoError::NotFound);
        }
        s.channels.get_mut(&id).ok_or(RepoError::NotFound)?.logo_id = logo_id;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepo for InMemRepo {
    async fn subscribe(&self, user_id: Id, channel_id: Id) -> RepoResult<()> {
        let mut s = self.write();
        if !s.channels.contains_key(&channel_id) || !s.users.contains_key(&user_id) {
            return Err(RepoError::NotFound);
        }
        if !s.subscriptions.insert((user_id, channel_id)) {
            return Err(RepoError::Conflict);
        }
        Ok(())
    }
    async fn unsubscribe(&self, user_id: Id, channel_id: Id) -> RepoResult<()> {
        if self.write().subscriptions.remove(&(user_id, channel_id)) {
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }
}

#[async_trait]
impl CounterRepo for InMemRepo {
    async fn adjust_subscribers(&self, channel_id: Id, delta: i64) -> RepoResult<()> {
        let mut s = self.write();
        let channel = s.channels.get_mut(&channel_id).ok_or(RepoError::NotFound)?;
        channel.subs_count = (channel.subs_count + delta).max(0);
        Ok(())
    }
    async fn increment_views(&self, post_id: Id) -> RepoResult<()> {
        let mut s = self.write();
        s.posts.get_mut(&post_id).ok_or(RepoError::NotFound)?.views_count += 1;
        Ok(())
    }
    async fn reconcile_reaction_counts(&self, channel_id: Id) -> RepoResult<()> {
        let mut s = self.write();
        let mut tally: HashMap<Id, (i64, i64)> = HashMap::new();
        for ((_, post_id), like) in &s.reactions {
            let entry = tally.entry(*post_id).or_default();
            if *like { entry.0 += 1 } else { entry.1 += 1 }
        }
        for post in s.posts.values_mut().filter(|p| p.channel_id == channel_id) {
            let (likes, dislikes) = tally.get(&post.id).copied().unwrap_or_default();
            post.likes_count = likes;
            post.dislikes_count = dislikes;
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let mut s = self.write();
        if !s.channels.contains_key(&new.channel_id) {
            return Err(RepoError::NotFound);
        }
        if s.posts.values().any(|p| p.channel_id == new.channel_id && p.title == new.title) {
            return Err(RepoError::Conflict);
        }
        s.check_attachments(
            new.owner_id,
            Some(&new.tag_ids),
            Some(&new.image_ids),
            Some(&new.file_ids),
        )?;
        let id = s.next_id();
        let post = Post {
            id,
            channel_id: new.channel_id,
            preview_image_id: new.preview_image_id,
            title: new.title,
            content: new.content,
            likes_count: 0,
            dislikes_count: 0,
            views_count: 0,
            created_at: Utc::now(),
        };
        s.posts.insert(id, post.clone());
        State::replace_assoc(&mut s.post_tags, id, &new.tag_ids);
        State::replace_assoc(&mut s.post_images, id, &new.image_ids);
        State::replace_assoc(&mut s.post_files, id, &new.file_ids);
        Ok(post)
    }
    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        self.read().posts.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        let mut s = self.write();
        let current = s.posts.get(&id).cloned().ok_or(RepoError::NotFound)?;
        if let Some(ref title) = upd.title {
            if s.posts.values().any(|p| p.channel_id == current.channel_id && p.title == *title && p.id != id) {
                return Err(RepoError::Conflict);
            }
        }
        s.check_attachments(
            upd.owner_id,
            upd.tag_ids.as_deref(),
            upd.image_ids.as_deref(),
            upd.file_ids.as_deref(),
        )?;
        if let Some(ref tag_ids) = upd.tag_ids { State::replace_assoc(&mut s.post_tags, id, tag_ids); }
        if let Some(ref image_ids) = upd.image_ids { State::replace_assoc(&mut s.post_images, id, image_ids); }
        if let Some(ref file_ids) = upd.file_ids { State::replace_assoc(&mut s.post_files, id, file_ids); }
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(title) = upd.title { post.title = title; }
        if let Some(content) = upd.content { post.content = content; }
        if let Some(preview) = upd.preview_image_id { post.preview_image_id = Some(preview); }
        Ok(post.clone())
    }
    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        if !s.posts.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        s.remove_post(id);
        Ok(())
    }
    async fn list_channel_posts(&self, channel_id: Id, offset: i64, limit: i64) -> RepoResult<Vec<Post>> {
        let mut v: Vec<_> = self.read().posts.values().filter(|p| p.channel_id == channel_id).cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(v.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
    }
    async fn post_images(&self, post_id: Id) -> RepoResult<Vec<FileRecord>> {
        let s = self.read();
        Ok(s.files_by_ids(s.post_images.get(&post_id)))
    }
    async fn post_files(&self, post_id: Id) -> RepoResult<Vec<FileRecord>> {
        let s = self.read();
        Ok(s.files_by_ids(s.post_files.get(&post_id)))
    }
    async fn ranked_post_ids(
        &self,
        since: DateTime<Utc>,
        weights: RankingWeights,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Id>> {
        let s = self.read();
        let mut comment_counts: HashMap<Id, i64> = HashMap::new();
        for c in s.comments.values() {
            *comment_counts.entry(c.post_id).or_default() += 1;
        }
        let mut rated: Vec<(i64, Id)> = s
            .posts
            .values()
            .filter(|p| p.created_at >= since)
            .map(|p| {
                let comments = comment_counts.get(&p.id).copied().unwrap_or(0);
                (rating(&weights, p.views_count, p.likes_count, p.dislikes_count, comments), p.id)
            })
            .collect();
        rated.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(rated
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }
    async fn get_posts_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Post>> {
        let s = self.read();
        Ok(ids.iter().filter_map(|id| s.posts.get(id).cloned()).collect())
    }
}

#[async_trait]
impl ReactionRepo for InMemRepo {
    async fn get_reaction(&self, user_id: Id, post_id: Id) -> RepoResult<Option<PostReaction>> {
        Ok(self
            .read()
            .reactions
            .get(&(user_id, post_id))
            .map(|like| PostReaction { post_id, user_id, reaction: *like }))
    }
    async fn insert_reaction(&self, user_id: Id, post_id: Id, like: bool) -> RepoResult<()> {
        let mut s = self.write();
        if !s.posts.contains_key(&post_id) || !s.users.contains_key(&user_id) {
            return Err(RepoError::NotFound);
        }
        if s.reactions.contains_key(&(user_id, post_id)) {
            return Err(RepoError::Conflict);
        }
        s.reactions.insert((user_id, post_id), like);
        Ok(())
    }
    async fn update_reaction(&self, user_id: Id, post_id: Id, like: bool) -> RepoResult<()> {
        let mut s = self.write();
        let slot = s.reactions.get_mut(&(user_id, post_id)).ok_or(RepoError::NotFound)?;
        *slot = like;
        Ok(())
    }
    async fn delete_reaction(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
        self.write()
            .reactions
            .remove(&(user_id, post_id))
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut s = self.write();
        if !s.posts.contains_key(&new.post_id) || !s.users.contains_key(&new.user_id) {
            return Err(RepoError::NotFound);
        }
        if new.parent_id.is_some_and(|p| !s.comments.contains_key(&p)) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let comment = Comment {
            id,
            post_id: new.post_id,
            parent_id: new.parent_id,
            user_id: new.user_id,
            content: new.content,
            is_deleted: false,
            created_at: Utc::now(),
        };
        s.comments.insert(id, comment.clone());
        Ok(comment)
    }
    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        self.read().comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn count_replies(&self, id: Id) -> RepoResult<i64> {
        Ok(self.read().comments.values().filter(|c| c.parent_id == Some(id)).count() as i64)
    }
    async fn redact_comment(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        comment.is_deleted = true;
        comment.content.clear();
        Ok(())
    }
    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        if !s.comments.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        s.remove_comment_tree(id);
        Ok(())
    }
    async fn list_comments(
        &self,
        post_id: Id,
        parent_id: Option<Id>,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<CommentView>> {
        let s = self.read();
        let mut v: Vec<&Comment> = s
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.parent_id == parent_id)
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v.into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|c| {
                let author = s.users.get(&c.user_id);
                let author_logo_id = author.and_then(|u| u.logo_id);
                CommentView {
                    id: c.id,
                    post_id: c.post_id,
                    parent_id: c.parent_id,
                    user_id: c.user_id,
                    content: c.content.clone(),
                    is_deleted: c.is_deleted,
                    created_at: c.created_at,
                    replies_count: s.comments.values().filter(|r| r.parent_id == Some(c.id)).count() as i64,
                    author_login: author.map(|u| u.login.clone()).unwrap_or_default(),
                    author_logo_id,
                    author_logo_key: author_logo_id.and_then(|f| s.files.get(&f)).map(|f| f.filename.clone()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl FileRepo for InMemRepo {
    async fn create_file(&self, new: NewFileRecord) -> RepoResult<FileRecord> {
        let mut s = self.write();
        if !s.users.contains_key(&new.owner_id) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let file = FileRecord {
            id,
            owner_id: new.owner_id,
            filename: new.filename,
            mime_type: new.mime_type,
            created_at: Utc::now(),
        };
        s.files.insert(id, file.clone());
        Ok(file)
    }
    async fn get_file(&self, id: Id) -> RepoResult<FileRecord> {
        self.read().files.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn delete_file_record(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write();
        if !s.files.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        s.remove_file(id);
        Ok(())
    }
    async fn list_user_files(&self, owner_id: Id) -> RepoResult<Vec<FileRecord>> {
        let mut v: Vec<_> = self.read().files.values().filter(|f| f.owner_id == owner_id).cloned().collect();
        v.sort_by_key(|f| f.id);
        Ok(v)
    }
    async fn file_is_referenced(&self, id: Id) -> RepoResult<bool> {
        let s = self.read();
        Ok(s.users.values().any(|u| u.logo_id == Some(id))
            || s.channels.values().any(|c| c.logo_id == Some(id))
            || s.posts.values().any(|p| p.preview_image_id == Some(id))
            || s.post_images.values().chain(s.post_files.values()).any(|ids| ids.contains(&id)))
    }
}

#[async_trait]
impl StatisticsRepo for InMemRepo {
    async fn channel_counters(&self, channel_id: Id) -> RepoResult<StatCounters> {
        let s = self.read();
        let mut counters = StatCounters::default();
        let mut post_ids = HashSet::new();
        for p in s.posts.values().filter(|p| p.channel_id == channel_id) {
            counters.views += p.views_count;
            counters.likes += p.likes_count;
            counters.dislikes += p.dislikes_count;
            counters.posts += 1;
            post_ids.insert(p.id);
        }
        counters.comments = s.comments.values().filter(|c| post_ids.contains(&c.post_id)).count() as i64;
        Ok(counters)
    }
    async fn replace_snapshot(
        &self,
        channel_id: Id,
        date: NaiveDate,
        counters: StatCounters,
    ) -> RepoResult<ChannelStatistics> {
        let mut s = self.write();
        if !s.channels.contains_key(&channel_id) {
            return Err(RepoError::NotFound);
        }
        s.stats.remove(&(channel_id, date));
        let id = s.next_id();
        let row = ChannelStatistics {
            id,
            channel_id,
            date,
            views: counters.views,
            likes: counters.likes,
            dislikes: counters.dislikes,
            posts: counters.posts,
            comments: counters.comments,
        };
        s.stats.insert((channel_id, date), row.clone());
        Ok(row)
    }
    async fn get_snapshot(&self, channel_id: Id, date: NaiveDate) -> RepoResult<Option<ChannelStatistics>> {
        Ok(self.read().stats.get(&(channel_id, date)).cloned())
    }
}

impl InMemRepo {
    /// Insert a historical snapshot row directly (statistics tests).
    pub fn put_snapshot(&self, channel_id: Id, date: NaiveDate, counters: StatCounters) {
        let mut s = self.write();
        let id = s.next_id();
        s.stats.insert(
            (channel_id, date),
            ChannelStatistics {
                id,
                channel_id,
                date,
                views: counters.views,
                likes: counters.likes,
                dislikes: counters.dislikes,
                posts: counters.posts,
                comments: counters.comments,
            },
        );
    }
}
