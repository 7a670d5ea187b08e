use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::views::{channel_response, channel_responses, FileResponse};
use super::{ok_data, ok_message, positive_id, AppState};
use crate::attachments::{clear_slot, read_upload, release_previous, replace_slot, Slot};
use crate::auth::Auth;
use crate::error::{not_found_as, ApiError};
use crate::models::{Category, Channel, Id, NewChannel, Tag, UpdateChannel};
use crate::repo::{Repo, RepoError};
use crate::statistics::{channel_report, Period};

const DEFAULT_POPULAR_LIMIT: i64 = 10;
const MAX_POPULAR_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateChannelRequest {
    #[validate(length(min = 1, max = 255, message = "Channel name is required"))]
    pub name: String,
    #[validate(length(max = 4096))]
    pub description: String,
    pub category_id: Option<Id>,
}

/// Empty strings leave a field unchanged; `categoryId: 0` clears the category.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct EditChannelRequest {
    #[validate(range(min = 1, message = "Channel id is required"))]
    pub channel_id: Id,
    #[validate(length(max = 255))]
    pub name: String,
    #[validate(length(max = 4096))]
    pub description: String,
    pub category_id: Option<Id>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PopularQuery {
    /// Defaults to 10, at most 100.
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatisticsQuery {
    /// `day` (default), `week`, `month` or `year`.
    pub period: Option<String>,
}

/// Categories are checked up front, so a late `NotFound` is about the row named
/// by `missing`.
fn channel_write_error(missing: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::Conflict => ApiError::conflict("Channel with this name already exists"),
        RepoError::NotFound => ApiError::not_found(missing),
        other => other.into(),
    }
}

/// 0 means "no category".
async fn checked_category(repo: &dyn Repo, category_id: Id) -> Result<Option<Id>, ApiError> {
    if category_id == 0 {
        return Ok(None);
    }
    repo.get_category(category_id).await.map_err(not_found_as("Category not found"))?;
    Ok(Some(category_id))
}

/// The channel, provided the caller owns it.
async fn owned_channel(repo: &dyn Repo, user_id: Id, channel_id: Id) -> Result<Channel, ApiError> {
    let channel = repo.get_channel(channel_id).await.map_err(not_found_as("Channel not found"))?;
    if channel.owner_id != user_id {
        return Err(ApiError::forbidden("You are not the owner of this channel"));
    }
    Ok(channel)
}

#[utoipa::path(
    post,
    path = "/api/createChannel",
    request_body = CreateChannelRequest,
    responses(
        (status = 200, description = "Channel created", body = super::views::ChannelResponse),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Name taken")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_channel(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Json<CreateChannelRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("Channel name is required"));
    }
    req.validate()?;
    let repo = data.repo.as_ref();
    let category_id = match req.category_id {
        Some(id) => checked_category(repo, id).await?,
        None => None,
    };
    let channel = repo
        .create_channel(NewChannel { name, description: req.description, category_id, owner_id: auth.user_id })
        .await
        .map_err(channel_write_error("User not found"))?;
    tracing::info!(channel_id = channel.id, owner_id = auth.user_id, "channel created");
    Ok(ok_data(channel_response(repo, data.store.as_ref(), &channel).await?, "Channel created successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/editChannel",
    request_body = EditChannelRequest,
    responses(
        (status = 200, description = "Channel updated", body = super::views::ChannelResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Name taken")
    ),
    security(("bearer_auth" = []))
)]
pub async fn edit_channel(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Json<EditChannelRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    req.validate()?;
    let repo = data.repo.as_ref();
    owned_channel(repo, auth.user_id, req.channel_id).await?;
    let category_id = match req.category_id {
        Some(id) => Some(checked_category(repo, id).await?),
        None => None,
    };
    let name = req.name.trim();
    let upd = UpdateChannel {
        name: (!name.is_empty()).then(|| name.to_string()),
        description: (!req.description.is_empty()).then_some(req.description),
        category_id,
    };
    let channel = repo
        .update_channel(req.channel_id, upd)
        .await
        .map_err(channel_write_error("Channel not found"))?;
    Ok(ok_data(channel_response(repo, data.store.as_ref(), &channel).await?, "Channel edited successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/deleteChannel/{id}",
    params(("id" = i64, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Channel deleted", body = super::MessageResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Channel not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_channel(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    let channel = owned_channel(repo, auth.user_id, channel_id).await?;
    repo.delete_channel(channel_id).await.map_err(not_found_as("Channel not found"))?;
    if let Some(logo_id) = channel.logo_id {
        if let Err(e) = release_previous(repo, store, logo_id).await {
            tracing::warn!(channel_id, logo_id, error = %e, "channel logo cleanup failed");
        }
    }
    tracing::info!(channel_id, "channel deleted");
    Ok(ok_message("Channel deleted successfully"))
}

#[utoipa::path(
    post,
    path = "/api/uploadChannelLogo/{id}",
    params(("id" = i64, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Logo replaced", body = FileResponse),
        (status = 400, description = "Not an image"),
        (status = 413, description = "Too large")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_channel_logo(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    data.throttle(|rl| rl.allow_upload(auth.user_id))?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    owned_channel(repo, auth.user_id, channel_id).await?;
    let upload = read_upload(payload, data.config.max_upload_bytes).await?;
    let file = replace_slot(repo, store, Slot::ChannelLogo(channel_id), auth.user_id, upload).await?;
    Ok(ok_data(FileResponse::new(&file, store), "Channel logo uploaded successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/deleteChannelLogo/{id}",
    params(("id" = i64, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Logo removed", body = super::MessageResponse),
        (status = 400, description = "No logo to delete")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_channel_logo(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let repo = data.repo.as_ref();
    owned_channel(repo, auth.user_id, channel_id).await?;
    clear_slot(repo, data.store.as_ref(), Slot::ChannelLogo(channel_id)).await?;
    Ok(ok_message("Channel logo deleted successfully"))
}

#[utoipa::path(
    get,
    path = "/api/getUserSubscriptions",
    responses((status = 200, description = "Channels the caller follows", body = [super::views::ChannelResponse])),
    security(("bearer_auth" = []))
)]
pub async fn get_user_subscriptions(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let repo = data.repo.as_ref();
    let channels = repo.list_subscribed_channels(auth.user_id).await?;
    let message = if channels.is_empty() { "No subscriptions found" } else { "" };
    Ok(ok_data(channel_responses(repo, data.store.as_ref(), &channels).await?, message))
}

#[utoipa::path(
    get,
    path = "/api/getUserChannels",
    responses((status = 200, description = "Channels the caller owns", body = [super::views::ChannelResponse])),
    security(("bearer_auth" = []))
)]
pub async fn get_user_channels(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let repo = data.repo.as_ref();
    let channels = repo.list_owned_channels(auth.user_id).await?;
    let message = if channels.is_empty() { "No channels found" } else { "" };
    Ok(ok_data(channel_responses(repo, data.store.as_ref(), &channels).await?, message))
}

#[utoipa::path(
    get,
    path = "/api/getChannel/{id}",
    params(("id" = i64, Path, description = "Channel id")),
    responses((status = 200, description = "Channel", body = super::views::ChannelResponse), (status = 404, description = "Channel not found"))
)]
pub async fn get_channel(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let repo = data.repo.as_ref();
    let channel = repo.get_channel(channel_id).await.map_err(not_found_as("Channel not found"))?;
    Ok(ok_data(channel_response(repo, data.store.as_ref(), &channel).await?, ""))
}

#[utoipa::path(
    get,
    path = "/api/getPopularChannels",
    params(PopularQuery),
    responses((status = 200, description = "Most subscribed first", body = [super::views::ChannelResponse]))
)]
pub async fn get_popular_channels(data: web::Data<AppState>, query: web::Query<PopularQuery>) -> Result<HttpResponse, ApiError> {
    let limit = match query.limit {
        None => DEFAULT_POPULAR_LIMIT,
        Some(n) if n >= 1 => n.min(MAX_POPULAR_LIMIT),
        Some(_) => return Err(ApiError::validation("Invalid limit value")),
    };
    let repo = data.repo.as_ref();
    let channels = repo.list_popular_channels(limit).await?;
    let message = if channels.is_empty() { "No channels found" } else { "" };
    Ok(ok_data(channel_responses(repo, data.store.as_ref(), &channels).await?, message))
}

#[utoipa::path(
    post,
    path = "/api/subscribeChannel/{id}",
    params(("id" = i64, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Subscribed", body = super::MessageResponse),
        (status = 404, description = "Channel not found"),
        (status = 409, description = "Already subscribed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn subscribe_channel(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let repo = data.repo.as_ref();
    repo.get_channel(channel_id).await.map_err(not_found_as("Channel not found"))?;
    repo.subscribe(auth.user_id, channel_id).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::conflict("Already subscribed"),
        RepoError::NotFound => ApiError::not_found("Channel not found"),
        other => other.into(),
    })?;
    repo.adjust_subscribers(channel_id, 1).await?;
    Ok(ok_message("Subscription successful"))
}

#[utoipa::path(
    delete,
    path = "/api/unsubscribeChannel/{id}",
    params(("id" = i64, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Unsubscribed", body = super::MessageResponse),
        (status = 404, description = "Not subscribed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unsubscribe_channel(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let repo = data.repo.as_ref();
    repo.get_channel(channel_id).await.map_err(not_found_as("Channel not found"))?;
    repo.unsubscribe(auth.user_id, channel_id).await.map_err(not_found_as("Not subscribed"))?;
    repo.adjust_subscribers(channel_id, -1).await?;
    Ok(ok_message("Unsubscribed successfully"))
}

#[utoipa::path(
    get,
    path = "/api/getChannelStatistics/{id}",
    params(("id" = i64, Path, description = "Channel id"), StatisticsQuery),
    responses(
        (status = 200, description = "Today's counters and their change over the period", body = crate::statistics::StatisticsReport),
        (status = 400, description = "Invalid period"),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_channel_statistics(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<StatisticsQuery>,
) -> Result<HttpResponse, ApiError> {
    let channel_id = positive_id(&path, "channel")?;
    let period = Period::parse(query.period.as_deref())?;
    let today = Utc::now().date_naive();
    let report = channel_report(data.repo.as_ref(), auth.user_id, channel_id, period, today).await?;
    Ok(ok_data(report, ""))
}

#[utoipa::path(get, path = "/api/getAllCategories", responses((status = 200, description = "Categories", body = [Category])))]
pub async fn get_all_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories: Vec<Category> = data.repo.list_categories().await?;
    Ok(ok_data(categories, ""))
}

#[utoipa::path(get, path = "/api/getAllTags", responses((status = 200, description = "Tags with their category color", body = [Tag])))]
pub async fn get_all_tags(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let tags: Vec<Tag> = data.repo.list_tags().await?;
    Ok(ok_data(tags, ""))
}
