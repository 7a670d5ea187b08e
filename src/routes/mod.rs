use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::mail::Mailer;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::storage::ObjectStore;

pub mod account;
pub mod channels;
pub mod comments;
pub mod files;
pub mod posts;
pub mod views;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub store: Arc<dyn ObjectStore>,
    pub mailer: Arc<dyn Mailer>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// 429 when the limiter is present and `allowed` says no.
    pub(crate) fn throttle(&self, allowed: impl FnOnce(&RateLimiterFacade) -> bool) -> Result<(), ApiError> {
        match &self.rate_limiter {
            Some(rl) if !allowed(rl) => Err(ApiError::TooManyRequests),
            _ => Ok(()),
        }
    }
}

/// `{"data": ..., "message": ...}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

pub(crate) fn ok_data<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Ok().json(DataResponse { data, message: message.to_string() })
}

pub(crate) fn ok_message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse { message: message.to_string() })
}

/// Ids in paths are positive integers; anything else is a 400.
pub(crate) fn positive_id(raw: &str, what: &str) -> Result<crate::models::Id, ApiError> {
    match raw.parse::<crate::models::Id>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::validation(format!("Invalid {what} id"))),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        ApiError::validation(format!("Incorrect data: {err}")).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        ApiError::validation(format!("Invalid query: {err}")).into()
    }))
    .service(
        web::scope("/api")
            // account
            .route("/register", web::post().to(account::register))
            .route("/login", web::post().to(account::login))
            .route("/logout", web::post().to(account::logout))
            .route("/user", web::get().to(account::current_user))
            .route("/editProfile", web::patch().to(account::edit_profile))
            .route("/changePassword", web::patch().to(account::change_password))
            .route("/languageUpdate", web::patch().to(account::language_update))
            .route("/uploadUserLogo", web::post().to(account::upload_user_logo))
            .route("/deleteUserLogo", web::delete().to(account::delete_user_logo))
            .route("/requestEmailVerification", web::post().to(account::request_email_verification))
            .route("/verifyEmail", web::post().to(account::verify_email))
            .route("/requestPasswordReset", web::post().to(account::request_password_reset))
            .route("/resetPassword", web::patch().to(account::reset_password))
            .route("/requestDeletionVerification", web::post().to(account::request_deletion_verification))
            .route("/deleteUser", web::delete().to(account::delete_user))
            // channels
            .route("/createChannel", web::post().to(channels::create_channel))
            .route("/editChannel", web::patch().to(channels::edit_channel))
            .route("/deleteChannel/{id}", web::delete().to(channels::delete_channel))
            .route("/uploadChannelLogo/{id}", web::post().to(channels::upload_channel_logo))
            .route("/deleteChannelLogo/{id}", web::delete().to(channels::delete_channel_logo))
            .route("/getUserSubscriptions", web::get().to(channels::get_user_subscriptions))
            .route("/getUserChannels", web::get().to(channels::get_user_channels))
            .route("/getChannel/{id}", web::get().to(channels::get_channel))
            .route("/getPopularChannels", web::get().to(channels::get_popular_channels))
            .route("/subscribeChannel/{id}", web::post().to(channels::subscribe_channel))
            .route("/unsubscribeChannel/{id}", web::delete().to(channels::unsubscribe_channel))
            .route("/getChannelStatistics/{id}", web::get().to(channels::get_channel_statistics))
            .route("/getAllCategories", web::get().to(channels::get_all_categories))
            .route("/getAllTags", web::get().to(channels::get_all_tags))
            // posts
            .route("/createPost", web::post().to(posts::create_post))
            .route("/editPost", web::patch().to(posts::edit_post))
            .route("/deletePost/{id}", web::delete().to(posts::delete_post))
            .route("/getPost/{id}", web::get().to(posts::get_post))
            .route("/getPosts/{channelId}", web::get().to(posts::get_posts))
            .route("/getRecommendedPosts", web::get().to(posts::get_recommended_posts))
            .route("/setReaction", web::post().to(posts::set_reaction))
            // comments
            .route("/createComment", web::post().to(comments::create_comment))
            .route("/deleteComment/{id}", web::delete().to(comments::delete_comment))
            .route("/getPostComments", web::get().to(comments::get_post_comments))
            // files
            .route("/uploadFile", web::post().to(files::upload_file))
            .route("/deleteFile/{id}", web::delete().to(files::delete_file)),
    );
}
