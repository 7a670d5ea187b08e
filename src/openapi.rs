use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ApiErrorBody;
use crate::models::{Category, Language, StatCounters, Tag};
use crate::routes::{account, channels, comments, files, posts, views, MessageResponse};
use crate::statistics::StatisticsReport;

#[derive(OpenApi)]
#[openapi(
    paths(
        account::register,
        account::login,
        account::logout,
        account::current_user,
        account::edit_profile,
        account::change_password,
        account::language_update,
        account::upload_user_logo,
        account::delete_user_logo,
        account::request_email_verification,
        account::verify_email,
        account::request_password_reset,
        account::reset_password,
        account::request_deletion_verification,
        account::delete_user,
        channels::create_channel,
        channels::edit_channel,
        channels::delete_channel,
        channels::upload_channel_logo,
        channels::delete_channel_logo,
        channels::get_user_subscriptions,
        channels::get_user_channels,
        channels::get_channel,
        channels::get_popular_channels,
        channels::subscribe_channel,
        channels::unsubscribe_channel,
        channels::get_channel_statistics,
        channels::get_all_categories,
        channels::get_all_tags,
        posts::create_post,
        posts::edit_post,
        posts::delete_post,
        posts::get_post,
        posts::get_posts,
        posts::get_recommended_posts,
        posts::set_reaction,
        comments::create_comment,
        comments::delete_comment,
        comments::get_post_comments,
        files::upload_file,
        files::delete_file,
    ),
    components(schemas(
        ApiErrorBody, MessageResponse, Language, Category, Tag, StatCounters, StatisticsReport,
        account::RegisterRequest, account::LoginRequest, account::EditProfileRequest,
        account::ChangePasswordRequest, account::LanguageRequest, account::CodeRequest,
        account::PasswordResetRequest, account::ResetPasswordRequest,
        channels::CreateChannelRequest, channels::EditChannelRequest,
        posts::CreatePostRequest, posts::EditPostRequest, posts::ReactionRequest,
        comments::CreateCommentRequest,
        views::FileResponse, views::UploadedFileResponse, views::UserResponse, views::ChannelResponse,
        views::PostResponse, views::AuthorResponse, views::CommentResponse, views::TokenResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "blogpoint", description = "Channels, posts, comments and accounts"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
