//! Registration, sessions, profile and the code-confirmed account flows.

use actix_multipart::Multipart;
use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::views::{user_response, FileResponse, TokenResponse};
use super::{ok_data, ok_message, AppState, MessageResponse};
use crate::attachments::{clear_slot, read_upload, remove_file_best_effort, replace_slot, Slot};
use crate::auth::{create_jwt, Auth, AUTH_COOKIE};
use crate::error::{not_found_as, ApiError};
use crate::mail::templates;
use crate::models::{CodePurpose, Language, NewUser, UpdateProfile};
use crate::password::{hash_password, verify_password};
use crate::repo::RepoError;
use crate::verification;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "Login is required"))]
    pub login: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Login is required"))]
    pub login: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct EditProfileRequest {
    #[validate(length(min = 1, max = 64))]
    pub login: Option<String>,
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Old password is required"))]
    pub old_password: String,
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LanguageRequest {
    pub language: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct CodeRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct PasswordResetRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

fn parse_language(raw: Option<&str>) -> Result<Language, ApiError> {
    match raw.map(str::trim).unwrap_or("") {
        "" => Ok(Language::default()),
        other => Language::parse(other).ok_or_else(|| ApiError::validation("Incorrect language value")),
    }
}

fn session_cookie(token: String, state: &AppState) -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure)
        .max_age(time::Duration::seconds(state.config.jwt_ttl.num_seconds()))
        .finish()
}

fn expired_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(AUTH_COOKIE, "").path("/").http_only(true).finish();
    cookie.make_removal();
    cookie
}

#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = super::views::UserResponse),
        (status = 400, description = "Invalid data"),
        (status = 409, description = "Login or email taken")
    )
)]
pub async fn register(data: web::Data<AppState>, body: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    req.validate()?;
    let language = parse_language(req.language.as_deref())?;
    let repo = data.repo.as_ref();
    if repo.find_user_by_login(&req.login).await.is_ok() {
        return Err(ApiError::conflict("Login is already taken"));
    }
    if repo.find_user_by_email(&req.email).await.is_ok() {
        return Err(ApiError::conflict("Email is already taken"));
    }
    let user = repo
        .create_user(NewUser { login: req.login, email: req.email, password_hash: hash_password(&req.password)?, language })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::conflict("Login or email is already taken"),
            other => other.into(),
        })?;
    tracing::info!(user_id = user.id, "user registered");
    Ok(ok_data(user_response(repo, data.store.as_ref(), &user).await?, "Successful registration"))
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued and set as cookie", body = TokenResponse),
        (status = 400, description = "Incorrect password"),
        (status = 404, description = "User not found")
    )
)]
pub async fn login(data: web::Data<AppState>, body: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    req.validate()?;
    let user = data
        .repo
        .find_user_by_login(&req.login)
        .await
        .map_err(not_found_as("User not found"))?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::validation("Incorrect password"));
    }
    let token = create_jwt(user.id, data.config.jwt_ttl)?;
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(token.clone(), &data))
        .json(super::DataResponse { data: TokenResponse { token }, message: "Successful authorization".into() }))
}

#[utoipa::path(post, path = "/api/logout", responses((status = 200, description = "Cookie expired", body = MessageResponse)))]
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok()
        .cookie(expired_cookie())
        .json(MessageResponse { message: "Logged out successfully".into() })
}

#[utoipa::path(
    get,
    path = "/api/user",
    responses((status = 200, description = "Current user", body = super::views::UserResponse), (status = 401, description = "Unauthenticated")),
    security(("bearer_auth" = []))
)]
pub async fn current_user(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data
        .repo
        .get_user(auth.user_id)
        .await
        .map_err(|_| ApiError::Unauthorized("Unauthenticated".into()))?;
    Ok(ok_data(user_response(data.repo.as_ref(), data.store.as_ref(), &user).await?, ""))
}

#[utoipa::path(
    patch,
    path = "/api/editProfile",
    request_body = EditProfileRequest,
    responses((status = 200, description = "OK", body = super::views::UserResponse), (status = 409, description = "Login or email taken")),
    security(("bearer_auth" = []))
)]
pub async fn edit_profile(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Json<EditProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut req = body.into_inner();
    req.login = req.login.filter(|s| !s.trim().is_empty());
    req.email = req.email.filter(|s| !s.trim().is_empty());
    req.validate()?;
    let user = data
        .repo
        .update_profile(auth.user_id, UpdateProfile { login: req.login, email: req.email })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::conflict("Login or email is already taken"),
            RepoError::NotFound => ApiError::not_found("User not found"),
            other => other.into(),
        })?;
    Ok(ok_data(
        user_response(data.repo.as_ref(), data.store.as_ref(), &user).await?,
        "Profile edited successfully",
    ))
}

#[utoipa::path(
    patch,
    path = "/api/changePassword",
    request_body = ChangePasswordRequest,
    responses((status = 200, description = "OK", body = MessageResponse), (status = 400, description = "Incorrect old password")),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();
    req.validate()?;
    if req.old_password == req.new_password {
        return Err(ApiError::validation("New password must differ from the old one"));
    }
    let user = data.repo.get_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    if !verify_password(&req.old_password, &user.password_hash) {
        return Err(ApiError::validation("Incorrect old password"));
    }
    data.repo.set_password(user.id, hash_password(&req.new_password)?).await?;
    Ok(ok_message("Password changed successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/languageUpdate",
    request_body = LanguageRequest,
    responses((status = 200, description = "OK", body = MessageResponse), (status = 400, description = "Incorrect language value")),
    security(("bearer_auth" = []))
)]
pub async fn language_update(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Json<LanguageRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    let requested = body.language.trim();
    if requested == user.language.as_str() {
        return Ok(ok_message("Language is already set"));
    }
    let language = Language::parse(requested).ok_or_else(|| ApiError::validation("Incorrect language value"))?;
    data.repo.set_language(user.id, language).await?;
    Ok(ok_message("Language updated successfully"))
}

#[utoipa::path(
    post,
    path = "/api/uploadUserLogo",
    responses((status = 200, description = "OK", body = FileResponse), (status = 400, description = "Not an image"), (status = 413, description = "Too large")),
    security(("bearer_auth" = []))
)]
pub async fn upload_user_logo(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    data.throttle(|rl| rl.allow_upload(auth.user_id))?;
    data.repo.get_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    let upload = read_upload(payload, data.config.max_upload_bytes).await?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    let file = replace_slot(repo, store, Slot::UserLogo(auth.user_id), auth.user_id, upload).await?;
    Ok(ok_data(FileResponse::new(&file, store), "User logo uploaded successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/deleteUserLogo",
    responses((status = 200, description = "OK", body = MessageResponse), (status = 400, description = "No logo to delete")),
    security(("bearer_auth" = []))
)]
pub async fn delete_user_logo(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.repo.get_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    clear_slot(data.repo.as_ref(), data.store.as_ref(), Slot::UserLogo(auth.user_id)).await?;
    Ok(ok_message("User logo deleted successfully"))
}

#[utoipa::path(
    post,
    path = "/api/requestEmailVerification",
    responses((status = 200, description = "OK", body = MessageResponse), (status = 429, description = "Too many requests")),
    security(("bearer_auth" = []))
)]
pub async fn request_email_verification(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    if user.is_verified {
        return Err(ApiError::validation("Email is already verified"));
    }
    data.throttle(|rl| rl.allow_code(&user.id.to_string()))?;
    let code = verification::issue(data.repo.as_ref(), user.id, CodePurpose::EmailVerification, Utc::now()).await?;
    let (subject, html) = templates::email_verification(&code);
    data.mailer.send(&user.email, subject, &html).await?;
    Ok(ok_message("Verification code sent"))
}

#[utoipa::path(
    post,
    path = "/api/verifyEmail",
    request_body = CodeRequest,
    responses((status = 200, description = "OK", body = MessageResponse), (status = 400, description = "Invalid or expired code")),
    security(("bearer_auth" = []))
)]
pub async fn verify_email(auth: Auth, data: web::Data<AppState>, body: web::Json<CodeRequest>) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let repo = data.repo.as_ref();
    verification::consume(repo, Some(auth.user_id), CodePurpose::EmailVerification, &body.code, Utc::now()).await?;
    repo.mark_verified(auth.user_id).await?;
    Ok(ok_message("Email verified successfully"))
}

#[utoipa::path(
    post,
    path = "/api/requestPasswordReset",
    request_body = PasswordResetRequest,
    responses((status = 200, description = "OK", body = MessageResponse), (status = 404, description = "Email not found"))
)]
pub async fn request_password_reset(
    data: web::Data<AppState>,
    body: web::Json<PasswordResetRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let email = body.email.trim();
    data.throttle(|rl| rl.allow_code(email))?;
    let user = data.repo.find_user_by_email(email).await.map_err(not_found_as("Email not found"))?;
    let code = verification::issue(data.repo.as_ref(), user.id, CodePurpose::PasswordReset, Utc::now()).await?;
    let link = format!("{}?token={}", data.config.reset_link_base, urlencoding::encode(&code));
    let (subject, html) = templates::password_reset(&link);
    data.mailer.send(&user.email, subject, &html).await?;
    Ok(ok_message("Password recovery link sent"))
}

#[utoipa::path(
    patch,
    path = "/api/resetPassword",
    request_body = ResetPasswordRequest,
    responses((status = 200, description = "OK", body = MessageResponse), (status = 400, description = "Invalid or expired code"))
)]
pub async fn reset_password(data: web::Data<AppState>, body: web::Json<ResetPasswordRequest>) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let repo = data.repo.as_ref();
    let code = verification::consume(repo, None, CodePurpose::PasswordReset, &body.code, Utc::now()).await?;
    repo.set_password(code.user_id, hash_password(&body.password)?).await?;
    Ok(ok_message("Password changed successfully"))
}

#[utoipa::path(
    post,
    path = "/api/requestDeletionVerification",
    responses((status = 200, description = "OK", body = MessageResponse), (status = 429, description = "Too many requests")),
    security(("bearer_auth" = []))
)]
pub async fn request_deletion_verification(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    data.throttle(|rl| rl.allow_code(&user.id.to_string()))?;
    let code = verification::issue(data.repo.as_ref(), user.id, CodePurpose::AccountDeletion, Utc::now()).await?;
    let (subject, html) = templates::account_deletion(&code);
    data.mailer.send(&user.email, subject, &html).await?;
    Ok(ok_message("Deletion confirmation code sent"))
}

#[utoipa::path(
    delete,
    path = "/api/deleteUser",
    request_body = CodeRequest,
    responses((status = 200, description = "OK", body = MessageResponse), (status = 400, description = "Invalid or expired code")),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(auth: Auth, data: web::Data<AppState>, body: web::Json<CodeRequest>) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    verification::consume(repo, Some(auth.user_id), CodePurpose::AccountDeletion, &body.code, Utc::now()).await?;
    for file in repo.list_user_files(auth.user_id).await? {
        remove_file_best_effort(repo, store, &file).await;
    }
    repo.delete_user(auth.user_id).await.map_err(not_found_as("User not found"))?;
    tracing::info!(user_id = auth.user_id, "user deleted");
    Ok(HttpResponse::Ok()
        .cookie(expired_cookie())
        .json(MessageResponse { message: "User deleted successfully".into() }))
}
