use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

use super::views::UploadedFileResponse;
use super::{ok_data, ok_message, positive_id, AppState};
use crate::attachments::{read_upload, remove_file, store_upload};
use crate::auth::Auth;
use crate::error::{not_found_as, ApiError};

#[utoipa::path(
    post,
    path = "/api/uploadFile",
    responses(
        (status = 200, description = "Stored; multipart field `file`, any type", body = UploadedFileResponse),
        (status = 413, description = "Too large"),
        (status = 429, description = "Too many uploads")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_file(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    data.throttle(|rl| rl.allow_upload(auth.user_id))?;
    let upload = read_upload(payload, data.config.max_upload_bytes).await?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    let file = store_upload(repo, store, auth.user_id, upload).await?;
    tracing::info!(file_id = file.id, mime = %file.mime_type, "file uploaded");
    Ok(ok_data(
        UploadedFileResponse { id: file.id, url: store.public_url(&file.filename), mime_type: file.mime_type },
        "File uploaded successfully",
    ))
}

#[utoipa::path(
    delete,
    path = "/api/deleteFile/{id}",
    params(("id" = i64, Path, description = "File id")),
    responses(
        (status = 200, description = "Object and record removed", body = super::MessageResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "File not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_file(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let file_id = positive_id(&path, "file")?;
    let (repo, store) = (data.repo.as_ref(), data.store.as_ref());
    let file = repo.get_file(file_id).await.map_err(not_found_as("File not found"))?;
    if file.owner_id != auth.user_id {
        return Err(ApiError::forbidden("You don't own this file"));
    }
    remove_file(repo, store, &file).await?;
    Ok(ok_message("File deleted successfully"))
}
