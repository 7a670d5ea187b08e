//! Uploaded files: multipart intake, storage keys and single-file slots.

use actix_multipart::Multipart;
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{FileRecord, Id, NewFileRecord};
use crate::repo::{Repo, RepoError};
use crate::storage::{ObjectStore, StorageError};

/// A fully buffered upload with its sniffed type.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub extension: Option<String>,
}

impl Upload {
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Type from magic bytes; UTF-8 text without a signature is `text/plain`.
pub fn sniff(bytes: &[u8], client_filename: Option<&str>) -> (String, Option<String>) {
    if let Some(kind) = infer::get(bytes) {
        return (kind.mime_type().to_string(), Some(kind.extension().to_string()));
    }
    let ext = client_filename
        .and_then(|f| std::path::Path::new(f).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());
    let mime = if std::str::from_utf8(bytes).is_ok() { "text/plain" } else { "application/octet-stream" };
    (mime.to_string(), ext)
}

/// `{top-level-mime}/{uuid}{.ext}`
pub fn storage_key(mime: &str, extension: Option<&str>) -> String {
    let top = mime.split('/').next().filter(|t| !t.is_empty()).unwrap_or("application");
    match extension {
        Some(ext) => format!("{top}/{}.{ext}", Uuid::new_v4()),
        None => format!("{top}/{}", Uuid::new_v4()),
    }
}

/// Read the `file` field of a multipart body, refusing anything over `limit` bytes.
pub async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, ApiError> {
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::warn!(error = %e, "multipart error");
        ApiError::validation("Invalid multipart body")
    })? {
        let cd = field.content_disposition();
        if cd.get_name() != Some("file") {
            continue;
        }
        let client_filename = cd.get_filename().map(str::to_string);
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            tracing::warn!(error = %e, "upload stream error");
            ApiError::validation("Failed to read uploaded file")
        })? {
            if bytes.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(ApiError::validation("Uploaded file is empty"));
        }
        let (mime, extension) = sniff(&bytes, client_filename.as_deref());
        return Ok(Upload { bytes, mime, extension });
    }
    Err(ApiError::validation("No file uploaded"))
}

/// Put the object, then record it. A failed insert removes the orphaned object.
pub async fn store_upload(
    repo: &dyn Repo,
    store: &dyn ObjectStore,
    owner_id: Id,
    upload: Upload,
) -> Result<FileRecord, ApiError> {
    let key = storage_key(&upload.mime, upload.extension.as_deref());
    store.put(&key, &upload.mime, upload.bytes).await?;
    match repo
        .create_file(NewFileRecord { owner_id, filename: key.clone(), mime_type: upload.mime })
        .await
    {
        Ok(record) => Ok(record),
        Err(e) => {
            if let Err(cleanup) = store.delete(&key).await {
                tracing::warn!(key, error = %cleanup, "failed to remove orphaned object");
            }
            Err(e.into())
        }
    }
}

/// Delete object first, then the record. A missing object aborts with not-found.
pub async fn remove_file(repo: &dyn Repo, store: &dyn ObjectStore, file: &FileRecord) -> Result<(), ApiError> {
    store.delete(&file.filename).await.map_err(|e| match e {
        StorageError::NotFound => ApiError::not_found("File not found in storage"),
        other => other.into(),
    })?;
    match repo.delete_file_record(file.id).await {
        Ok(()) | Err(RepoError::NotFound) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Object and record removal that never fails the caller; used for cascades.
pub async fn remove_file_best_effort(repo: &dyn Repo, store: &dyn ObjectStore, file: &FileRecord) {
    if let Err(e) = store.delete(&file.filename).await {
        tracing::warn!(file_id = file.id, key = %file.filename, error = %e, "object delete failed");
    }
    if let Err(e) = repo.delete_file_record(file.id).await {
        tracing::warn!(file_id = file.id, error = %e, "file record delete failed");
    }
}

/// A single-file reference owned by a user, channel or post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    UserLogo(Id),
    ChannelLogo(Id),
}

impl Slot {
    async fn current(self, repo: &dyn Repo) -> Result<Option<Id>, ApiError> {
        Ok(match self {
            Slot::UserLogo(id) => repo.get_user(id).await?.logo_id,
            Slot::ChannelLogo(id) => repo.get_channel(id).await?.logo_id,
        })
    }

    async fn point(self, repo: &dyn Repo, file_id: Option<Id>) -> Result<(), ApiError> {
        match self {
            Slot::UserLogo(id) => repo.set_user_logo(id, file_id).await?,
            Slot::ChannelLogo(id) => repo.set_channel_logo(id, file_id).await?,
        }
        Ok(())
    }
}

/// Upload, record, repoint the slot, then drop whatever it pointed at before.
pub async fn replace_slot(
    repo: &dyn Repo,
    store: &dyn ObjectStore,
    slot: Slot,
    owner_id: Id,
    upload: Upload,
) -> Result<FileRecord, ApiError> {
    if !upload.is_image() {
        return Err(ApiError::validation("Logo image file type is not allowed"));
    }
    let previous = slot.current(repo).await?;
    let record = store_upload(repo, store, owner_id, upload).await?;
    slot.point(repo, Some(record.id)).await?;
    if let Some(old_id) = previous.filter(|old| *old != record.id) {
        release_previous(repo, store, old_id).await?;
    }
    Ok(record)
}

/// Empty the slot and delete its file. Empty slot is a validation error.
pub async fn clear_slot(repo: &dyn Repo, store: &dyn ObjectStore, slot: Slot) -> Result<(), ApiError> {
    let Some(file_id) = slot.current(repo).await? else {
        return Err(ApiError::validation("No logo to delete"));
    };
    slot.point(repo, None).await?;
    release_previous(repo, store, file_id).await
}

/// Delete a file a slot no longer references, unless another logo, preview
/// or post attachment still points at it. A record already gone is fine.
pub async fn release_previous(repo: &dyn Repo, store: &dyn ObjectStore, file_id: Id) -> Result<(), ApiError> {
    if repo.file_is_referenced(file_id).await? {
        tracing::debug!(file_id, "previous file still referenced; kept");
        return Ok(());
    }
    match repo.get_file(file_id).await {
        Ok(file) => remove_file(repo, store, &file).await,
        Err(RepoError::NotFound) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
