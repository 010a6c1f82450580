use std::path::Path;

use chrono::NaiveDateTime;
use google_drive3::api::File;

use crate::auth::{self, CredentialPaths, Hub};
use crate::error::{AppError, UploadError};
use crate::flow::InstalledFlow;
use crate::token::TokenCache;

pub const DEFAULT_FOLDER_NAME: &str = "MCP Screenshots";

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// What the remote store reported back for a finished upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub file_id: String,
    pub name: Option<String>,
    pub web_view_link: Option<String>,
}

pub struct DriveClient {
    hub: Hub,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient").finish_non_exhaustive()
    }
}

impl DriveClient {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Look a folder up by exact name, creating it when absent. The remote
    /// store does not enforce unique folder names; the first match wins.
    pub async fn find_or_create_folder(&self, name: &str) -> Result<String, AppError> {
        let query = folder_query(name);
        let (_resp, list) = self
            .hub
            .files()
            .list()
            .q(&query)
            .spaces("drive")
            .param("fields", "files(id, name)")
            .doit()
            .await
            .map_err(|e| AppError::DriveApi(format!("folder search failed: {e}")))?;

        if let Some(id) = existing_folder_id(list.files) {
            tracing::info!("found existing folder '{name}' ({id})");
            return Ok(id);
        }

        tracing::info!("folder '{name}' not found, creating it");
        let metadata = File {
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            ..Default::default()
        };

        // Metadata-only create: the generated call still wants a media body,
        // so pass an empty one with the folder mime type.
        let folder_mime: mime::Mime = FOLDER_MIME_TYPE
            .parse()
            .map_err(|e| AppError::DriveApi(format!("invalid mime type: {e}")))?;
        let (_resp, created) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id")
            .upload(std::io::Cursor::new(Vec::<u8>::new()), folder_mime)
            .await
            .map_err(|e| AppError::DriveApi(format!("folder create failed: {e}")))?;

        created
            .id
            .ok_or_else(|| AppError::DriveApi("folder create returned no id".into()))
    }

    /// Resumable upload of the file body under the given parent folder.
    pub async fn upload_file(
        &self,
        path: &Path,
        folder_id: &str,
        destination_name: &str,
    ) -> Result<UploadOutcome, AppError> {
        let metadata = File {
            name: Some(destination_name.to_string()),
            parents: Some(vec![folder_id.to_string()]),
            ..Default::default()
        };

        let content = std::fs::File::open(path)?;
        let media_mime: mime::Mime = "application/octet-stream"
            .parse()
            .map_err(|e| AppError::DriveApi(format!("invalid mime type: {e}")))?;

        let (_resp, created) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id, name, webViewLink")
            .upload_resumable(content, media_mime)
            .await
            .map_err(|e| AppError::DriveApi(format!("upload failed: {e}")))?;

        upload_outcome(created)
    }
}

/// First search result wins; `None` means the folder has to be created.
fn existing_folder_id(files: Option<Vec<File>>) -> Option<String> {
    files.unwrap_or_default().into_iter().next().and_then(|f| f.id)
}

fn upload_outcome(created: File) -> Result<UploadOutcome, AppError> {
    let file_id = created
        .id
        .ok_or_else(|| AppError::DriveApi("upload returned no file id".into()))?;
    Ok(UploadOutcome {
        file_id,
        name: created.name,
        web_view_link: created.web_view_link,
    })
}

/// Upload a local file into the named Drive folder, resolving credentials
/// and the destination folder along the way.
pub async fn upload_file_to_drive(
    path: &Path,
    folder_name: &str,
) -> Result<UploadOutcome, UploadError> {
    if !path.exists() {
        return Err(UploadError::LocalFile(path.to_path_buf()));
    }

    tracing::info!("authenticating with Google Drive");
    let credentials = CredentialPaths::from_home().map_err(UploadError::Auth)?;
    let cache = TokenCache::from_home().map_err(UploadError::Auth)?;
    let flow = InstalledFlow::new();
    let token = auth::get_credentials(&flow, &cache, &credentials)
        .await
        .map_err(UploadError::Auth)?;
    let client = DriveClient::new(auth::build_hub(&token).map_err(UploadError::Auth)?);

    tracing::info!("finding or creating folder '{folder_name}'");
    let folder_id = client
        .find_or_create_folder(folder_name)
        .await
        .map_err(UploadError::Remote)?;

    let destination_name = timestamped_name(path, chrono::Local::now().naive_local());
    tracing::info!("uploading {} as {destination_name}", path.display());
    client
        .upload_file(path, &folder_id, &destination_name)
        .await
        .map_err(UploadError::Remote)
}

/// Search query for a non-trashed folder with an exact name match.
fn folder_query(name: &str) -> String {
    format!(
        "name='{}' and mimeType='{FOLDER_MIME_TYPE}' and trashed=false",
        escape_query_value(name)
    )
}

/// Drive query strings single-quote values; backslash-escape the two
/// characters that would break out of the literal.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `shot.png` uploaded at 2024-01-02 03:04:05 becomes
/// `shot_20240102_030405.png`. Second precision only; two uploads of the
/// same stem within one second collide.
fn timestamped_name(path: &Path, now: NaiveDateTime) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("screenshot");
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{stem}_{}{extension}", now.format("%Y%m%d_%H%M%S"))
}
