// Google Drive v3 REST calls: folder lookup/creation and resumable upload

use crate::{config::Settings, error::DriveError};
use futures::future::LocalBoxFuture;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

pub const DRIVE_SCOPES: [&str; 1] = ["https://www.googleapis.com/auth/drive"];
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// The three remote operations the uploader needs.
#[allow(async_fn_in_trait)]
pub trait DriveApi {
    /// Id of a non-trashed folder named exactly `name` directly under `parent_id`.
    async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<String>, DriveError>;
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DriveError>;
    /// Uploads `path` into `folder_id`, returning the new file id.
    async fn upload_file(&self, path: &Path, folder_id: &str) -> Result<String, DriveError>;
}

// --- Drive Response Structures ---

#[derive(Deserialize, Debug)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize, Debug)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

type TokenFetcher = Box<dyn Fn() -> LocalBoxFuture<'static, Result<String, DriveError>>>;

enum TokenSource {
    Static(String),
    ServiceAccount(TokenFetcher),
}

pub struct GoogleDrive {
    client: Client,
    tokens: TokenSource,
    api_url: String,
    upload_url: String,
    chunk_bytes: usize,
}

impl GoogleDrive {
    /// Builds a service-account authenticator and fetches one token up front so
    /// bad credentials surface before any scraping starts.
    pub async fn authenticate(key: ServiceAccountKey, settings: &Settings) -> Result<Self, DriveError> {
        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| DriveError::Auth(format!("failed to create service account authenticator: {e}")))?;
        let auth = Arc::new(auth);

        let fetcher: TokenFetcher = Box::new(move || {
            let auth = Arc::clone(&auth);
            Box::pin(async move {
                let token = auth
                    .token(&DRIVE_SCOPES)
                    .await
                    .map_err(|e| DriveError::Auth(format!("failed to get OAuth2 token: {e}")))?;
                token
                    .token()
                    .map(str::to_string)
                    .ok_or_else(|| DriveError::Auth("token string is empty".to_string()))
            })
        });

        let drive = Self::build(
            TokenSource::ServiceAccount(fetcher),
            &settings.drive_api_url,
            &settings.drive_upload_url,
            settings.upload_chunk_bytes,
        )?;
        drive.bearer().await?;
        tracing::info!("Successfully authenticated with Google Drive");
        Ok(drive)
    }

    /// Client with a fixed bearer token, for pre-issued tokens and local testing.
    pub fn with_token(token: &str, api_url: &str, upload_url: &str, chunk_bytes: usize) -> Result<Self, DriveError> {
        Self::build(TokenSource::Static(token.to_string()), api_url, upload_url, chunk_bytes)
    }

    fn build(tokens: TokenSource, api_url: &str, upload_url: &str, chunk_bytes: usize) -> Result<Self, DriveError> {
        // Drive answers intermediate resumable chunks with 308, which must not be followed
        let client = Client::builder().redirect(reqwest::redirect::Policy::none()).build()?;
        Ok(Self {
            client,
            tokens,
            api_url: api_url.trim_end_matches('/').to_string(),
            upload_url: upload_url.trim_end_matches('/').to_string(),
            chunk_bytes: chunk_bytes.max(1),
        })
    }

    async fn bearer(&self) -> Result<String, DriveError> {
        match &self.tokens {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount(fetch) => fetch().await,
        }
    }

    async fn start_resumable(&self, token: &str, name: &str, folder_id: &str, len: usize) -> Result<String, DriveError> {
        let url = format!("{}/files", self.upload_url);
        let metadata = json!({ "name": name, "parents": [folder_id] });

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", XLSX_MIME_TYPE)
            .header("X-Upload-Content-Length", len.to_string())
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response, folder_id).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(DriveError::MissingSessionUri)
    }

    async fn send_chunks(&self, token: &str, session_uri: &str, bytes: &[u8]) -> Result<String, DriveError> {
        let total = bytes.len();
        if total == 0 {
            let response = self
                .client
                .put(session_uri)
                .bearer_auth(token)
                .header(CONTENT_RANGE, "bytes */0")
                .body(Vec::new())
                .send()
                .await?;
            return finish_upload(response, session_uri).await;
        }

        let mut offset = 0;
        loop {
            let end = (offset + self.chunk_bytes).min(total);
            let response = self
                .client
                .put(session_uri)
                .bearer_auth(token)
                .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end - 1, total))
                .body(bytes[offset..end].to_vec())
                .send()
                .await?;

            if response.status() != StatusCode::PERMANENT_REDIRECT {
                return finish_upload(response, session_uri).await;
            }

            // 308 Resume Incomplete: continue from whatever Drive acknowledged
            offset = response
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(acknowledged_end)
                .map_or(end, |last| last + 1);
            tracing::debug!(session_uri, offset, total, "Chunk accepted");
            if offset >= total {
                return Err(DriveError::Decode("upload acknowledged every byte without completing".to_string()));
            }
        }
    }
}

impl DriveApi for GoogleDrive {
    async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<String>, DriveError> {
        let token = self.bearer().await?;
        let query = format!(
            "name='{}' and '{}' in parents and mimeType='{}' and trashed=false",
            escape_query(name),
            escape_query(parent_id),
            FOLDER_MIME_TYPE
        );

        let response = self
            .client
            .get(format!("{}/files", self.api_url))
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("spaces", "drive"), ("fields", "files(id, name)")])
            .send()
            .await?;
        let response = check_status(response, parent_id).await?;

        let list: FileList = response.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DriveError> {
        let token = self.bearer().await?;
        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });

        let response = self
            .client
            .post(format!("{}/files", self.api_url))
            .bearer_auth(&token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response, parent_id).await?;

        let folder: DriveFile = response.json().await?;
        Ok(folder.id)
    }

    async fn upload_file(&self, path: &Path, folder_id: &str) -> Result<String, DriveError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(DriveError::MissingFile(path.to_path_buf()));
        }
        if folder_id.trim().is_empty() {
            return Err(DriveError::InvalidFolder(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::MissingFile(path.to_path_buf()))?;
        let bytes = tokio::fs::read(path).await?;

        let token = self.bearer().await?;
        let session_uri = self.start_resumable(&token, &name, folder_id, bytes.len()).await?;
        self.send_chunks(&token, &session_uri, &bytes).await
    }
}

// Drive query literals are single-quoted; quotes and backslashes need escaping
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `bytes=0-1048575` -> `1048575`.
fn acknowledged_end(range: &str) -> Option<usize> {
    range.strip_prefix("bytes=")?.split('-').nth(1)?.trim().parse().ok()
}

async fn check_status(response: Response, what: &str) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_else(|_| "[Failed to read response body]".to_string());
    if status == StatusCode::NOT_FOUND {
        return Err(DriveError::NotFound(what.to_string()));
    }
    Err(DriveError::Status { status, body })
}

async fn finish_upload(response: Response, session_uri: &str) -> Result<String, DriveError> {
    let response = check_status(response, session_uri).await?;
    let file: DriveFile = response.json().await?;
    Ok(file.id)
}
