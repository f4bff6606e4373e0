//! Delivery of local artifacts into dated Drive folders.
//!
//! [`DriveUploader`] resolves the `YYYY-MM-DD` folder under every configured
//! parent (query first, create if missing, memoized per `(label, parent)`)
//! and uploads each file with the shared [`RetryPolicy`]. A missing parent is
//! never retried; that parent is skipped for the rest of the run.
//!
//! Uploads are not existence-checked: uploading the same file name twice
//! creates two remote files.

use crate::{
    drive::DriveApi,
    error::DriveError,
    models::UploadReport,
    retry::RetryPolicy,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Receives every artifact the pipeline produces, one batch at a time.
#[allow(async_fn_in_trait)]
pub trait ChunkUploader {
    async fn upload_chunk(&mut self, files: &[PathBuf]) -> UploadReport;
}

pub struct DriveUploader<A> {
    api: A,
    policy: RetryPolicy,
    parent_folder_ids: Vec<String>,
    date_label: String,
    // None records a parent Drive reported as missing
    folders: HashMap<(String, String), Option<String>>,
}

impl<A: DriveApi> DriveUploader<A> {
    pub fn new(api: A, policy: RetryPolicy, parent_folder_ids: Vec<String>, date_label: impl Into<String>) -> Self {
        Self {
            api,
            policy,
            parent_folder_ids,
            date_label: date_label.into(),
            folders: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn api(&self) -> &A {
        &self.api
    }

    /// Id of folder `label` under `parent`, created if needed.
    /// `None` when the parent does not exist or Drive kept failing.
    pub async fn resolve_folder(&mut self, label: &str, parent: &str) -> Option<String> {
        let key = (label.to_string(), parent.to_string());
        if let Some(cached) = self.folders.get(&key) {
            return cached.clone();
        }

        let api = &self.api;
        let result = self
            .policy
            .run("resolve folder", DriveError::is_retriable, move || async move {
                if let Some(id) = api.find_folder(label, parent).await? {
                    tracing::info!(folder = label, parent, "Found existing folder");
                    return Ok(id);
                }
                let id = api.create_folder(label, parent).await?;
                tracing::info!(folder = label, parent, id = %id, "Created new folder");
                Ok::<_, DriveError>(id)
            })
            .await;

        match result {
            Ok(id) => {
                self.folders.insert(key, Some(id.clone()));
                Some(id)
            }
            Err(e) if e.is_not_found() => {
                tracing::error!(parent, "Parent folder not found");
                self.folders.insert(key, None);
                None
            }
            Err(e) => {
                tracing::error!(folder = label, parent, error = %e, "Failed to create/get folder");
                None
            }
        }
    }

    /// Uploads each file into `folder_id`. A file that keeps failing does not
    /// stop the ones after it.
    pub async fn upload(&self, files: &[PathBuf], folder_id: &str) -> Vec<(PathBuf, Result<String, DriveError>)> {
        let mut outcomes = Vec::with_capacity(files.len());
        for path in files {
            let outcome = self.upload_one(path, folder_id).await;
            match &outcome {
                Ok(id) => tracing::info!(file = %path.display(), folder_id, id = %id, "Successfully uploaded"),
                Err(e) => tracing::error!(file = %path.display(), folder_id, error = %e, "Upload failed"),
            }
            outcomes.push((path.clone(), outcome));
        }
        outcomes
    }

    async fn upload_one(&self, path: &Path, folder_id: &str) -> Result<String, DriveError> {
        let api = &self.api;
        self.policy
            .run("upload file", DriveError::is_retriable, move || api.upload_file(path, folder_id))
            .await
    }
}

impl<A: DriveApi> ChunkUploader for DriveUploader<A> {
    /// A file counts as uploaded once it reached every parent whose folder
    /// resolved, and at least one did.
    async fn upload_chunk(&mut self, files: &[PathBuf]) -> UploadReport {
        let label = self.date_label.clone();
        let parents = self.parent_folder_ids.clone();
        let mut failed: HashSet<PathBuf> = HashSet::new();
        let mut delivered_somewhere = false;

        for parent in &parents {
            let Some(folder_id) = self.resolve_folder(&label, parent).await else {
                tracing::error!(parent = %parent, "Skipping uploads to parent folder");
                continue;
            };
            delivered_somewhere = true;

            for (path, outcome) in self.upload(files, &folder_id).await {
                if outcome.is_err() {
                    failed.insert(path);
                }
            }
        }

        let mut report = UploadReport::default();
        for path in files {
            if delivered_somewhere && !failed.contains(path) {
                report.uploaded.push(path.clone());
            } else {
                report.failed.push(path.clone());
            }
        }
        tracing::info!(uploaded = report.uploaded.len(), failed = report.failed.len(), "Files upload process completed");
        report
    }
}
