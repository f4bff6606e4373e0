// Top-level sequencing of one harvest run

use crate::{
    config::Settings,
    credentials,
    drive::{DriveApi, GoogleDrive},
    listing_site::ListingSite,
    models::RunSummary,
    pipeline::{BatchPipeline, PipelineOptions},
    uploader::DriveUploader,
};
use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use std::path::Path;

/// Runs are labelled with the day before they start.
pub fn target_date_label(today: NaiveDate) -> String {
    today
        .checked_sub_days(Days::new(1))
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

/// Authenticates against Drive, then harvests. Missing or bad credentials
/// abort before any page is fetched.
pub async fn run(settings: &Settings) -> Result<RunSummary> {
    let key = credentials::service_account_from_env().context("Failed to setup Google Drive")?;
    let drive = GoogleDrive::authenticate(key, settings)
        .await
        .context("Failed to setup Google Drive")?;
    run_with_drive(settings, drive).await
}

/// Harvest inside a scoped temporary directory that is removed on every
/// exit path, errors included.
pub async fn run_with_drive<A: DriveApi>(settings: &Settings, drive: A) -> Result<RunSummary> {
    std::fs::create_dir_all(&settings.work_dir)
        .with_context(|| format!("Failed to create {}", settings.work_dir.display()))?;
    let work_dir = tempfile::Builder::new()
        .prefix("run-")
        .tempdir_in(&settings.work_dir)
        .context("Failed to create temporary directory")?;

    let result = harvest(settings, drive, work_dir.path()).await;

    match work_dir.close() {
        Ok(()) => tracing::info!("Cleaned up temporary directory"),
        Err(e) => tracing::error!(error = %e, "Error cleaning up temp directory"),
    }
    if let Err(e) = std::fs::remove_dir(&settings.work_dir) {
        tracing::debug!(dir = %settings.work_dir.display(), error = %e, "Working directory left in place");
    }

    result
}

async fn harvest<A: DriveApi>(settings: &Settings, drive: A, work_dir: &Path) -> Result<RunSummary> {
    let date_label = target_date_label(Local::now().date_naive());
    let site = ListingSite::from_settings(settings)?;

    let brands = site
        .collect_hierarchy(&settings.root_url)
        .await
        .context("Failed to collect brand hierarchy")?;
    tracing::info!(brands = brands.len(), date = %date_label, "Hierarchy collected");

    let uploader = DriveUploader::new(
        drive,
        settings.retry_policy(),
        settings.parent_folder_ids.clone(),
        date_label.clone(),
    );
    let mut pipeline = BatchPipeline::new(site, uploader, work_dir, date_label, PipelineOptions::from_settings(settings));

    Ok(pipeline.run(&brands).await)
}
