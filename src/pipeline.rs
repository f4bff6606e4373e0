//! Chunked scrape -> workbook -> upload pipeline.
//!
//! Brands are processed in fixed-size chunks, strictly one after another.
//! Inside a chunk every model of every brand is fetched, each brand with data
//! becomes one workbook, and the chunk's workbooks are uploaded together
//! before the next chunk starts. Failures stay local: a model that fails is
//! skipped, a brand whose workbook cannot be written is skipped, and an upload
//! that fails leaves its files on disk while the run moves on.

use crate::{
    artifact,
    config::Settings,
    listing_site::DetailSource,
    models::{BrandEntry, ModelSheet, RunSummary},
    uploader::ChunkUploader,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { chunk_size: 3, chunk_delay: Duration::from_secs(5) }
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { chunk_size: settings.chunk_size, chunk_delay: settings.chunk_delay() }
    }
}

/// Contiguous chunks of `size` brands in original order; the last may be shorter.
pub fn partition(brands: &[BrandEntry], size: usize) -> std::slice::Chunks<'_, BrandEntry> {
    brands.chunks(size.max(1))
}

pub struct BatchPipeline<S, U> {
    source: S,
    uploader: U,
    work_dir: PathBuf,
    date_label: String,
    options: PipelineOptions,
    summary: RunSummary,
    // Lowercased artifact names claimed so far in this run
    file_names: HashSet<String>,
}

impl<S: DetailSource, U: ChunkUploader> BatchPipeline<S, U> {
    pub fn new(
        source: S,
        uploader: U,
        work_dir: impl Into<PathBuf>,
        date_label: impl Into<String>,
        options: PipelineOptions,
    ) -> Self {
        let date_label = date_label.into();
        let file_names = HashSet::from([artifact::summary_file_name(&date_label).to_lowercase()]);
        Self {
            source,
            uploader,
            work_dir: work_dir.into(),
            date_label,
            options,
            summary: RunSummary::default(),
            file_names,
        }
    }

    #[cfg(test)]
    fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Processes every brand, then writes and uploads the run summary.
    /// Returns the brands that produced a workbook.
    pub async fn run(&mut self, brands: &[BrandEntry]) -> RunSummary {
        let chunks: Vec<&[BrandEntry]> = partition(brands, self.options.chunk_size).collect();
        let total = chunks.len();
        tracing::info!(brands = brands.len(), chunks = total, "Starting batch pipeline");

        for (index, chunk) in chunks.into_iter().enumerate() {
            tracing::info!("Processing chunk {}/{}", index + 1, total);

            let files = self.process_chunk(chunk).await;
            if !files.is_empty() {
                self.upload_and_clean(&files).await;
            }

            if index + 1 < total {
                tracing::info!("Waiting {} seconds before next chunk...", self.options.chunk_delay.as_secs());
                sleep(self.options.chunk_delay).await;
            }
        }

        self.upload_summary().await;
        self.summary.clone()
    }

    /// Builds one workbook per brand with data; returns the files written.
    async fn process_chunk(&mut self, chunk: &[BrandEntry]) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for brand in chunk {
            let sheets = self.collect_brand(brand).await;
            if !sheets.iter().any(|sheet| !sheet.records.is_empty()) {
                tracing::info!(brand = %brand.brand_name, "No car details found. Skipping Excel file creation.");
                continue;
            }

            // Brands whose names map to the same file must not overwrite each other
            let file_name = artifact::unique_workbook_file_name(&brand.brand_name, &mut self.file_names);
            match artifact::write_workbook_as(&self.work_dir, &file_name, &sheets) {
                Ok(path) => {
                    tracing::info!(brand = %brand.brand_name, path = %path.display(), "Excel file created");
                    self.summary.record(&brand.brand_name);
                    files.push(path);
                }
                Err(e) => {
                    tracing::error!(brand = %brand.brand_name, error = %e, "Error creating Excel file");
                }
            }
        }

        files
    }

    /// Fetches every model of `brand`. Models that fail are logged and left
    /// out; models that load but have no listings are kept with no records.
    pub async fn collect_brand(&self, brand: &BrandEntry) -> Vec<ModelSheet> {
        let mut sheets = Vec::with_capacity(brand.models.len());

        for model in &brand.models {
            match self.source.collect_details(&model.detail_link).await {
                Ok(records) => {
                    tracing::debug!(brand = %brand.brand_name, model = %model.title, count = records.len(), "Model scraped");
                    sheets.push(ModelSheet { model_name: model.title.clone(), records });
                }
                Err(e) if e.is_timeout() => {
                    tracing::error!(brand = %brand.brand_name, model = %model.title, error = %e, "Timeout error while scraping. Skipping...");
                }
                Err(e) => {
                    tracing::error!(brand = %brand.brand_name, model = %model.title, error = %e, "Error processing model. Skipping...");
                }
            }
        }

        sheets
    }

    /// Uploads `files` once; deletes the confirmed ones and keeps the rest.
    async fn upload_and_clean(&mut self, files: &[PathBuf]) {
        let report = self.uploader.upload_chunk(files).await;

        for path in &report.uploaded {
            remove_local(path);
        }
        if report.is_complete() {
            tracing::info!("Chunk of {} files uploaded successfully", files.len());
        } else {
            for path in &report.failed {
                tracing::error!(file = %path.display(), "Upload failed; keeping local copy");
            }
        }
    }

    async fn upload_summary(&mut self) {
        match artifact::write_summary(&self.work_dir, &self.date_label, &self.summary) {
            Ok(path) => {
                tracing::info!(brands = self.summary.len(), path = %path.display(), "Summary file created");
                self.upload_and_clean(std::slice::from_ref(&path)).await;
            }
            Err(e) => tracing::error!(error = %e, "Error creating summary file"),
        }
    }
}

fn remove_local(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(file = %path.display(), "Deleted local file"),
        Err(e) => tracing::error!(file = %path.display(), error = %e, "Error deleting local file"),
    }
}
