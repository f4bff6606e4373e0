// Run configuration, loaded with the 'config' crate and 'dotenv'

use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_ROOT_URL: &str = "https://www.q84sale.com/ar/automotive/new-cars-1";
pub const DEFAULT_BASE_URL: &str = "https://www.q84sale.com";
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// Environment variable holding the service-account key as JSON.
pub const CREDENTIALS_ENV_VAR: &str = "NEW_CAR_GCLOUD_KEY_JSON";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub root_url: String,
    pub base_url: String,
    pub chunk_size: usize,
    pub chunk_delay_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub page_timeout_secs: u64,
    pub parent_folder_ids: Vec<String>,
    pub work_dir: PathBuf,
    pub log_file: PathBuf,
    pub drive_api_url: String,
    pub drive_upload_url: String,
    pub upload_chunk_bytes: usize,
    pub user_agent: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            // Add default values
            .set_default("root_url", DEFAULT_ROOT_URL)?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("chunk_size", 3)?
            .set_default("chunk_delay_secs", 5)?
            .set_default("max_attempts", 3)?
            .set_default("retry_base_delay_secs", 4)?
            .set_default("page_timeout_secs", 5)?
            .set_default(
                "parent_folder_ids",
                vec!["1VKQ2qnYbQsQOh29x9tnS9qtFnwLMK1tB", "1Z1ByZAquecUrUwlamftrwmvuOxPoxhOb"],
            )?
            .set_default("work_dir", "temp_files")?
            .set_default("log_file", "scraper.log")?
            .set_default("drive_api_url", DEFAULT_DRIVE_API_URL)?
            .set_default("drive_upload_url", DEFAULT_DRIVE_UPLOAD_URL)?
            .set_default("upload_chunk_bytes", 1024 * 1024)?
            .set_default("user_agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36")?
            // Load from a configuration file (e.g., harvester.toml)
            .add_source(File::with_name("harvester").required(false))
            // Load from environment variables (e.g., HARVEST__CHUNK_SIZE)
            .add_source(
                Environment::with_prefix("HARVEST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("parent_folder_ids"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        // Drive rejects resumable chunks that are not multiples of 256 KiB
        if self.upload_chunk_bytes == 0 || self.upload_chunk_bytes % (256 * 1024) != 0 {
            bail!("upload_chunk_bytes must be a positive multiple of 262144");
        }
        Ok(())
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_secs(self.chunk_delay_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_base_delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_production_run() {
        let settings = Settings::new().expect("defaults should load");
        assert_eq!(settings.chunk_size, 3);
        assert_eq!(settings.chunk_delay(), Duration::from_secs(5));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.retry_base_delay_secs, 4);
        assert_eq!(settings.page_timeout(), Duration::from_secs(5));
        assert_eq!(settings.parent_folder_ids.len(), 2);
        assert_eq!(settings.upload_chunk_bytes, 1024 * 1024);
        assert_eq!(settings.root_url, DEFAULT_ROOT_URL);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut settings = Settings::new().expect("defaults should load");
        settings.chunk_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unaligned_upload_chunk_is_rejected() {
        let mut settings = Settings::new().expect("defaults should load");
        settings.upload_chunk_bytes = 1000;
        assert!(settings.validate().is_err());
    }
}
