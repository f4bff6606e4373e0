//! Harvests a car marketplace's brand/model listings into per-brand
//! workbooks and uploads them to dated Google Drive folders.

pub mod artifact;
pub mod config;
pub mod credentials;
pub mod drive;
pub mod error;
pub mod listing_site;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod uploader;
