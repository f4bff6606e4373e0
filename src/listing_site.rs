// Navigation of the marketplace: brand/model hierarchy and listing details

use crate::{
    config::Settings,
    error::ScrapeError,
    models::{BrandEntry, ListingRecord, ModelEntry},
};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::time::Duration;

// Brand tiles on the root page and model tiles on a brand page share this markup
static NAV_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".styles_itemWrapper__MTzPB a").expect("nav link selector is valid"));
static NEXT_DATA_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").expect("next data selector is valid"));

// Keys under which the listing page embeds its ads
const LISTING_KEYS: [&str; 3] = ["listings", "ads", "items"];
const MAX_SEARCH_DEPTH: usize = 4;
const MAX_FLATTEN_DEPTH: usize = 3;

/// Source of listing records for one model page.
#[allow(async_fn_in_trait)]
pub trait DetailSource {
    async fn collect_details(&self, model_link: &str) -> Result<Vec<ListingRecord>, ScrapeError>;
}

/// One browsing session against the marketplace. Cookies persist across
/// navigations and every request is bounded by the page timeout.
pub struct ListingSite {
    client: Client,
    base_url: String,
}

impl ListingSite {
    pub fn new(base_url: &str, user_agent: &str, page_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(page_timeout)
            .cookie_store(true)
            .build()
            .context("Failed to build reqwest client for the listing site")?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.base_url, &settings.user_agent, settings.page_timeout())
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        tracing::debug!(url, "Navigating");
        let response = self.client.get(url).send().await.map_err(|e| ScrapeError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status { url: url.to_string(), status });
        }

        response.text().await.map_err(|e| ScrapeError::from_reqwest(url, e))
    }

    /// Walks the root page for brands, then each brand page for its models.
    /// Only a failure on the root page is an error; a brand that fails to
    /// load keeps an empty model list.
    pub async fn collect_hierarchy(&self, root_url: &str) -> Result<Vec<BrandEntry>, ScrapeError> {
        let root_html = self.fetch_page(root_url).await?;
        let brand_links = parse_nav_links(&root_html, &self.base_url);
        if brand_links.is_empty() {
            tracing::warn!(root_url, "No brand links found on the root page");
        }

        let mut brands = Vec::with_capacity(brand_links.len());
        for (brand_name, brand_link) in brand_links {
            tracing::info!(brand = %brand_name, link = %brand_link, "Found brand");
            let models = match self.collect_models(&brand_link).await {
                Ok(models) => models,
                Err(e) => {
                    tracing::warn!(brand = %brand_name, error = %e, "Failed to navigate to brand page");
                    Vec::new()
                }
            };
            brands.push(BrandEntry { brand_name, brand_link, models });
        }

        tracing::info!("Collected {} brands", brands.len());
        Ok(brands)
    }

    async fn collect_models(&self, brand_link: &str) -> Result<Vec<ModelEntry>, ScrapeError> {
        let html = self.fetch_page(brand_link).await?;
        let models: Vec<ModelEntry> = parse_nav_links(&html, &self.base_url)
            .into_iter()
            .map(|(title, detail_link)| ModelEntry { title, detail_link })
            .collect();

        if models.is_empty() {
            return Err(ScrapeError::NotReady {
                url: brand_link.to_string(),
                reason: "no model links on page".to_string(),
            });
        }
        Ok(models)
    }
}

impl DetailSource for ListingSite {
    async fn collect_details(&self, model_link: &str) -> Result<Vec<ListingRecord>, ScrapeError> {
        let html = self.fetch_page(model_link).await?;
        let records = parse_listings(&html, model_link)?;
        tracing::debug!(model_link, count = records.len(), "Extracted listings");
        Ok(records)
    }
}

fn absolute_link(base_url: &str, href: &str) -> String {
    if href.starts_with('/') {
        format!("{}{}", base_url, href)
    } else {
        href.to_string()
    }
}

/// Extracts `(title, absolute link)` pairs from the navigation tiles.
/// Anchors without an `href` are skipped; a missing `title` falls back to
/// the anchor text.
pub fn parse_nav_links(html: &str, base_url: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&NAV_LINK_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href").filter(|h| !h.is_empty())?;
            let title = anchor
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| anchor.text().collect::<String>().trim().to_string());
            Some((title, absolute_link(base_url, href)))
        })
        .collect()
}

/// Reads the listings embedded in the page's Next.js payload.
/// A page without the payload never finished rendering and is reported as
/// not ready; a payload without a listing array means the model has no ads.
pub fn parse_listings(html: &str, url: &str) -> Result<Vec<ListingRecord>, ScrapeError> {
    let document = Html::parse_document(html);
    let script = document.select(&NEXT_DATA_SELECTOR).next().ok_or_else(|| ScrapeError::NotReady {
        url: url.to_string(),
        reason: "__NEXT_DATA__ payload missing".to_string(),
    })?;

    let raw = script.text().collect::<String>();
    let payload: Value = serde_json::from_str(&raw).map_err(|e| ScrapeError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let Some(page_props) = payload.pointer("/props/pageProps") else {
        return Ok(Vec::new());
    };

    let records = find_listing_array(page_props, 0)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(flatten_listing)
                .filter(|record| !record.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Ok(records)
}

fn find_listing_array(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    let object = value.as_object()?;
    for key in LISTING_KEYS {
        if let Some(Value::Array(items)) = object.get(key) {
            if items.iter().any(Value::is_object) {
                return Some(items);
            }
        }
    }
    if depth >= MAX_SEARCH_DEPTH {
        return None;
    }
    object.values().find_map(|child| find_listing_array(child, depth + 1))
}

fn flatten_listing(object: &Map<String, Value>) -> ListingRecord {
    let mut record = ListingRecord::new();
    flatten_into(&mut record, "", object, 0);
    record
}

fn flatten_into(record: &mut ListingRecord, prefix: &str, object: &Map<String, Value>, depth: usize) {
    for (key, value) in object {
        let name = if prefix.is_empty() { key.clone() } else { format!("{prefix}_{key}") };
        match value {
            Value::Object(child) if depth < MAX_FLATTEN_DEPTH => flatten_into(record, &name, child, depth + 1),
            Value::Object(_) | Value::Array(_) => {}
            scalar => record.insert(name, scalar.clone()),
        }
    }
}
