use anyhow::{anyhow, Context, Result};
use std::env;
use yup_oauth2::ServiceAccountKey;

use crate::config::CREDENTIALS_ENV_VAR;

/// Reads the service-account key from `NEW_CAR_GCLOUD_KEY_JSON`.
/// A missing or malformed key is a configuration error; nothing is retried.
pub fn service_account_from_env() -> Result<ServiceAccountKey> {
    service_account_from(env::var(CREDENTIALS_ENV_VAR).ok().as_deref())
}

pub fn service_account_from(raw: Option<&str>) -> Result<ServiceAccountKey> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("{} environment variable not found", CREDENTIALS_ENV_VAR))?;

    yup_oauth2::parse_service_account_key(raw)
        .with_context(|| format!("{} does not hold a valid service-account key", CREDENTIALS_ENV_VAR))
}
