//! GCP Authentication
//!
//! Access tokens come from Application Default Credentials (service account
//! key, workload identity or `gcloud auth application-default login`), or
//! from a pre-minted token in `GOOGLE_OAUTH_ACCESS_TOKEN`. Default project,
//! region and zone are read from the environment or the gcloud configuration.

use anyhow::{Context, Result};
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Read-only scope is enough to list resources
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform.read-only"];

/// Environment variable holding a pre-minted access token
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Refresh tokens this much before they expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Assumed token lifetime when the provider does not say
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// ADC credentials with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Initialize Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Cached access token, fetched again once it is close to expiry
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
                return Ok(cached.token.clone());
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;
        let token = token.as_str().to_string();

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER,
        });
        tracing::debug!("Access token refreshed");

        Ok(token)
    }

    /// Drop the cached token and fetch a new one
    pub async fn refresh_token(&self) -> Result<String> {
        *self.token_cache.write().await = None;
        self.get_token().await
    }
}

/// Token from `GOOGLE_OAUTH_ACCESS_TOKEN`, if set
pub fn static_token_from_env() -> Option<String> {
    std::env::var(ACCESS_TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// The gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Project IDs are 6-30 characters of lowercase letters, digits and hyphens,
/// starting with a letter and not ending with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 || project.ends_with('-') {
        return false;
    }
    project.starts_with(|c: char| c.is_ascii_lowercase())
        && project
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Value of `key` in `[section]` of an INI-style gcloud file
fn ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == format!("[{}]", section);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((name, value)) = line.split_once('=') {
            if name.trim() == key {
                return Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
        }
    }
    None
}

/// Read a property from the active gcloud configuration
fn gcloud_property(section: &str, key: &str) -> Option<String> {
    let config_dir = get_gcloud_config_dir()?;

    let active = std::fs::read_to_string(config_dir.join("active_config"))
        .ok()
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "default".to_string());

    // The configuration name becomes part of a path
    if !active
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    [
        config_dir
            .join("configurations")
            .join(format!("config_{}", active)),
        config_dir.join("properties"),
    ]
    .iter()
    .filter_map(|path| std::fs::read_to_string(path).ok())
    .find_map(|content| ini_value(&content, section, key))
}

/// Default project: environment, then gcloud configuration
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    gcloud_property("core", "project").filter(|p| validate_project_id(p))
}

/// Default region: environment, then gcloud configuration
pub fn get_default_region() -> Option<String> {
    std::env::var("CLOUDSDK_COMPUTE_REGION")
        .ok()
        .or_else(|| gcloud_property("compute", "region"))
}

/// Default zone: environment, then gcloud configuration
pub fn get_default_zone() -> Option<String> {
    std::env::var("CLOUDSDK_COMPUTE_ZONE")
        .ok()
        .or_else(|| gcloud_property("compute", "zone"))
}

/// Region a zone belongs to (`us-central1-a` -> `us-central1`)
pub fn region_of_zone(zone: &str) -> &str {
    zone.rsplit_once('-').map_or(zone, |(region, _)| region)
}
