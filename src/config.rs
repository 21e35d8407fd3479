// Service configuration: constants, defaults and `REVIEW_*` environment overrides.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default lifetime of a cache entry in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default number of byte fetches allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 5;

/// Largest page the store accepts for a single list request.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// The cache sweep runs at this multiple of the TTL.
pub const SWEEP_INTERVAL_FACTOR: f64 = 1.1;

/// MIME type the store uses for folders (containers).
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type of editable structured-data files.
pub const JSON_MIME_TYPE: &str = "application/json";

/// Prefix for environment variables read by [`ServiceConfig::load`].
pub const ENV_PREFIX: &str = "REVIEW_";

/// Top-level configuration for the review service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP service binds to.
    pub listen_addr: String,
    /// Folder holding the source documents.
    pub markdown_root_id: String,
    /// Folder holding one sub-folder of editable files per document.
    pub json_root_id: String,
    /// Folder receiving promoted (approved) files.
    pub result_root_id: String,
    /// Store credentials: a raw bearer token or a JSON blob with `access_token`.
    pub credentials: String,
    /// Base URL of the store's metadata API.
    pub api_base_url: String,
    /// Base URL of the store's upload API.
    pub upload_base_url: String,
    /// Cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum number of concurrent byte fetches.
    pub max_concurrent_downloads: usize,
    /// Page size for list requests, clamped to [`MAX_PAGE_SIZE`].
    pub page_size: u32,
    /// Transport timeout for a single store request.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3001".to_string(),
            markdown_root_id: String::new(),
            json_root_id: String::new(),
            result_root_id: String::new(),
            credentials: String::new(),
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            page_size: MAX_PAGE_SIZE,
            request_timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Load defaults overlaid with `REVIEW_*` environment variables.
    pub fn load() -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("invalid review service configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("markdown_root_id", &self.markdown_root_id),
            ("json_root_id", &self.json_root_id),
            ("result_root_id", &self.result_root_id),
        ] {
            if value.trim().is_empty() {
                bail!("{}{} must be set", ENV_PREFIX, name.to_uppercase());
            }
        }
        if self.cache_ttl_secs == 0 {
            bail!("cache_ttl_secs must be > 0");
        }
        if self.max_concurrent_downloads == 0 {
            bail!("max_concurrent_downloads must be > 0");
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Page size actually sent to the store.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn roots(&self) -> CollectionRoots {
        CollectionRoots {
            markdown: self.markdown_root_id.clone(),
            json: self.json_root_id.clone(),
            result: self.result_root_id.clone(),
        }
    }
}

/// Root folder ids of the three collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRoots {
    pub markdown: String,
    pub json: String,
    pub result: String,
}
