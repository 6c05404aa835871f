//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Job API endpoint and timeouts.
    pub api: ApiCfg,
    /// Identity service used for session refresh.
    pub auth: AuthCfg,
    /// Object storage holding uploaded PDFs.
    pub storage: StorageCfg,
    /// Client-side upload validation limits.
    pub upload: UploadCfg,
    /// Job list pagination.
    pub list: ListCfg,
    /// How processing jobs are kept fresh.
    pub sync: SyncCfg,
    /// First-run wizard state.
    pub onboarding: OnboardingCfg,
}

/// Job API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCfg {
    /// Base URL of the job API, no trailing slash.
    pub base_url: String,
    /// Default per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Shorter timeout used only for health checks.
    pub health_timeout_ms: u64,
}

/// Identity service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCfg {
    /// Base URL of the identity service, no trailing slash.
    pub base_url: String,
    /// Publishable key sent as the `apikey` header.
    pub anon_key: String,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCfg {
    /// Base URL of the storage service, no trailing slash.
    pub base_url: String,
    /// Bucket that receives uploaded PDFs.
    pub bucket: String,
    /// Whether the bucket serves objects publicly. When false,
    /// a time-bounded signed URL is requested instead.
    pub public_bucket: bool,
    /// Validity of signed URLs in seconds.
    pub signed_url_expiry_secs: u64,
}

/// Upload validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCfg {
    /// Maximum accepted PDF size in megabytes.
    pub max_size_mb: u64,
}

impl UploadCfg {
    /// Size cap in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

/// Pagination settings for the job list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCfg {
    /// Fixed page size requested from the API.
    pub page_limit: u32,
}

/// Strategy for keeping processing jobs fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fixed-interval refetch of each processing job.
    Polling,
    /// Per-job event stream from the backend.
    Push,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCfg {
    /// Selected update-feed strategy.
    pub mode: SyncMode,
    /// Poll interval in milliseconds (polling mode only).
    pub poll_interval_ms: u64,
}

/// First-run wizard state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingCfg {
    /// Set once the user finishes (or skips through) the wizard.
    pub completed: bool,
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiCfg {
                base_url: "http://localhost:3000".into(),
                timeout_ms: 15_000,
                health_timeout_ms: 5_000,
            },
            auth: AuthCfg {
                base_url: "".into(),
                anon_key: "".into(),
            },
            storage: StorageCfg {
                base_url: "".into(),
                bucket: "pdfs".into(),
                public_bucket: false,
                signed_url_expiry_secs: 3600,
            },
            upload: UploadCfg { max_size_mb: 10 },
            list: ListCfg { page_limit: 10 },
            sync: SyncCfg {
                mode: SyncMode::Polling,
                poll_interval_ms: 3_000,
            },
            onboarding: OnboardingCfg { completed: false },
        }
    }
}
