//! Runtime settings.
//!
//! Settings live in `config.json` inside the data directory. Every key is
//! optional; anything missing falls back to the defaults below.
//!
//! ```json
//! {
//!   "defaultTtlSecs": 7200,
//!   "commandTimeoutSecs": 60,
//!   "cleanOlderThanDays": 7,
//!   "cleanIntervalSecs": 3600,
//!   "recentAuditLimit": 20,
//!   "shellPrefix": "/bin/bash -c"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::paths::config_path;

pub const DEFAULT_TTL_SECS: u64 = 2 * 60 * 60;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CLEAN_OLDER_THAN_DAYS: u32 = 7;
pub const DEFAULT_CLEAN_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_RECENT_AUDIT_LIMIT: usize = 20;

/// Settings for an [`crate::engine::ApprovalEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WardenConfig {
    /// Root of all persisted state. Not read from `config.json`.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Approval window for proposals that don't set their own.
    pub default_ttl_secs: u64,

    /// Per-command time limit.
    pub command_timeout_secs: u64,

    /// Age after which finished records are removed by `clean`.
    pub clean_older_than_days: u32,

    /// Period of the background cleanup in `warden serve`.
    pub clean_interval_secs: u64,

    /// Number of audit entries included in stats.
    pub recent_audit_limit: usize,

    /// Shell invocation used to run commands (e.g. "/bin/bash -c").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_prefix: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            clean_older_than_days: DEFAULT_CLEAN_OLDER_THAN_DAYS,
            clean_interval_secs: DEFAULT_CLEAN_INTERVAL_SECS,
            recent_audit_limit: DEFAULT_RECENT_AUDIT_LIMIT,
            shell_prefix: None,
        }
    }
}

impl WardenConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_clean_older_than_days(mut self, days: u32) -> Self {
        self.clean_older_than_days = days;
        self
    }

    pub fn with_shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }

    /// The default approval window, or `None` if `default_ttl_secs` is too
    /// large to represent.
    pub fn default_ttl(&self) -> Option<chrono::Duration> {
        i64::try_from(self.default_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_secs.max(1))
    }
}

/// Load settings from `<data_dir>/config.json`.
///
/// A missing file is not an error; defaults are returned.
pub fn load_config(data_dir: &Path) -> Result<WardenConfig, StoreError> {
    let file_path = config_path(data_dir);

    if !file_path.exists() {
        return Ok(WardenConfig::new(data_dir));
    }

    let contents = fs::read_to_string(&file_path)?;
    let config: WardenConfig = serde_json::from_str(&contents)?;

    Ok(config.with_data_dir(data_dir))
}

/// Save settings to `<data_dir>/config.json`.
pub fn save_config(config: &WardenConfig) -> Result<(), StoreError> {
    fs::create_dir_all(&config.data_dir)?;

    let file_path = config_path(&config.data_dir);
    let temp_path = config.data_dir.join("config.json.tmp");

    let json = serde_json::to_string_pretty(config)?;
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, &file_path)?;

    Ok(())
}
