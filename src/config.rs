use crate::error::{ErrorContext, UploadError};
use crate::upload_pipeline::{
    DEFAULT_BASE_QUALITY, DEFAULT_CONCURRENCY_WIDTH, DEFAULT_HUGE_FILE_BYTES,
    DEFAULT_HUGE_FILE_QUALITY, DEFAULT_LARGE_FILE_BYTES, DEFAULT_LARGE_FILE_QUALITY,
    DEFAULT_MAX_DIMENSION, DEFAULT_RELAY_BATCH_SIZE, DEFAULT_RELAY_THRESHOLD_BYTES,
    DEFAULT_SMALL_FILE_BYTES, MAX_FILE_BYTES,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVER_URL_ENV: &str = "STUDIO_UPLOADER_SERVER_URL";
pub const API_KEY_ENV: &str = "STUDIO_UPLOADER_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploaderConfig {
    #[serde(rename = "serverUrl")]
    pub server_url: Option<String>,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub tunables: UploadTunables,
}

/// Hand-tuned pipeline knobs. Every field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadTunables {
    /// Files at or below this size are relayed through the application server
    pub relay_threshold_bytes: u64,
    /// Maximum simultaneous direct transfers per window
    pub concurrency_width: usize,
    /// Files per relay request
    pub relay_batch_size: usize,
    /// Hard per-file ceiling; larger files fail without a network call
    pub max_file_bytes: u64,
    pub compression: CompressionSettings,
}

impl Default for UploadTunables {
    fn default() -> Self {
        Self {
            relay_threshold_bytes: DEFAULT_RELAY_THRESHOLD_BYTES,
            concurrency_width: DEFAULT_CONCURRENCY_WIDTH,
            relay_batch_size: DEFAULT_RELAY_BATCH_SIZE,
            max_file_bytes: MAX_FILE_BYTES,
            compression: CompressionSettings::default(),
        }
    }
}

impl UploadTunables {
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.concurrency_width == 0 {
            return Err(UploadError::Config(
                "concurrencyWidth must be at least 1".to_string(),
            ));
        }
        if self.relay_batch_size == 0 {
            return Err(UploadError::Config(
                "relayBatchSize must be at least 1".to_string(),
            ));
        }
        self.compression.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionSettings {
    /// Files at or below this size are never re-encoded
    pub small_file_bytes: u64,
    /// Longest allowed edge after downscaling, in pixels
    pub max_dimension: u32,
    pub base_quality: u8,
    pub large_file_bytes: u64,
    pub large_file_quality: u8,
    pub huge_file_bytes: u64,
    pub huge_file_quality: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            small_file_bytes: DEFAULT_SMALL_FILE_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            base_quality: DEFAULT_BASE_QUALITY,
            large_file_bytes: DEFAULT_LARGE_FILE_BYTES,
            large_file_quality: DEFAULT_LARGE_FILE_QUALITY,
            huge_file_bytes: DEFAULT_HUGE_FILE_BYTES,
            huge_file_quality: DEFAULT_HUGE_FILE_QUALITY,
        }
    }
}

impl CompressionSettings {
    pub fn validate(&self) -> Result<(), UploadError> {
        for (name, quality) in [
            ("baseQuality", self.base_quality),
            ("largeFileQuality", self.large_file_quality),
            ("hugeFileQuality", self.huge_file_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(UploadError::Config(format!(
                    "{} must be between 1 and 100, got {}",
                    name, quality
                )));
            }
        }
        if self.max_dimension == 0 {
            return Err(UploadError::Config(
                "maxDimension must be at least 1".to_string(),
            ));
        }
        if self.huge_file_bytes < self.large_file_bytes {
            return Err(UploadError::Config(
                "hugeFileBytes must not be smaller than largeFileBytes".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn get_config_dir() -> Result<PathBuf, UploadError> {
    dirs::home_dir()
        .map(|home_dir| home_dir.join(".studio-uploader"))
        .ok_or_else(|| UploadError::Config("Could not find home directory".to_string()))
}

pub fn get_config_file_path() -> Result<PathBuf, UploadError> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, UploadError> {
    Ok(get_config_dir()?.join("logs"))
}

/// Create a directory readable only by its owner
pub fn ensure_private_dir(dir: &Path) -> Result<(), UploadError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

pub fn ensure_logs_dir() -> Result<PathBuf, UploadError> {
    let logs_dir = get_logs_dir()?;
    ensure_private_dir(&logs_dir)?;
    Ok(logs_dir)
}

/// Load the config from the default location, then apply environment overrides
pub fn load_config() -> Result<UploaderConfig, UploadError> {
    let mut config = load_config_from(&get_config_file_path()?)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn load_config_from(config_file: &Path) -> Result<UploaderConfig, UploadError> {
    if !config_file.exists() {
        return Ok(UploaderConfig::default());
    }

    let content = fs::read_to_string(config_file)?;
    let config: UploaderConfig = serde_json::from_str(&content)?;
    config
        .tunables
        .validate()
        .context(&format!("Invalid tunables in {}", config_file.display()))?;
    Ok(config)
}

pub fn save_config(config: &UploaderConfig) -> Result<(), UploadError> {
    save_config_to(config, &get_config_file_path()?)
}

pub fn save_config_to(config: &UploaderConfig, config_file: &Path) -> Result<(), UploadError> {
    if let Some(parent) = config_file.parent() {
        ensure_private_dir(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_file, content)?;

    // Set permissions to 600 (read/write for owner only) on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(config_file)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(config_file, permissions)?;
    }

    Ok(())
}

fn apply_env_overrides(config: &mut UploaderConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(server_url) = lookup(SERVER_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.server_url = Some(server_url);
    }
    if let Some(api_key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
        config.api_key = Some(api_key);
    }
}
