//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is not usable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Optical drive configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveConfig {
    /// Device path of the drive (default `/dev/sr0`)
    #[serde(default = "default_drive_path")]
    pub path: PathBuf,
    /// Numeric index passed to the video extraction tool.
    /// Derived from the trailing digits of `path` when unset.
    #[serde(default)]
    pub index: Option<u32>,
    /// Directory under which per-drive mount points are created
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    /// Leave the disc in the tray after ingestion
    #[serde(default)]
    pub skip_eject: bool,
    /// Prefix mount, umount and eject with `sudo`
    #[serde(default = "default_true")]
    pub use_sudo: bool,
}

fn default_drive_path() -> PathBuf {
    PathBuf::from("/dev/sr0")
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("./mnt")
}

fn default_true() -> bool {
    true
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            path: default_drive_path(),
            index: None,
            mount_root: default_mount_root(),
            skip_eject: false,
            use_sudo: true,
        }
    }
}

/// Staging and output locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    #[serde(default = "default_dvd_output")]
    pub dvd_output: PathBuf,
    #[serde(default = "default_redbook_output")]
    pub redbook_output: PathBuf,
    #[serde(default = "default_iso_output")]
    pub iso_output: PathBuf,
    #[serde(default = "default_bluray_output")]
    pub bluray_output: PathBuf,
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("./wip")
}

fn default_dvd_output() -> PathBuf {
    PathBuf::from("./dvd")
}

fn default_redbook_output() -> PathBuf {
    PathBuf::from("./redbook")
}

fn default_iso_output() -> PathBuf {
    PathBuf::from("./iso")
}

fn default_bluray_output() -> PathBuf {
    PathBuf::from("./bluray")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_root: default_staging_root(),
            dvd_output: default_dvd_output(),
            redbook_output: default_redbook_output(),
            iso_output: default_iso_output(),
            bluray_output: default_bluray_output(),
        }
    }
}

/// Disc ingestion loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Delay between ingestion cycles (default 2 seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    2
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Transcode watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    /// Delay between staging scans (default 30 seconds)
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// How long a file's size must hold still before it counts as complete
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Files smaller than this are still initializing and are not checked
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_settle_secs() -> u64 {
    10
}

fn default_min_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            settle_secs: default_settle_secs(),
            min_file_bytes: default_min_file_bytes(),
        }
    }
}

/// Extraction key refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyRefreshConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Settings file holding the `app_Key` line.
    /// Defaults to `~/.MakeMKV/settings.conf`.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
    /// Page the current key is published on
    #[serde(default = "default_key_url")]
    pub url: String,
}

fn default_key_url() -> String {
    "https://forum.makemkv.com/forum/viewtopic.php?t=1053".to_string()
}

impl Default for KeyRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            settings_path: None,
            url: default_key_url(),
        }
    }
}

impl KeyRefreshConfig {
    /// Settings file path with the home-directory default applied
    pub fn resolved_settings_path(&self) -> Option<PathBuf> {
        self.settings_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".MakeMKV").join("settings.conf")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub key_refresh: KeyRefreshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parse the boolean spellings accepted in environment variables
fn parse_env_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - DISC_DRIVE -> drive.path
    /// - DISC_DRIVE_INDEX -> drive.index
    /// - DISC_MOUNT_ROOT -> drive.mount_root
    /// - DISC_SKIP_EJECT -> drive.skip_eject
    /// - DISC_STAGING_ROOT, DISC_DVD_OUTPUT, DISC_REDBOOK_OUTPUT,
    ///   DISC_ISO_OUTPUT, DISC_BLURAY_OUTPUT -> paths.*
    /// - DISC_SETTLE_SECS -> watcher.settle_secs
    /// - DISC_MIN_FILE_BYTES -> watcher.min_file_bytes
    /// - DISC_KEY_REFRESH -> key_refresh.enabled
    /// - DISC_KEY_SETTINGS_PATH -> key_refresh.settings_path
    /// - DISC_DEBUG -> logging.debug
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("DISC_DRIVE") {
            if !val.is_empty() {
                self.drive.path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("DISC_DRIVE_INDEX") {
            if let Ok(index) = val.parse::<u32>() {
                self.drive.index = Some(index);
            }
        }

        if let Ok(val) = env::var("DISC_MOUNT_ROOT") {
            if !val.is_empty() {
                self.drive.mount_root = PathBuf::from(val);
            }
        }

        if let Some(skip) = env::var("DISC_SKIP_EJECT").ok().as_deref().and_then(parse_env_bool) {
            self.drive.skip_eject = skip;
        }

        let path_overrides: [(&str, &mut PathBuf); 5] = [
            ("DISC_STAGING_ROOT", &mut self.paths.staging_root),
            ("DISC_DVD_OUTPUT", &mut self.paths.dvd_output),
            ("DISC_REDBOOK_OUTPUT", &mut self.paths.redbook_output),
            ("DISC_ISO_OUTPUT", &mut self.paths.iso_output),
            ("DISC_BLURAY_OUTPUT", &mut self.paths.bluray_output),
        ];
        for (var, target) in path_overrides {
            if let Ok(val) = env::var(var) {
                if !val.is_empty() {
                    *target = PathBuf::from(val);
                }
            }
        }

        if let Ok(val) = env::var("DISC_SETTLE_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.watcher.settle_secs = secs;
            }
        }

        if let Ok(val) = env::var("DISC_MIN_FILE_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.watcher.min_file_bytes = bytes;
            }
        }

        if let Some(enabled) = env::var("DISC_KEY_REFRESH").ok().as_deref().and_then(parse_env_bool) {
            self.key_refresh.enabled = enabled;
        }

        if let Ok(val) = env::var("DISC_KEY_SETTINGS_PATH") {
            if !val.is_empty() {
                self.key_refresh.settings_path = Some(PathBuf::from(val));
            }
        }

        if let Some(debug) = env::var("DISC_DEBUG").ok().as_deref().and_then(parse_env_bool) {
            self.logging.debug = debug;
        }
    }

    /// Reject values that would stall or spin the loops
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "ingest.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.watcher.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "watcher.scan_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.watcher.settle_secs == 0 {
            return Err(ConfigError::Invalid(
                "watcher.settle_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
