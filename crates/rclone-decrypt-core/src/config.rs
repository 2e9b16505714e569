//! Settings model and platform default resolution.
//!
//! Defaults are resolved once at the call boundary: CLI flags win over the
//! settings file, which wins over the platform conventions below.

use crate::error::{DecryptError, DecryptResult};
use directories_next::{BaseDirs, ProjectDirs, UserDirs};
use log::debug;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_PATH_ENV: &str = "RCLONE_DECRYPT_SETTINGS";
pub const RCLONE_CONFIG_ENV: &str = "RCLONE_CONFIG";
const SETTINGS_FILE_NAME: &str = "settings.toml";
const OUTPUT_DIR_NAME: &str = "rclone-decrypted";
const APP_QUALIFIER: &str = "io";
const APP_ORGANIZATION: &str = "rclone-decrypt";
const APP_NAME: &str = "rclone-decrypt";

/// Where rclone itself looks for its configuration on this platform.
///
/// `RCLONE_CONFIG` wins, matching rclone's own lookup order.
pub fn default_rclone_config_path() -> PathBuf {
    if let Some(path) = env::var_os(RCLONE_CONFIG_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(path);
    }

    if cfg!(windows) {
        let base = env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(home_dir);
        return base.join("rclone").join("rclone.conf");
    }

    home_dir().join(".config").join("rclone").join("rclone.conf")
}

/// `<downloads>/rclone-decrypted`, falling back to `~/Downloads`.
pub fn default_output_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| home_dir().join("Downloads"))
        .join(OUTPUT_DIR_NAME)
}

fn home_dir() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// How the external tool is located and bounded.
#[derive(Debug, Clone, Deserialize)]
pub struct RcloneCfg {
    #[serde(default)]
    pub binary_path: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for RcloneCfg {
    fn default() -> Self {
        Self {
            binary_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Optional overrides for the platform default locations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsCfg {
    #[serde(default)]
    pub rclone_config: Option<String>,

    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Settings snapshot, either loaded from disk or defaulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecryptSettings {
    #[serde(default)]
    pub rclone: RcloneCfg,

    #[serde(default)]
    pub paths: PathsCfg,

    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl DecryptSettings {
    /// Per-user settings location.
    pub fn user_settings_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    /// Read a settings file, choosing TOML or YAML by extension.
    pub fn load<P: AsRef<Path>>(path: P) -> DecryptResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            DecryptError::InvalidSettings(format!("unable to read {}: {err}", path.display()))
        })?;
        let is_toml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("toml")
        );
        let mut settings = if is_toml {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        settings.path = Some(path.to_path_buf());

        let issues = settings.validate();
        if !issues.is_empty() {
            return Err(DecryptError::InvalidSettings(issues.join("; ")));
        }
        Ok(settings)
    }

    /// Resolve and load settings.
    ///
    /// An explicit path (argument or `RCLONE_DECRYPT_SETTINGS`) must exist. The
    /// per-user file is optional; without it the defaults apply.
    pub fn load_or_default(explicit: Option<&Path>) -> DecryptResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = env::var_os(SETTINGS_PATH_ENV).filter(|value| !value.is_empty()) {
            return Self::load(PathBuf::from(path));
        }

        match Self::user_settings_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => {
                debug!("no settings file found; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Best-effort validation; returns human-readable issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.rclone.timeout_secs == 0 {
            issues.push("rclone.timeout_secs must be greater than 0".to_string());
        }
        if let Some(binary) = &self.rclone.binary_path {
            if binary.trim().is_empty() {
                issues.push("rclone.binary_path must not be empty when set".to_string());
            }
        }
        if let Some(config) = &self.paths.rclone_config {
            if config.trim().is_empty() {
                issues.push("paths.rclone_config must not be empty when set".to_string());
            }
        }
        if let Some(output) = &self.paths.output_dir {
            if output.trim().is_empty() {
                issues.push("paths.output_dir must not be empty when set".to_string());
            }
        }

        issues
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.rclone.timeout_secs)
    }

    /// Optional override for the `rclone` binary.
    pub fn binary_path(&self) -> Option<PathBuf> {
        self.rclone
            .binary_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    pub fn rclone_config_path(&self) -> PathBuf {
        self.paths
            .rclone_config
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_rclone_config_path)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.paths
            .output_dir
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_output_dir)
    }
}
