use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use crate::signature::PhotoEncoding;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },
    #[error("match_threshold must be within [-1, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("capture_timeout_ms must be greater than zero")]
    ZeroCaptureTimeout,
}

/// Photo format stored with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoFormat {
    #[default]
    Png,
    Jpeg,
}

/// Message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

/// Runtime configuration shared by the daemon and the CLI.
///
/// Sources, lowest precedence first: built-in defaults, the TOML file named
/// by `LOOKALIKE_CONFIG` (or `$XDG_CONFIG_HOME/lookalike/config.toml`), then
/// `LOOKALIKE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// A record matches only when its correlation strictly exceeds this.
    pub match_threshold: f64,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames discarded at the start of every capture (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Longest wait for a single camera frame.
    pub capture_timeout_ms: u64,
    pub photo_format: PhotoFormat,
    pub jpeg_quality: u8,
    /// Keep decoded signatures of stored photos between requests.
    pub signature_cache: bool,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            db_path: data_dir().join("records.db"),
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            warmup_frames: 4,
            capture_timeout_ms: 2_000,
            photo_format: PhotoFormat::Png,
            jpeg_quality: 90,
            signature_cache: true,
            busy_timeout_ms: 5_000,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("LOOKALIKE_CONFIG").ok().map(PathBuf::from);
        let path = explicit.clone().unwrap_or_else(default_config_path);

        let mut config = if path.exists() || explicit.is_some() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from `LOOKALIKE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from any key/value source using the `LOOKALIKE_*`
    /// names. A value that does not parse is an error, never ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str| lookup(key).map(|value| (key, value));

        if let Some(v) = parse_var(var("LOOKALIKE_MATCH_THRESHOLD"))? {
            self.match_threshold = v;
        }
        if let Some((_, path)) = var("LOOKALIKE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some((_, device)) = var("LOOKALIKE_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Some(v) = parse_var(var("LOOKALIKE_CAPTURE_WIDTH"))? {
            self.capture_width = v;
        }
        if let Some(v) = parse_var(var("LOOKALIKE_CAPTURE_HEIGHT"))? {
            self.capture_height = v;
        }
        if let Some(v) = parse_var(var("LOOKALIKE_WARMUP_FRAMES"))? {
            self.warmup_frames = v;
        }
        if let Some(v) = parse_var(var("LOOKALIKE_CAPTURE_TIMEOUT_MS"))? {
            self.capture_timeout_ms = v;
        }
        if let Some(v) = parse_var(var("LOOKALIKE_JPEG_QUALITY"))? {
            self.jpeg_quality = v;
        }
        if let Some(v) = parse_var(var("LOOKALIKE_BUSY_TIMEOUT_MS"))? {
            self.busy_timeout_ms = v;
        }
        if let Some((key, value)) = var("LOOKALIKE_SIGNATURE_CACHE") {
            self.signature_cache = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::Env { key, value }),
            };
        }
        if let Some((key, value)) = var("LOOKALIKE_PHOTO_FORMAT") {
            self.photo_format = match value.as_str() {
                "png" => PhotoFormat::Png,
                "jpeg" | "jpg" => PhotoFormat::Jpeg,
                _ => return Err(ConfigError::Env { key, value }),
            };
        }
        if let Some((key, value)) = var("LOOKALIKE_BUS") {
            self.bus = match value.as_str() {
                "session" => BusKind::Session,
                "system" => BusKind::System,
                _ => return Err(ConfigError::Env { key, value }),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.match_threshold));
        }
        if self.capture_timeout_ms == 0 {
            return Err(ConfigError::ZeroCaptureTimeout);
        }
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn photo_encoding(&self) -> PhotoEncoding {
        match self.photo_format {
            PhotoFormat::Png => PhotoEncoding::Png,
            PhotoFormat::Jpeg => PhotoEncoding::Jpeg {
                quality: self.jpeg_quality,
            },
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
        .join("lookalike")
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("lookalike/config.toml")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn parse_var<T: FromStr>(var: Option<(&'static str, String)>) -> Result<Option<T>, ConfigError> {
    match var {
        None => Ok(None),
        Some((key, value)) => match value.trim().parse() {
            Ok(v) => Ok(Some(v)),
            Err(_) => Err(ConfigError::Env { key, value }),
        },
    }
}
