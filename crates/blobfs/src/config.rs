//! Backend configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `BLOBFS_PATH`: Storage root
//! - `BLOBFS_PUB_PATH`: Public root (URL or URL path prefix)
//! - `BLOBFS_AUTO_CREATE`: "false" or "0" to refuse creating a missing root
//! - `BLOBFS_UMASK`: Octal umask, e.g. "022" or "0o027"
//!
//! Default storage root: `~/.blobfs/storage`

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Umask used when none is configured.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Configuration for the filesystem backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Storage root. Objects live at `{path}/{bucket}/{s1}/{s2}/{name}`.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Public root used to build URLs. Never written to.
    #[serde(default = "default_pub_path")]
    pub pub_path: String,

    /// Create `path` if it is missing.
    #[serde(default = "default_true")]
    pub auto_create_path: bool,

    /// Permission mask for created directories and stored files.
    /// `None` falls back to [`DEFAULT_UMASK`].
    #[serde(
        default,
        deserialize_with = "deserialize_umask",
        skip_serializing_if = "Option::is_none"
    )]
    pub umask: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_pub_path() -> String {
    "/storage".to_string()
}

/// Get the default storage root (~/.blobfs/storage).
fn default_storage_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".blobfs").join("storage"))
        .unwrap_or_else(|| PathBuf::from(".blobfs/storage"))
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            pub_path: default_pub_path(),
            auto_create_path: true,
            umask: None,
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("BLOBFS_PATH") {
            config.path = expand_path(&v);
        }
        if let Some(v) = lookup("BLOBFS_PUB_PATH") {
            config.pub_path = v;
        }
        if let Some(v) = lookup("BLOBFS_AUTO_CREATE") {
            config.auto_create_path = parse_bool(&v)
                .with_context(|| format!("invalid BLOBFS_AUTO_CREATE: {v:?}"))?;
        }
        if let Some(v) = lookup("BLOBFS_UMASK") {
            config.umask =
                Some(parse_umask(&v).with_context(|| format!("invalid BLOBFS_UMASK: {v:?}"))?);
        }

        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[blobfs]` section:
    /// ```toml
    /// [blobfs]
    /// path = "/srv/blobfs"
    /// pub_path = "https://files.example.com/"
    /// auto_create_path = true
    /// umask = "027"
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        if let Some(section) = table.get("blobfs") {
            let mut config: BackendConfig = section
                .clone()
                .try_into()
                .context("failed to parse [blobfs] section")?;
            config.path = expand_path(&config.path.to_string_lossy());
            Ok(config)
        } else {
            // No [blobfs] section, fall back to env
            Self::from_env()
        }
    }

    /// Create a config with a specific storage root.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the public root.
    pub fn with_pub_path(mut self, pub_path: impl Into<String>) -> Self {
        self.pub_path = pub_path.into();
        self
    }

    /// Set an explicit umask.
    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = Some(umask);
        self
    }

    /// Refuse to create a missing storage root.
    pub fn without_auto_create(mut self) -> Self {
        self.auto_create_path = false;
        self
    }

    /// The umask that will actually be applied.
    pub fn effective_umask(&self) -> u32 {
        self.umask.unwrap_or(DEFAULT_UMASK)
    }
}

/// Parse an octal umask such as "022", "0022" or "0o027".
pub fn parse_umask(value: &str) -> Result<u32> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let umask = u32::from_str_radix(digits, 8)
        .with_context(|| format!("not an octal number: {value:?}"))?;
    if umask > 0o777 {
        bail!("umask out of range: {value:?}");
    }
    Ok(umask)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("expected true or false, got {other:?}"),
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Accept a umask as a TOML integer or as an octal string.
///
/// A bare TOML integer is taken literally, so `umask = 18` and `umask = "022"`
/// mean the same thing.
fn deserialize_umask<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(v)) if v <= 0o777 => Ok(Some(v)),
        Some(Raw::Int(v)) => Err(serde::de::Error::custom(format!(
            "umask out of range: {v:o}"
        ))),
        Some(Raw::Str(s)) => parse_umask(&s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("{e:#}"))),
    }
}
