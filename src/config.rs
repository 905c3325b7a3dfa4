use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Path, relative to the endpoint base, of the reply-generation function.
pub const REPLIES_PATH: &str = "functions/v1/generate-replies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Casual,
    Formal,
    Friendly,
    Witty,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Casual => "casual",
            Tone::Formal => "formal",
            Tone::Friendly => "friendly",
            Tone::Witty => "witty",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the background service needs to reach the reply endpoint.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleServiceConfig {
    pub endpoint: Option<String>,
    pub credential: Option<String>,
    pub tone: Tone,
}

impl fmt::Debug for BubbleServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BubbleServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("tone", &self.tone)
            .finish()
    }
}

impl BubbleServiceConfig {
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>, tone: Tone) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            credential: Some(credential.into()),
            tone,
        }
    }

    pub fn is_configured(&self) -> bool {
        non_blank(&self.endpoint).is_some() && non_blank(&self.credential).is_some()
    }

    /// Full URL of the reply function, if an endpoint is set.
    pub fn replies_url(&self) -> Option<String> {
        non_blank(&self.endpoint)
            .map(|base| format!("{}/{REPLIES_PATH}", base.trim_end_matches('/')))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// TOML file holding the persisted [`BubbleServiceConfig`].
///
/// Nothing is cached: every `load` reads the file again, because the writer may
/// be a different process.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file yields the unconfigured default.
    pub fn load(&self) -> Result<BubbleServiceConfig> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BubbleServiceConfig::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config {}", self.path.display()));
            }
        };
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", self.path.display()))
    }

    pub fn save(&self, config: &BubbleServiceConfig) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        let raw = toml::to_string_pretty(config).context("failed to serialize config")?;
        let staging = self.path.with_extension("toml.tmp");
        std::fs::write(&staging, raw)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        std::fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace config {}", self.path.display()))?;
        Ok(())
    }
}
