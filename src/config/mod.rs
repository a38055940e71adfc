//! Runtime configuration.
//!
//! The bot token comes from the environment and is required before
//! anything starts polling; a missing token fails at startup, not
//! mid-session. Everything else (allowlist, tool override, scratch root)
//! is optional and read from a TOML file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable holding the Telegram bot token.
pub const TOKEN_ENV: &str = "BOT_TOKEN";
/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "PAPERPRESS_CONFIG";

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Telegram usernames or numeric user ids allowed to talk to the bot;
    /// `*` is a wildcard. With no config file the bot is open to everyone.
    pub allowed_users: Vec<String>,
    /// Explicit path to the PDF compression executable; PATH lookup when
    /// absent.
    pub pdf_tool: Option<PathBuf>,
    /// Root under which per-chat scratch directories are created.
    pub scratch_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    allowed_users: Vec<String>,
    #[serde(default)]
    pdf_tool: Option<PathBuf>,
    #[serde(default)]
    scratch_root: Option<PathBuf>,
}

impl Config {
    /// Load configuration, failing fast when the bot token is missing.
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let bot_token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| {
                format!("{TOKEN_ENV} is not set; export your Telegram bot token before starting")
            })?;

        let file = Self::read_file(path_override)?;
        Ok(Self::from_parts(bot_token, file))
    }

    fn from_parts(bot_token: String, file: FileConfig) -> Self {
        let allowed_users = if file.allowed_users.is_empty() {
            vec!["*".to_string()]
        } else {
            file.allowed_users
        };
        Self {
            bot_token,
            allowed_users,
            pdf_tool: file.pdf_tool,
            scratch_root: file.scratch_root.unwrap_or_else(std::env::temp_dir),
        }
    }

    fn read_file(path_override: Option<&Path>) -> Result<FileConfig> {
        // An explicitly requested file must exist; the default location
        // is optional.
        if let Some(path) = path_override {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            return toml::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()));
        }

        let candidate = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(Self::default_path);

        match candidate {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            _ => Ok(FileConfig::default()),
        }
    }

    fn default_path() -> Option<PathBuf> {
        directories::UserDirs::new().map(|d| d.home_dir().join(".paperpress").join("config.toml"))
    }
}
