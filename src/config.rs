use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dirs::home_dir;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".edustreakz";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_COMPLETION_MARKER: &str = "Completed";
const ENV_DB_PATH: &str = "EDUSTREAKZ_DB_PATH";
const ENV_JWT_SECRET: &str = "EDUSTREAKZ_JWT_SECRET";
const ENV_PORT: &str = "EDUSTREAKZ_PORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub api_port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: Option<String>,
    pub token_ttl_minutes: i64,
    pub completion_marker: String,
    pub leaderboard_limit: usize,
    pub cors_origins: Vec<String>,
    pub community_message: String,
    pub support_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            api_port: 3000,
            db_path: default_root_dir().join("db").join("edustreakz.db"),
            jwt_secret: None,
            token_ttl_minutes: 60,
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
            leaderboard_limit: 3,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "https://edu-streakz.vercel.app".to_string(),
            ],
            community_message: "Praat mee in onze community en deel je voortgang!".to_string(),
            support_email: "support@edustreakz.com".to_string(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(&config_path)?;

        Ok(())
    }

    /// Generates a signing secret when none is configured. Returns whether
    /// the config changed and should be saved.
    pub fn ensure_jwt_secret(&mut self) -> bool {
        if self.jwt_secret.as_deref().is_some_and(|secret| !secret.is_empty()) {
            return false;
        }

        let mut bytes = [0_u8; 32];
        OsRng.fill_bytes(&mut bytes);
        self.jwt_secret = Some(URL_SAFE_NO_PAD.encode(bytes));
        true
    }

    pub fn jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .context("jwt_secret is not configured")
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|value| !value.trim().is_empty()) {
            self.db_path = expand_home(path.trim());
        }
        if let Some(secret) = lookup(ENV_JWT_SECRET).filter(|value| !value.is_empty()) {
            self.jwt_secret = Some(secret);
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.api_port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| anyhow!("{ENV_PORT} must be a port number"))?;
        }

        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "bind_address" => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    bail!("bind_address must not be empty");
                }
                self.bind_address = trimmed.to_string();
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "db_path" => {
                self.db_path = expand_home(value.trim());
            }
            "jwt_secret" => {
                self.jwt_secret = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "token_ttl_minutes" => {
                let minutes = value
                    .parse::<i64>()
                    .map_err(|_| anyhow!("token_ttl_minutes must be a number"))?;
                if minutes <= 0 {
                    bail!("token_ttl_minutes must be positive");
                }
                self.token_ttl_minutes = minutes;
            }
            "completion_marker" => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    bail!("completion_marker must not be empty");
                }
                self.completion_marker = trimmed.to_string();
            }
            "leaderboard_limit" => {
                self.leaderboard_limit = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("leaderboard_limit must be a number"))?
                    .clamp(1, 100);
            }
            "cors_origins" => {
                self.cors_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| part.trim_end_matches('/').to_string())
                    .collect::<Vec<_>>();
            }
            "community_message" => {
                self.community_message = value.to_string();
            }
            "support_email" => {
                self.support_email = value.trim().to_string();
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: bind_address|api.bind, api_port|api.port, db_path|db.path, jwt_secret|auth.jwt_secret, token_ttl_minutes|auth.token_ttl_minutes, completion_marker|streak.completion_marker, leaderboard_limit|leaderboard.limit, cors_origins|api.cors_origins, community_message|community.message, support_email|community.support_email"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "bind_address" => Some(self.bind_address.clone()),
            "api_port" => Some(self.api_port.to_string()),
            "db_path" => Some(self.db_path.display().to_string()),
            "jwt_secret" => Some(
                self.jwt_secret
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "token_ttl_minutes" => Some(self.token_ttl_minutes.to_string()),
            "completion_marker" => Some(self.completion_marker.clone()),
            "leaderboard_limit" => Some(self.leaderboard_limit.to_string()),
            "cors_origins" => Some(self.cors_origins.join(",")),
            "community_message" => Some(self.community_message.clone()),
            "support_email" => Some(self.support_email.clone()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "bind_address" | "api.bind" => "bind_address",
        "api_port" | "api.port" => "api_port",
        "db_path" | "db.path" => "db_path",
        "jwt_secret" | "auth.jwt_secret" => "jwt_secret",
        "token_ttl_minutes" | "auth.token_ttl_minutes" => "token_ttl_minutes",
        "completion_marker" | "streak.completion_marker" => "completion_marker",
        "leaderboard_limit" | "leaderboard.limit" => "leaderboard_limit",
        "cors_origins" | "api.cors_origins" => "cors_origins",
        "community_message" | "community.message" => "community_message",
        "support_email" | "community.support_email" => "support_email",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
