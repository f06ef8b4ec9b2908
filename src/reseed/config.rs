use crate::error::ReseedError;
use crate::reseed::migrate::MigrationMode;
use crate::reseed::paths::ReseedPaths;
use crate::reseed::registration::CommandTemplate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Environment variables that override values from the config file.
pub const ENV_OVERRIDES: &[&str] = &[
    "RESEED_SOURCE_PATH",
    "RESEED_NAME_FILTER",
    "RESEED_TARGET_PATH",
    "RESEED_TARGET_URL",
    "RESEED_USERNAME",
    "RESEED_PASSWORD",
    "RESEED_API_KEY",
    "RESEED_FUZZY",
    "RESEED_MODE",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: String,
    #[serde(default = "default_name_filter")]
    pub name_filter: String,
}

fn default_name_filter() -> String {
    "flac".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            name_filter: default_name_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetConfig {
    pub path: String,
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            program: "transmission-remote".to_string(),
            args: vec![
                "--add".to_string(),
                "{descriptor}".to_string(),
                "--start-paused".to_string(),
                "--download-dir".to_string(),
                "{dir}".to_string(),
            ],
            timeout_secs: Some(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub fuzzy: bool,
    #[serde(default)]
    pub mode: MigrationMode,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy: false,
            mode: MigrationMode::Move,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReseedConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub registration: RegistrationConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialReseedConfig {
    source: Option<SourceConfig>,
    target: Option<TargetConfig>,
    registration: Option<RegistrationConfig>,
    matching: Option<MatchingConfig>,
}

impl ReseedConfig {
    /// Placeholder values written by `reseed init-config`.
    pub fn template() -> Self {
        Self {
            source: SourceConfig {
                path: "/path/to/old/torrents".to_string(),
                name_filter: default_name_filter(),
            },
            target: TargetConfig {
                path: "/where/to/put/new/torrents".to_string(),
                url: "https://orpheus.network/".to_string(),
                username: String::new(),
                password: String::new(),
                api_key: None,
            },
            registration: RegistrationConfig::default(),
            matching: MatchingConfig::default(),
        }
    }

    pub fn source_root(&self) -> PathBuf {
        PathBuf::from(&self.source.path)
    }

    pub fn target_root(&self) -> PathBuf {
        PathBuf::from(&self.target.path)
    }

    pub fn registration_template(&self) -> Result<CommandTemplate, ReseedError> {
        CommandTemplate::from_config(&self.registration)
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_mode(var: &str, fallback: MigrationMode) -> MigrationMode {
    match env::var(var) {
        Ok(v) => v.trim().parse().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_optional(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

pub fn validate(cfg: &ReseedConfig) -> Result<(), ReseedError> {
    let invalid = |msg: &str| Err(ReseedError::InvalidConfig(msg.to_string()));

    if cfg.source.path.trim().is_empty() {
        return invalid("source.path cannot be empty");
    }
    if cfg.source.name_filter.trim().is_empty() {
        return invalid("source.name_filter cannot be empty");
    }
    if cfg.target.path.trim().is_empty() {
        return invalid("target.path cannot be empty");
    }
    if cfg.target.url.trim().is_empty() {
        return invalid("target.url cannot be empty");
    }
    let has_api_key = cfg
        .target
        .api_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty());
    let has_login = !cfg.target.username.trim().is_empty() && !cfg.target.password.is_empty();
    if !has_api_key && !has_login {
        return invalid("target credentials missing: set api_key or username and password");
    }
    if cfg.source_root() == cfg.target_root() {
        return invalid("source.path and target.path must differ");
    }
    cfg.registration_template()?;
    Ok(())
}

fn merge_file_config(base: &mut ReseedConfig, paths: &ReseedPaths) -> Result<()> {
    let path = &paths.config_file;
    if !path.exists() {
        return Ok(());
    }

    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PartialReseedConfig = toml::from_str(&raw).map_err(|err| {
        ReseedError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(source) = parsed.source {
        base.source = source;
    }
    if let Some(target) = parsed.target {
        base.target = target;
    }
    if let Some(registration) = parsed.registration {
        base.registration = registration;
    }
    if let Some(matching) = parsed.matching {
        base.matching = matching;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut ReseedConfig) {
    cfg.source.path = env_or_string("RESEED_SOURCE_PATH", &cfg.source.path);
    cfg.source.name_filter = env_or_string("RESEED_NAME_FILTER", &cfg.source.name_filter);
    cfg.target.path = env_or_string("RESEED_TARGET_PATH", &cfg.target.path);
    cfg.target.url = env_or_string("RESEED_TARGET_URL", &cfg.target.url);
    cfg.target.username = env_or_string("RESEED_USERNAME", &cfg.target.username);
    cfg.target.password = env_or_string("RESEED_PASSWORD", &cfg.target.password);
    cfg.target.api_key = env_optional("RESEED_API_KEY", cfg.target.api_key.take());
    cfg.matching.fuzzy = env_or_bool("RESEED_FUZZY", cfg.matching.fuzzy);
    cfg.matching.mode = env_or_mode("RESEED_MODE", cfg.matching.mode);
}

/// Load without validating; used by `status` to show whatever is configured.
pub fn load_unvalidated(paths: &ReseedPaths) -> Result<ReseedConfig> {
    let mut cfg = ReseedConfig::default();
    merge_file_config(&mut cfg, paths)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_config(paths: &ReseedPaths) -> Result<ReseedConfig> {
    let cfg = load_unvalidated(paths)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Write the template config. Refuses to clobber an existing file unless
/// `force` is set.
pub fn write_default_config(paths: &ReseedPaths, force: bool) -> Result<PathBuf> {
    let path = &paths.config_file;
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = toml::to_string_pretty(&ReseedConfig::template())
        .context("failed to render default config")?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.clone())
}
