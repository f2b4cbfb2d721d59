use crate::schema::TidingsConfig;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides `emitter.max_listeners` when set to a non-negative integer.
pub const MAX_LISTENERS_ENV: &str = "TIDINGS_MAX_LISTENERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Jsonc,
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;

        match ext {
            "jsonc" => Some(Self::Jsonc),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: TidingsConfig,
    pub path: PathBuf,
    pub format: ConfigFormat,
}

pub fn load_config(config_path: Option<&Path>) -> Result<TidingsConfig> {
    resolve_config(config_path).map(|r| r.config)
}

pub fn resolve_config(config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .or_else(find_config_file)
        .ok_or_else(|| anyhow!("No configuration file found"))?;

    load_config_from_file(&path)
}

pub fn load_config_from_file(path: &Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| anyhow!("Unknown config format for: {}", path.display()))?;

    let config = parse_config_content(&content, format)?;
    let config = apply_env_override(config, env::var(MAX_LISTENERS_ENV).ok().as_deref())?;

    Ok(ResolvedConfig {
        config,
        path: path.to_path_buf(),
        format,
    })
}

fn parse_config_content(content: &str, format: ConfigFormat) -> Result<TidingsConfig> {
    match format {
        ConfigFormat::Jsonc => json5::from_str(content).context("Failed to parse JSONC"),
        ConfigFormat::Json => serde_json::from_str(content).context("Failed to parse JSON"),
        ConfigFormat::Yaml => serde_yaml_ng::from_str(content).context("Failed to parse YAML"),
    }
}

fn apply_env_override(mut config: TidingsConfig, value: Option<&str>) -> Result<TidingsConfig> {
    if let Some(raw) = value {
        config.emitter.max_listeners = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {MAX_LISTENERS_ENV} value: {raw:?}"))?;
    }
    Ok(config)
}

const CONFIG_CANDIDATES: &[&str] = &[
    "tidings.jsonc",
    "tidings.json",
    "tidings.yml",
    "tidings.yaml",
    ".tidings.jsonc",
    ".tidings.json",
    ".tidings.yml",
    ".tidings.yaml",
];

fn global_config_dir() -> Option<PathBuf> {
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("tidings"))
}

fn find_config_file() -> Option<PathBuf> {
    find_all_config_files().into_iter().next()
}

/// Every existing candidate, local directory first, then the global one.
pub fn find_all_config_files() -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = CONFIG_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .collect();

    if let Some(dir) = global_config_dir() {
        found.extend(
            CONFIG_CANDIDATES
                .iter()
                .map(|c| dir.join(c))
                .filter(|p| p.exists()),
        );
    }

    found
}
