#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_THUMBNAIL_WORKERS: usize = 4;
const CACHE_SUBDIR: &str = "newtube-sync/thumbnails";

pub const API_URL_KEY: &str = "NEWTUBE_API_URL";
pub const CACHE_DIR_KEY: &str = "NEWTUBE_CACHE_DIR";
pub const FFMPEG_KEY: &str = "NEWTUBE_FFMPEG";
pub const TIMEOUT_KEY: &str = "NEWTUBE_TIMEOUT_SECS";
pub const THUMBNAIL_WORKERS_KEY: &str = "NEWTUBE_THUMBNAIL_WORKERS";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Base endpoint of the download server, without a trailing slash.
    pub api_url: String,
    pub cache_dir: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub request_timeout: Duration,
    pub thumbnail_workers: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub api_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub ffmpeg_bin: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<ClientSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> ClientSettings {
    let api_url = overrides
        .api_url
        .filter(|value| !value.trim().is_empty())
        .or_else(|| lookup_value(API_URL_KEY, file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let cache_dir = overrides
        .cache_dir
        .or_else(|| lookup_value(CACHE_DIR_KEY, file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| env::temp_dir().join(CACHE_SUBDIR));
    let ffmpeg_bin = overrides
        .ffmpeg_bin
        .or_else(|| lookup_value(FFMPEG_KEY, file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_BIN));
    let timeout_secs = lookup_value(TIMEOUT_KEY, file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let thumbnail_workers = lookup_value(THUMBNAIL_WORKERS_KEY, file_vars, &env_lookup)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(DEFAULT_THUMBNAIL_WORKERS)
        .max(1);
    ClientSettings {
        api_url: api_url.trim().trim_end_matches('/').to_string(),
        cache_dir,
        ffmpeg_bin,
        request_timeout: Duration::from_secs(timeout_secs),
        thumbnail_workers,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Updates or appends a single env var inside the target file while preserving
/// unrelated lines and comments.
pub fn upsert_env_value(path: &Path, key: &str, value: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err).with_context(|| format!("Reading {}", path.display())),
    };
    let mut lines = Vec::new();
    let mut updated = false;
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");

    for line in raw.lines() {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];
        let (prefix, rest) = match trimmed.strip_prefix("export ") {
            Some(stripped) => ("export ", stripped),
            None => ("", trimmed),
        };
        match rest.split_once('=') {
            Some((candidate, _)) if candidate.trim() == key => {
                lines.push(format!("{indent}{prefix}{key}=\"{escaped}\""));
                updated = true;
            }
            _ => lines.push(line.to_string()),
        }
    }

    if !updated {
        lines.push(format!("{key}=\"{escaped}\""));
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, lines.join("\n") + "\n")
        .with_context(|| format!("Writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("Replacing {}", path.display()))?;
    Ok(())
}
