//! Daemon configuration: JSON config file plus environment overrides.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_INPUT: &str = "test_picture";

#[derive(Debug, Deserialize, Default)]
struct RelaydConfigFile {
    http: Option<HttpConfigFile>,
    inputs: Option<Vec<String>>,
    outputs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct HttpConfigFile {
    addrs: Option<Vec<String>>,
    www_root: Option<PathBuf>,
    credentials: Option<String>,
    enable_commands: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RelaydConfig {
    pub http: HttpSettings,
    /// Input module specs, e.g. `test_picture:fps=5`.
    pub inputs: Vec<String>,
    /// Output module specs (the HTTP server is configured separately).
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub addrs: Vec<String>,
    pub www_root: Option<PathBuf>,
    pub credentials: Option<String>,
    pub enable_commands: bool,
}

impl RelaydConfig {
    /// Load from an explicit path, or the `RELAY_CONFIG` env var, or
    /// defaults; then apply env overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("RELAY_CONFIG").ok();
        let file_cfg = match path
            .map(Path::to_path_buf)
            .or(env_path.map(PathBuf::from))
        {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelaydConfigFile) -> Self {
        let http = file.http.unwrap_or_default();
        Self {
            http: HttpSettings {
                addrs: http
                    .addrs
                    .unwrap_or_else(|| vec![DEFAULT_HTTP_ADDR.to_string()]),
                www_root: http.www_root,
                credentials: http.credentials,
                enable_commands: http.enable_commands.unwrap_or(true),
            },
            inputs: file
                .inputs
                .unwrap_or_else(|| vec![DEFAULT_INPUT.to_string()]),
            outputs: file.outputs.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("RELAY_HTTP_ADDR") {
            if !addr.trim().is_empty() {
                self.http.addrs = split_list(&addr, ',');
            }
        }
        if let Ok(root) = std::env::var("RELAY_WWW_ROOT") {
            if !root.trim().is_empty() {
                self.http.www_root = Some(PathBuf::from(root));
            }
        }
        if let Ok(credentials) = std::env::var("RELAY_CREDENTIALS") {
            if !credentials.trim().is_empty() {
                self.http.credentials = Some(credentials);
            }
        }
        // Module specs use ',' inside their parameter lists, so multiple
        // specs are separated by ';'.
        if let Ok(inputs) = std::env::var("RELAY_INPUT") {
            let parsed = split_list(&inputs, ';');
            if !parsed.is_empty() {
                self.inputs = parsed;
            }
        }
        if let Ok(outputs) = std::env::var("RELAY_OUTPUT") {
            self.outputs = split_list(&outputs, ';');
        }
    }

    fn validate(&self) -> Result<()> {
        if self.http.addrs.is_empty() {
            return Err(anyhow!("at least one http listen address is required"));
        }
        if self.inputs.is_empty() {
            return Err(anyhow!("at least one input module is required"));
        }
        if let Some(credentials) = &self.http.credentials {
            if !credentials.contains(':') {
                return Err(anyhow!("credentials must have the form user:password"));
            }
        }
        Ok(())
    }
}

impl From<&HttpSettings> for crate::http::HttpConfig {
    fn from(settings: &HttpSettings) -> Self {
        Self {
            addrs: settings.addrs.clone(),
            www_root: settings.www_root.clone(),
            credentials: settings.credentials.clone(),
            enable_commands: settings.enable_commands,
        }
    }
}

fn read_config_file(path: &Path) -> Result<RelaydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
