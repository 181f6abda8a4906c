use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::client::predict_url;
use crate::options::{parse_option_list, DetectionOption, OutputOptions};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
const DEFAULT_OUTPUT_PATH: &str = "detections.jpg";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClientConfigFile {
    endpoint: Option<String>,
    options: Option<Vec<String>>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    image_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the inference service; `/predict/` is appended.
    pub endpoint: String,
    /// Outputs requested when the command line selects none.
    pub default_options: OutputOptions,
    /// Where the annotated image is written.
    pub image_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_options: OutputOptions::default(),
            image_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WAVETRACK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Result<Self> {
        let endpoint = file
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let default_options = match file.options {
            Some(names) => OutputOptions::from_selection(
                names
                    .iter()
                    .map(|name| name.parse::<DetectionOption>())
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => OutputOptions::default(),
        };
        let image_path = file
            .output
            .and_then(|output| output.image_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));
        Ok(Self {
            endpoint,
            default_options,
            image_path,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(endpoint) = std::env::var("WAVETRACK_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_string();
            }
        }
        if let Ok(options) = std::env::var("WAVETRACK_OPTIONS") {
            let parsed = parse_option_list(&options)
                .map_err(|e| anyhow!("WAVETRACK_OPTIONS is invalid: {}", e))?;
            if !parsed.is_empty() {
                self.default_options = OutputOptions::from_selection(parsed);
            }
        }
        if let Ok(path) = std::env::var("WAVETRACK_OUTPUT") {
            if !path.trim().is_empty() {
                self.image_path = PathBuf::from(path);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        predict_url(&self.endpoint)
            .map_err(|e| anyhow!("invalid endpoint '{}': {:#}", self.endpoint, e))?;
        if self.image_path.as_os_str().is_empty() {
            return Err(anyhow!("output image path must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
