/// `load_config` module: locates and parses the YAML task configuration and
/// injects secrets from the environment.
///
/// # Responsibilities
/// - Find the config file: an explicit `--config` path, else
///   `~/.tasker_conf.yaml`, else `./tasker_conf.yaml`
/// - Parse it into typed per-vendor sections
/// - Let `ARTIFACTORY_PASSWORD` and `BITBUCKET_PASSWORD` override the
///   passwords from the file, so secrets can stay out of it
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path, and are surfaced at
/// the CLI boundary. A missing vendor section is only an error once a task
/// asks for it (see [`GadgetConfig::artifactory`]).
use anyhow::{Context, Result};
use gadget_core::artifactory::ArtifactoryConfig;
use gadget_core::bitbucket::BitbucketConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const CONFIG_FILE_NAME: &str = "tasker_conf.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GadgetConfig {
    #[serde(default, rename = "artifactory")]
    artifactory_section: Option<ArtifactoryConfig>,
    #[serde(default, rename = "bitbucket")]
    bitbucket_section: Option<BitbucketConfig>,
}

impl GadgetConfig {
    pub fn new(
        artifactory: Option<ArtifactoryConfig>,
        bitbucket: Option<BitbucketConfig>,
    ) -> Self {
        Self {
            artifactory_section: artifactory,
            bitbucket_section: bitbucket,
        }
    }

    pub fn artifactory(&self) -> Result<&ArtifactoryConfig> {
        self.artifactory_section
            .as_ref()
            .context("config has no `artifactory` section")
    }

    pub fn bitbucket(&self) -> Result<&BitbucketConfig> {
        self.bitbucket_section
            .as_ref()
            .context("config has no `bitbucket` section")
    }

    fn apply_env_overrides(&mut self) {
        if let Some(conf) = self.artifactory_section.as_mut() {
            if let Ok(password) = std::env::var("ARTIFACTORY_PASSWORD") {
                info!("ARTIFACTORY_PASSWORD found in env");
                conf.password = password;
            }
        }
        if let Some(conf) = self.bitbucket_section.as_mut() {
            if let Ok(password) = std::env::var("BITBUCKET_PASSWORD") {
                info!("BITBUCKET_PASSWORD found in env");
                conf.password = password;
            }
        }
    }
}

/// Default config locations, in lookup order.
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        locations.push(PathBuf::from(home).join(format!(".{CONFIG_FILE_NAME}")));
    }
    if let Ok(cwd) = std::env::current_dir() {
        locations.push(cwd.join(CONFIG_FILE_NAME));
    }
    locations
}

/// Picks the config file to load: `explicit` if given, else the first
/// existing entry of `candidates`.
pub fn resolve_config_path(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    for location in candidates {
        debug!(location = %location.display(), "Checking for config file");
        if location.exists() {
            info!(location = %location.display(), "Found config file");
            return Ok(location.clone());
        }
    }
    error!(?candidates, "No config file found");
    anyhow::bail!(
        "No config file found, looked in: {}",
        candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Loads a YAML config file and injects secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GadgetConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: GadgetConfig = match serde_yaml::from_str::<Option<GadgetConfig>>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf.unwrap_or_default()
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config.apply_env_overrides();

    info!(
        artifactory = config.artifactory_section.is_some(),
        bitbucket = config.bitbucket_section.is_some(),
        "Config loaded"
    );
    Ok(config)
}
