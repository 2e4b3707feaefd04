use std::path::PathBuf;

use clap::Parser;

use super::validation::validate_config;
use super::{load_config, load_config_or_default, AppConfig, ConfigError};

/// Command-line flags. Any flag that is set overrides the config file.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "toolpatch",
    version,
    about = "Streaming proxy that repairs LLM tool calls in SSE responses"
)]
pub struct CliArgs {
    /// Path to the process configuration document.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
    /// Backend URL every request is forwarded to.
    #[arg(long)]
    pub target_url: Option<String>,
    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,
    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,
    /// Path to the tool fix rules document.
    #[arg(long)]
    pub fixes: Option<PathBuf>,
    /// Log every SSE payload returned to the client.
    #[arg(long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Whether `--config` was left at its default, in which case a missing file is tolerated.
    #[must_use]
    pub fn uses_default_config_path(&self) -> bool {
        self.config.as_os_str() == "config.yaml"
    }

    /// Load the config file, apply the flags on top and validate the result.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from loading or from validating the merged config.
    pub fn resolve_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = if self.uses_default_config_path() {
            load_config_or_default(&self.config)?
        } else {
            load_config(&self.config)?
        };
        self.apply_overrides(&mut config);
        validate_config(&config)?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(target_url) = &self.target_url {
            config.server.target_url.clone_from(target_url);
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(fixes) = &self.fixes {
            config.features.fixes_path.clone_from(fixes);
        }
        if self.verbose {
            config.features.verbose = true;
        }
    }
}
