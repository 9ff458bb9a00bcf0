use crate::relay::output::OutputSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[cfg(windows)]
pub const PLATFORM_LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const PLATFORM_LINE_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
}

/// How the supervised server is launched
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub executable: String,
    pub args: Vec<String>,
    /// Working directory (supports ~ expansion); defaults to the current directory
    pub working_dir: Option<String>,
    pub pty_cols: u16,
    pub pty_rows: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Overrides the platform line separator used for framing and forwarding
    pub line_separator: Option<String>,
    /// Command prefix that shuts the supervisor down
    pub exit_sentinel: String,
    pub backup_marker: String,
    pub backup_delay_ms: u64,
    /// Drop the leading `/` of forwarded commands (server console syntax)
    pub strip_command_slash: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            executable: "TerrariaServer.exe".to_string(),
            args: vec!["-config".to_string(), "serverconfig.txt".to_string()],
            working_dir: None,
            pty_cols: 80,
            pty_rows: 24,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            line_separator: None,
            exit_sentinel: "/exit".to_string(),
            backup_marker: "BACKING UP WORLD FILE".to_string(),
            backup_delay_ms: 50,
            strip_command_slash: false,
        }
    }
}

impl Config {
    /// Load the first readable config from the standard locations, else defaults
    pub fn load() -> Self {
        let paths = [
            dirs::config_dir().map(|p| p.join("chatrelay/config.toml")),
            dirs::home_dir().map(|p| p.join(".chatrelay.toml")),
            Some(PathBuf::from("chatrelay.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!(path = %path.display(), "ignoring config: {e:#}"),
                }
            }
        }

        Config::default()
    }

    /// Load an explicit config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.server.working_dir = config.server.working_dir.map(|d| expand_tilde(&d));
        Ok(config)
    }

    /// Apply command-line overrides: `EXECUTABLE [ARGS...]` and a working directory
    pub fn apply_overrides(&mut self, command: &[String], cwd: Option<&str>) {
        if let Some((executable, rest)) = command.split_first() {
            self.server.executable = executable.clone();
            self.server.args = rest.to_vec();
        }
        if let Some(cwd) = cwd {
            self.server.working_dir = Some(expand_tilde(cwd));
        }
    }
}

impl ServerConfig {
    /// Directory the server is started in
    pub fn resolved_working_dir(&self) -> Result<PathBuf> {
        match &self.working_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => std::env::current_dir().context("Failed to read current directory"),
        }
    }
}

impl RelayConfig {
    pub fn line_separator(&self) -> &str {
        self.line_separator
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(PLATFORM_LINE_SEPARATOR)
    }

    pub fn output_settings(&self) -> OutputSettings {
        OutputSettings {
            line_separator: self.line_separator().to_string(),
            backup_marker: self.backup_marker.clone(),
            backup_delay: Duration::from_millis(self.backup_delay_ms),
        }
    }
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    path.to_string()
}
