//! Configuration for the codecraft kernel.
//!
//! Loaded from `~/.config/codecraft/server.toml` (or an explicit path). Every
//! field has a default, so an empty or missing file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::interpreter::DEFAULT_MAX_CALL_DEPTH;

/// Environment variable that overrides the agent auth token.
pub const AUTH_TOKEN_ENV: &str = "AGENT_AUTH_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Address the WebSocket server binds.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory for scratch source files and binaries.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Shared secret every hardware agent must present.
    #[serde(default = "default_auth_token")]
    pub agent_auth_token: String,

    /// Lifetime of an unanswered agent request.
    #[serde(default = "default_pending_ttl_ms")]
    pub pending_ttl_ms: u64,

    /// Shell started for each session's terminal.
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_node")]
    pub node: String,

    /// C compiler.
    #[serde(default = "default_cc")]
    pub cc: String,

    /// C++ compiler.
    #[serde(default = "default_cxx")]
    pub cxx: String,

    /// How long to wait for the Python REPL's readiness line.
    #[serde(default = "default_repl_ready_timeout_ms")]
    pub repl_ready_timeout_ms: u64,

    /// Nested call limit for CraftLang programs.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
}

fn default_listen() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_auth_token() -> String {
    "hardware-agent-secret-2024".to_string()
}

fn default_pending_ttl_ms() -> u64 {
    30_000
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_node() -> String {
    "node".to_string()
}

fn default_cc() -> String {
    "gcc".to_string()
}

fn default_cxx() -> String {
    "g++".to_string()
}

fn default_repl_ready_timeout_ms() -> u64 {
    10_000
}

fn default_max_call_depth() -> usize {
    DEFAULT_MAX_CALL_DEPTH
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workspace_dir: default_workspace_dir(),
            agent_auth_token: default_auth_token(),
            pending_ttl_ms: default_pending_ttl_ms(),
            shell: default_shell(),
            python: default_python(),
            node: default_node(),
            cc: default_cc(),
            cxx: default_cxx(),
            repl_ready_timeout_ms: default_repl_ready_timeout_ms(),
            max_call_depth: default_max_call_depth(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from the default path, then apply environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        Ok(config.with_env_overrides())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "codecraft")
            .context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("server.toml"))
    }

    /// Apply `AGENT_AUTH_TOKEN` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
            if !token.is_empty() {
                self.agent_auth_token = token;
            }
        }
        self
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.agent_auth_token = token.into();
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_ttl_ms)
    }

    pub fn repl_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.repl_ready_timeout_ms)
    }
}
