//! Configuration management for extension-bridge.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::forward::{ForwardConfig, DEFAULT_PROXY_URL};
use crate::session::SessionSettings;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Outbound proxy for forwarded HTTP requests.
    pub proxy: ProxySection,
    /// WebSocket session timing.
    pub websocket: WebSocketSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50888,
            graceful_shutdown: true,
        }
    }
}

/// Proxy configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    /// Route forwarded requests through `url`.
    pub enabled: bool,
    /// Proxy URL.
    pub url: String,
    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_PROXY_URL.to_string(),
            timeout_secs: 5,
        }
    }
}

/// WebSocket session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketSection {
    /// Close a session when no keepalive arrives for this long.
    pub keepalive_timeout_secs: u64,
    /// How often liveness is checked.
    pub check_interval_ms: u64,
    /// Upper bound on a single receive wait.
    pub poll_interval_ms: u64,
    /// Upper bound on the close handshake.
    pub close_grace_ms: u64,
}

impl Default for WebSocketSection {
    fn default() -> Self {
        Self {
            keepalive_timeout_secs: 10,
            check_interval_ms: 1000,
            poll_interval_ms: 1000,
            close_grace_ms: 1000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("EXTENSION_BRIDGE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("EXTENSION_BRIDGE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Some(proxy) = var("EXTENSION_BRIDGE_PROXY") {
            if proxy.is_empty() {
                self.proxy.enabled = false;
            } else {
                self.proxy.enabled = true;
                self.proxy.url = proxy;
            }
        }

        if let Some(level) = var("EXTENSION_BRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref proxy) = args.proxy {
            self.proxy.enabled = true;
            self.proxy.url = proxy.clone();
        }

        if args.no_proxy {
            self.proxy.enabled = false;
        }

        if let Some(secs) = args.keepalive_timeout {
            self.websocket.keepalive_timeout_secs = secs;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Config::default();

        // Load from config file if specified
        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        // Apply environment variable overrides
        config.apply_env();

        // Apply CLI argument overrides (highest priority)
        config.apply_args(args);

        config.validate()?;
        Ok(config)
    }

    /// Reject values the session runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = &self.websocket;
        let checks = [
            ("websocket.keepalive_timeout_secs", ws.keepalive_timeout_secs),
            ("websocket.check_interval_ms", ws.check_interval_ms),
            ("websocket.poll_interval_ms", ws.poll_interval_ms),
            ("proxy.timeout_secs", self.proxy.timeout_secs),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name, value.to_string()));
            }
        }

        Ok(())
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port);

        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    /// Session timing for the registry.
    pub fn session_settings(&self) -> SessionSettings {
        let ws = &self.websocket;
        SessionSettings {
            keepalive_timeout: Duration::from_secs(ws.keepalive_timeout_secs),
            check_interval: Duration::from_millis(ws.check_interval_ms.max(1)),
            poll_interval: Duration::from_millis(ws.poll_interval_ms.max(1)),
            close_grace: Duration::from_millis(ws.close_grace_ms),
        }
    }

    /// Forwarder settings.
    pub fn forward_config(&self) -> ForwardConfig {
        ForwardConfig {
            proxy: self.proxy.enabled.then(|| self.proxy.url.clone()),
            timeout: Duration::from_secs(self.proxy.timeout_secs),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// A setting outside its allowed range.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: {}", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}
