use std::path::PathBuf;

use anyhow::{Context, ensure};
use serde::Deserialize;

/// Server settings.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory served as `/`
    pub doc_root: PathBuf,
    /// Page served for paths ending in `/`
    pub default_page: String,
    /// Sent in the `Server` header and on error pages
    pub server_name: String,
    /// Idle time after which a session is dropped
    pub session_timeout_secs: u64,
    pub max_sessions: usize,
    /// Input buffer per session; bounds header plus POST body
    pub rx_buffer_size: usize,
    pub tx_segment_size: usize,
    pub tx_pool_size: usize,
    pub max_form_params: usize,
    /// Bytes of file content produced per session per step
    pub content_quantum: usize,
    /// Steps a session may stay blocked on the buffer pool
    pub alloc_retry_limit: u32,
    pub max_include_depth: usize,
    /// Text output buffered while its Content-Length is still unknown.
    /// Longer responses stream without a length and close the connection.
    pub max_deferred_body: usize,
    /// Poll interval of the host loop
    pub tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            doc_root: PathBuf::from("./public"),
            default_page: "index.html".to_string(),
            server_name: concat!("microweb/", env!("CARGO_PKG_VERSION")).to_string(),
            session_timeout_secs: 30,
            max_sessions: 16,
            rx_buffer_size: 4096,
            tx_segment_size: 1460,
            tx_pool_size: 64,
            max_form_params: 32,
            content_quantum: 1024,
            alloc_retry_limit: 50,
            max_include_depth: 8,
            max_deferred_body: 8192,
            tick_ms: 10,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// Starts from defaults or the YAML file named by `MICROWEB_CONFIG`, then
    /// applies `LISTEN` (`host:port`) and `MICROWEB_PORT` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("MICROWEB_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path))?;
                Self::from_yaml_str(&text).with_context(|| format!("invalid config file {}", path))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            let (host, port) = listen
                .rsplit_once(':')
                .with_context(|| format!("LISTEN must be host:port, got {}", listen))?;
            cfg.host = host.to_string();
            cfg.port = port
                .parse()
                .with_context(|| format!("invalid port in LISTEN: {}", port))?;
        }

        if let Ok(port) = std::env::var("MICROWEB_PORT") {
            cfg.port = port
                .parse()
                .with_context(|| format!("invalid MICROWEB_PORT: {}", port))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(text).context("failed to parse YAML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `host:port` to bind.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_sessions > 0, "max_sessions must be positive");
        ensure!(self.rx_buffer_size >= 64, "rx_buffer_size must be at least 64 bytes");
        ensure!(self.tx_segment_size > 0, "tx_segment_size must be positive");
        ensure!(self.tx_pool_size > 0, "tx_pool_size must be positive");
        ensure!(self.content_quantum > 0, "content_quantum must be positive");
        ensure!(self.max_include_depth > 0, "max_include_depth must be positive");
        ensure!(self.session_timeout_secs > 0, "session_timeout_secs must be positive");
        ensure!(!self.default_page.is_empty(), "default_page must not be empty");
        Ok(())
    }
}
