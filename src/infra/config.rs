use serde::Deserialize;

pub const DEFAULT_MESHY_BASE_URL: &str = "https://api.meshy.ai";

pub struct Config {
    pub mode: String, // "server" or "stdio"
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let mode = std::env::var("MODE").unwrap_or_else(|_| "server".into());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);

        Self { mode, port }
    }
}

/// Per-upstream tuning knobs. Everything is optional; `MeshyRemote` fills
/// in its own defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub stream_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub meshy: ToolConfig,
}

impl AppConfig {
    /// Load the optional TOML file named by `CONFIG_FILE`, then overlay
    /// environment variables on top. Env always wins.
    pub fn from_env_and_toml() -> Self {
        let mut cfg = std::env::var("CONFIG_FILE")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|raw| toml::from_str::<AppConfig>(&raw).ok())
            .unwrap_or_default();

        if let Ok(v) = std::env::var("MESHY_BASE_URL") {
            if !v.trim().is_empty() {
                cfg.meshy.base_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MESHY_API_KEY") {
            if !v.trim().is_empty() {
                cfg.meshy.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MESHY_RETRIES") {
            cfg.meshy.retries = v.parse().ok().or(cfg.meshy.retries);
        }
        if let Ok(v) = std::env::var("MESHY_STREAM_TIMEOUT_SECS") {
            cfg.meshy.stream_timeout_secs = v.parse().ok().or(cfg.meshy.stream_timeout_secs);
        }
        if let Ok(v) = std::env::var("MESHY_POLL_INTERVAL_MS") {
            cfg.meshy.poll_interval_ms = v.parse().ok().or(cfg.meshy.poll_interval_ms);
        }

        cfg
    }
}
