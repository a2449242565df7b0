use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration, loaded from `longbox.toml` when present.
///
/// The API key is the only required value; everything else carries the
/// defaults the catalog's terms of use expect (one request per ten seconds,
/// burst of ten).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the catalog API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Number of concurrent workers converting candidate issues to metadata
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Sustained request rate in tokens per second
    #[serde(default = "default_requests_rate")]
    pub requests_rate: f64,

    /// Maximum number of tokens the bucket accumulates
    #[serde(default = "default_requests_burst")]
    pub requests_burst: u32,

    /// Upper bound on candidate volumes considered per title search
    #[serde(default = "default_max_volumes")]
    pub max_volumes: usize,

    /// Per-request timeout in seconds; 0 blocks indefinitely
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts per retried operation
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Where the persisted token-bucket state lives
    #[serde(default)]
    pub token_state_path: Option<PathBuf>,
}

fn default_api_base() -> String {
    "https://comicvine.gamespot.com/api/".to_string()
}
fn default_worker_threads() -> usize {
    16
}
fn default_requests_rate() -> f64 {
    0.1
}
fn default_requests_burst() -> u32 {
    10
}
fn default_max_volumes() -> usize {
    20
}
fn default_timeout() -> u64 {
    30
}
fn default_retries() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            worker_threads: default_worker_threads(),
            requests_rate: default_requests_rate(),
            requests_burst: default_requests_burst(),
            max_volumes: default_max_volumes(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
            token_state_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(Path::new("longbox.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(cfg) = toml::from_str::<Config>(&content) {
                    return cfg;
                }
            }
        }
        Self::default()
    }

    /// Per-request timeout; `None` means block indefinitely.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Resolved location of the persisted rate-limiter state.
    pub fn token_state_path(&self) -> PathBuf {
        if let Some(path) = &self.token_state_path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("longbox")
            .join("tokens.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.worker_threads, 16);
        assert_eq!(cfg.requests_burst, 10);
        assert!((cfg.requests_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.max_volumes, 20);
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(30)));
        assert!(cfg.api_key.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let cfg: Config = toml::from_str("api_key = \"abc\"\nworker_threads = 4\n").unwrap();
        assert_eq!(cfg.api_key, "abc");
        assert_eq!(cfg.worker_threads, 4);
        assert_eq!(cfg.requests_burst, 10);
    }

    #[test]
    fn test_zero_timeout_blocks_indefinitely() {
        let cfg: Config = toml::from_str("timeout_secs = 0\n").unwrap();
        assert_eq!(cfg.timeout(), None);
    }
}
