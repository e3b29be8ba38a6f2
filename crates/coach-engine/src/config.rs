//! Engine configuration from environment variables

use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the UCI engine binary
    pub stockfish_path: String,

    /// Depth used when a request does not name one
    pub default_depth: u32,

    /// Per-job deadline after which `stop` is sent; `None` disables it
    pub search_timeout: Option<Duration>,

    /// How long to wait for `uciok` before giving up on the process
    pub handshake_timeout: Duration,

    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "stockfish".to_string(),
            default_depth: 15,
            search_timeout: Some(Duration::from_millis(30_000)),
            handshake_timeout: Duration::from_secs(10),
            threads: None,
            hash_mb: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);

        let default_depth = env::var("ENGINE_DEFAULT_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_depth);

        let search_timeout = match env::var("ENGINE_SEARCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.search_timeout,
        };

        let threads = env::var("ENGINE_THREADS").ok().and_then(|v| v.parse().ok());
        let hash_mb = env::var("ENGINE_HASH_MB").ok().and_then(|v| v.parse().ok());

        Self {
            stockfish_path,
            default_depth,
            search_timeout,
            handshake_timeout: defaults.handshake_timeout,
            threads,
            hash_mb,
        }
    }

    /// Options sent once the handshake completes.
    pub fn startup_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        if let Some(threads) = self.threads {
            options.push(("Threads".to_string(), threads.to_string()));
        }
        if let Some(hash) = self.hash_mb {
            options.push(("Hash".to_string(), hash.to_string()));
        }
        options
    }
}
