use std::env;
use std::time::Duration;

use coach_engine::EngineConfig;

/// How move feedback text is produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedbackMode {
    RuleBased,
    OpenAi { api_key: String, base_url: String },
    Ollama { url: String },
}

/// Realtime store credentials; absent means multiplayer is disabled.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub database_url: String,
    pub auth: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub engine: EngineConfig,
    pub lichess_base_url: String,
    pub chess_com_base_url: String,
    /// Requests per minute
    pub lichess_rate_limit: u32,
    pub chess_com_rate_limit: u32,
    pub http_timeout: Duration,
    pub feedback: FeedbackMode,
    pub realtime: Option<RealtimeConfig>,
    pub app_base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        let use_ollama = env::var("USE_OLLAMA")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let feedback = if use_ollama {
            FeedbackMode::Ollama {
                url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            }
        } else {
            match env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()) {
                Some(api_key) => FeedbackMode::OpenAi {
                    api_key,
                    base_url: env::var("OPENAI_BASE_URL")
                        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                },
                None => FeedbackMode::RuleBased,
            }
        };

        let realtime = env::var("FIREBASE_DATABASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .map(|database_url| RealtimeConfig {
                database_url,
                auth: env::var("FIREBASE_AUTH").ok().filter(|a| !a.is_empty()),
            });

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            engine: EngineConfig::from_env(),
            lichess_base_url: env::var("LICHESS_BASE_URL")
                .unwrap_or_else(|_| "https://lichess.org".to_string()),
            chess_com_base_url: env::var("CHESSCOM_BASE_URL")
                .unwrap_or_else(|_| "https://api.chess.com/pub".to_string()),
            lichess_rate_limit: env::var("LICHESS_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            chess_com_rate_limit: env::var("CHESSCOM_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            feedback,
            realtime,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            engine: EngineConfig::default(),
            lichess_base_url: "https://lichess.org".to_string(),
            chess_com_base_url: "https://api.chess.com/pub".to_string(),
            lichess_rate_limit: 15,
            chess_com_rate_limit: 300,
            http_timeout: Duration::from_secs(30),
            feedback: FeedbackMode::RuleBased,
            realtime: None,
            app_base_url: "http://localhost:3000".to_string(),
        }
    }
}
