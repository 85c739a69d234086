use std::env;
use std::path::PathBuf;

use url::Url;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub arxiv: ArxivConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

/// Ollama-compatible text generation backend
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Delay between consecutive per-topic requests
    pub pacing_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 3002),
        };

        let storage = StorageConfig {
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            uploads_dir: PathBuf::from(
                env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
        };

        let llm = LlmConfig {
            enabled: parse_bool(env::var("LLM_ENABLED").ok().as_deref(), true),
            base_url: validated_url(
                "OLLAMA_URL",
                env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            )?,
            model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string()),
            timeout_ms: parse_var("LLM_TIMEOUT_MS", 30_000),
        };

        let arxiv = ArxivConfig {
            base_url: validated_url(
                "ARXIV_URL",
                env::var("ARXIV_URL")
                    .unwrap_or_else(|_| "https://export.arxiv.org/api/query".to_string()),
            )?,
            timeout_ms: parse_var("ARXIV_TIMEOUT_MS", 30_000),
            pacing_ms: parse_var("ARXIV_PACING_MS", 1_000),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            server,
            storage,
            llm,
            arxiv,
            logging,
        })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: "https://export.arxiv.org/api/query".to_string(),
            timeout_ms: 30_000,
            pacing_ms: 1_000,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn validated_url(var: &'static str, value: String) -> Result<String, ConfigError> {
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(value.trim_end_matches('/').to_string())
        }
        _ => Err(ConfigError::InvalidUrl { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("TRUE"), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("off"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn test_validated_url_strips_trailing_slash() {
        assert_eq!(
            validated_url("OLLAMA_URL", "http://localhost:11434/".to_string()).unwrap(),
            "http://localhost:11434"
        );
    }

    #[test]
    fn test_validated_url_rejects_garbage() {
        assert!(validated_url("OLLAMA_URL", "not a url".to_string()).is_err());
        assert!(validated_url("ARXIV_URL", "ftp://example.org".to_string()).is_err());
    }
}
