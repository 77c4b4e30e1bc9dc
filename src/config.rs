use std::env;

use crate::batcher::BatchConfig;

/// Process-environment configuration, per the table in the spec. Parsing
/// follows the teacher's idiom throughout this codebase: parse, fall back
/// to the default on anything nonsensical, never panic on a bad env var.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub batch: BatchConfig,
    pub model_server_url: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);
        let model_server_url = env::var("MODEL_SERVER_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "http://localhost:8000".to_owned());
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_owned());

        Self {
            port,
            batch: BatchConfig::from_env(),
            model_server_url,
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        // Run in isolation from whatever the host process's real
        // environment sets, since these vars are read by the whole
        // process rather than scoped per-call.
        for key in ["PORT", "BATCH_SIZE", "BATCH_TIMEOUT_MS", "MODEL_SERVER_URL", "LOG_LEVEL"] {
            env::remove_var(key);
        }

        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.batch.max_batch_size, 32);
        assert_eq!(config.batch.timeout, std::time::Duration::from_millis(50));
        assert_eq!(config.model_server_url, "http://localhost:8000");
        assert_eq!(config.log_level, "info");
    }
}
