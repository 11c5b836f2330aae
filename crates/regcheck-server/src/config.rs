use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use regcheck_check::CheckOptions;
use regcheck_core::{GatewaySettings, PriceTable};

#[derive(Debug, Clone, Parser)]
#[command(name = "regcheck-server", version, about = "LLM-backed regulation and cost checks over HTTP")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "REGCHECK_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Model provider: openai, anthropic, google, ollama, groq, mistral, deepseek
    #[arg(long, env = "REGCHECK_PROVIDER", default_value = "openai")]
    pub provider: String,

    /// Provider API key (not needed for ollama)
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Model used for violation and cost checks
    #[arg(long, env = "REGCHECK_MODEL", default_value = "gpt-4o")]
    pub model: String,

    #[arg(long, env = "REGCHECK_TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f32,

    #[arg(long, env = "REGCHECK_MAX_TOKENS", default_value_t = 2048)]
    pub max_tokens: u32,

    /// Upper bound on simultaneous model calls per check request
    #[arg(long, env = "REGCHECK_MAX_CONCURRENT_CALLS", default_value_t = 4)]
    pub max_concurrent_calls: usize,

    /// JSON price table overriding the built-in rates; must contain a "default" row
    #[arg(long, env = "REGCHECK_PRICE_TABLE")]
    pub price_table: Option<PathBuf>,

    /// Request body limit in bytes
    #[arg(long, env = "REGCHECK_MAX_BODY_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "REGCHECK_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Config {
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            provider: self.provider.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
        }
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_concurrent_calls: self.max_concurrent_calls.max(1),
        }
    }

    /// Validated here so a bad table stops startup rather than a request.
    pub fn load_price_table(&self) -> Result<PriceTable, regcheck_core::Error> {
        PriceTable::load(self.price_table.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cfg = Config::try_parse_from(["regcheck-server"]).unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.check_options().max_concurrent_calls, 4);
        assert!(cfg.load_price_table().is_ok());
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let cfg =
            Config::try_parse_from(["regcheck-server", "--max-concurrent-calls", "0"]).unwrap();
        assert_eq!(cfg.check_options().max_concurrent_calls, 1);
    }

    #[test]
    fn missing_price_table_file_fails() {
        let cfg = Config::try_parse_from([
            "regcheck-server",
            "--price-table",
            "/definitely/not/here.json",
        ])
        .unwrap();
        let err = cfg.load_price_table().unwrap_err();
        assert!(matches!(err, regcheck_core::Error::InvalidPriceTable(_)));
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
