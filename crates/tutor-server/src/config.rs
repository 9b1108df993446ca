use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use tutor_api::rate_limit::DEFAULT_DAILY_LIMIT;
use tutor_llm::GeminiConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub daily_limit: u32,
    pub gemini: GeminiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_key = lookup("GEMINI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            bail!("GEMINI_API_KEY is unset");
        }

        let host: IpAddr = parse(&lookup, "TUTOR_HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = parse(&lookup, "TUTOR_PORT", 3000)?;
        let addr = SocketAddr::new(host, port);

        let mut gemini = GeminiConfig::new(api_key);
        if let Some(model) = lookup("GEMINI_MODEL") {
            gemini.model = model;
        }
        if let Some(base_url) = lookup("GEMINI_BASE_URL") {
            gemini.base_url = base_url;
        }
        gemini.temperature = parse(&lookup, "TUTOR_TEMPERATURE", gemini.temperature)?;
        gemini.max_output_tokens = parse(&lookup, "TUTOR_MAX_OUTPUT_TOKENS", gemini.max_output_tokens)?;

        Ok(Self {
            addr,
            db_path: get("TUTOR_DB_PATH", "tutor.db").into(),
            daily_limit: parse(&lookup, "TUTOR_DAILY_LIMIT", DEFAULT_DAILY_LIMIT)?,
            gemini,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.parse().with_context(|| format!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
