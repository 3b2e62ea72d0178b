use anyhow::{bail, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Storage
    pub database_url: String,

    // External access tokens (64 hex chars, 32 bytes)
    pub access_token_key: Option<String>,
    pub public_base_url: String,

    // Collaborators
    pub quote_service_url: Option<String>,
    pub quote_cache_ttl: Duration,
    pub mail_relay_url: Option<String>,

    // Listings
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid PORT")?;

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,

            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://payreq.db?mode=rwc".to_string()),

            access_token_key: non_empty("ACCESS_TOKEN_KEY"),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),

            quote_service_url: non_empty("QUOTE_SERVICE_URL"),
            quote_cache_ttl: Duration::from_secs(
                std::env::var("QUOTE_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("Invalid QUOTE_CACHE_TTL_SECS")?,
            ),
            mail_relay_url: non_empty("MAIL_RELAY_URL"),

            default_page_size: std::env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DEFAULT_PAGE_SIZE")?,
            max_page_size: std::env::var("MAX_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid MAX_PAGE_SIZE")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match &self.access_token_key {
            Some(key) if key.len() != 64 || hex::decode(key).is_err() => {
                bail!("ACCESS_TOKEN_KEY must be 64 hex characters");
            }
            None if self.environment == Environment::Production => {
                bail!("ACCESS_TOKEN_KEY required in production");
            }
            _ => {}
        }

        if !self.public_base_url.starts_with("http") {
            bail!("PUBLIC_BASE_URL must be HTTP(S) URL");
        }
        for (name, url) in [
            ("QUOTE_SERVICE_URL", &self.quote_service_url),
            ("MAIL_RELAY_URL", &self.mail_relay_url),
        ] {
            if let Some(url) = url {
                if !url.starts_with("http") {
                    bail!("{} must be HTTP(S) URL", name);
                }
            }
        }

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            bail!("DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
