use async_trait::async_trait;
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::error::PayError;

/// Price-quote collaborator: how many units of `currency` one unit of the
/// invoice currency buys.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn rate(&self, currency: &str) -> Result<Decimal, PayError>;
}

/// Normalizes a currency code. Only short ASCII alphanumeric codes are
/// accepted since the code becomes a URL path segment.
pub fn currency_code(raw: &str) -> Result<String, PayError> {
    let code = raw.trim();
    if code.is_empty() || code.len() > 12 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PayError::Validation(format!("invalid currency code: {}", raw)));
    }
    Ok(code.to_ascii_uppercase())
}

/// HTTP quote client with a short-lived in-process cache.
pub struct QuoteService {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<String, Decimal>,
}

#[derive(Deserialize)]
struct RateResponse {
    rate: Decimal,
}

impl QuoteService {
    pub fn new(base_url: String, ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            cache: Cache::builder()
                .max_capacity(1000)
                .time_to_live(ttl)
                .build(),
        }
    }

    async fn fetch(&self, code: &str) -> Result<Decimal, PayError> {
        let url = format!("{}/rates/{}", self.base_url.trim_end_matches('/'), code);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PayError::Upstream(format!("quote request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PayError::Upstream(format!(
                "quote service answered {} for {}",
                response.status(),
                code
            )));
        }

        let body: RateResponse = response
            .json()
            .await
            .map_err(|e| PayError::Upstream(format!("invalid quote response: {}", e)))?;

        if body.rate <= Decimal::ZERO {
            return Err(PayError::Upstream(format!("non-positive rate for {}", code)));
        }
        Ok(body.rate)
    }
}

#[async_trait]
impl QuoteSource for QuoteService {
    async fn rate(&self, currency: &str) -> Result<Decimal, PayError> {
        let code = currency_code(currency)?;

        if let Some(rate) = self.cache.get(&code).await {
            tracing::debug!("Quote cache hit for {}", code);
            return Ok(rate);
        }

        let rate = self.fetch(&code).await?;
        self.cache.insert(code.clone(), rate).await;
        tracing::info!("Quoted {} at {}", code, rate);

        Ok(rate)
    }
}

/// Fixed rates, for deployments without a quote service and for tests.
pub struct StaticQuotes {
    rates: Vec<(String, Decimal)>,
}

impl StaticQuotes {
    pub fn new(rates: Vec<(String, Decimal)>) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn rate(&self, currency: &str) -> Result<Decimal, PayError> {
        self.rates
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(currency.trim()))
            .map(|(_, rate)| *rate)
            .ok_or_else(|| PayError::Validation(format!("no quote available for {}", currency)))
    }
}
