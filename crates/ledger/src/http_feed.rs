use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use vault_keeper_core::{FeedError, MarketDataFeed, Quote};

use crate::client::{ApiClient, ApiError};

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    spot_price: Decimal,
    perp_price: Decimal,
    funding_rate: Decimal,
    timestamp: DateTime<Utc>,
}

/// Market data over `GET {api_url}/quote/{pair}`.
pub struct HttpMarketFeed {
    client: ApiClient,
}

impl HttpMarketFeed {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketDataFeed for HttpMarketFeed {
    async fn get_quote(&self, pair_id: &str) -> Result<Quote, FeedError> {
        let response: QuoteResponse = self
            .client
            .get(&format!("/quote/{pair_id}"))
            .await
            .map_err(|err| match err {
                e if e.is_not_found() => FeedError::MissingQuote(pair_id.to_string()),
                ApiError::Decode(reason) => FeedError::malformed(pair_id, reason),
                other => FeedError::Unavailable(other.to_string()),
            })?;

        Quote {
            spot_price: response.spot_price,
            perp_price: response.perp_price,
            funding_rate: response.funding_rate,
            timestamp: response.timestamp,
        }
        .validate(pair_id)
    }
}
