//! Polymarket Data API client: activity feed, positions, and order books.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::models::Position;

use super::types::{ActivityResponse, OrderBook, PositionResponse};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const CLOB_API_BASE: &str = "https://clob.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only client for market data (no authentication required).
pub struct DataClient {
    client: Client,
    data_url: String,
    clob_url: String,
}

impl DataClient {
    /// Create a new data client with default endpoints.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            data_url: DATA_API_BASE.to_string(),
            clob_url: CLOB_API_BASE.to_string(),
        })
    }

    /// Create with custom base URLs (for testing).
    pub fn with_base_urls(data_url: String, clob_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            data_url,
            clob_url,
        })
    }

    /// Fetch recent activity for an account, filtered to one activity type.
    pub async fn get_activity(
        &self,
        address: &str,
        activity_type: &str,
        limit: u32,
    ) -> Result<Vec<ActivityResponse>> {
        let url = format!(
            "{}/activity?user={}&type={}&limit={}",
            self.data_url,
            address,
            activity_type,
            limit.min(500)
        );

        debug!(url = %url, "Fetching activity");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch activity")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Activity request failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse activity response")
    }

    /// Fetch current positions for an account.
    pub async fn get_positions(&self, address: &str) -> Result<Vec<Position>> {
        let url = format!("{}/positions?user={}", self.data_url, address);

        debug!(url = %url, "Fetching positions");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch positions")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Positions request failed: {} - {}", status, body);
        }

        let items: Vec<PositionResponse> = response
            .json()
            .await
            .context("Failed to parse positions response")?;

        Ok(items
            .into_iter()
            .map(|p| Position {
                condition_id: p.condition_id,
                asset: p.asset,
                size: p.size,
            })
            .collect())
    }

    /// Fetch the order book for an outcome token.
    pub async fn get_order_book(&self, asset: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", self.clob_url, asset);

        debug!(url = %url, "Fetching order book");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch order book")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Order book request failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse order book")
    }
}
