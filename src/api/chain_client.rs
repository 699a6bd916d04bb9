//! Polygon RPC client for on-chain USDC balance reads.

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// USDC contract on Polygon mainnet.
const USDC_CONTRACT: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

/// `balanceOf(address)` function selector.
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// USDC uses 6 decimal places.
const USDC_DECIMALS: u32 = 6;

/// Client for querying quote-currency balances directly from chain state.
pub struct ChainClient {
    client: Client,
    rpc_url: String,
    usdc: Address,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    id: u32,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl ChainClient {
    /// Create a new chain client against the given RPC endpoint.
    pub fn new(rpc_url: String) -> Result<Self> {
        Self::with_contract(rpc_url, USDC_CONTRACT)
    }

    /// Create with a custom token contract (for testing against other chains).
    pub fn with_contract(rpc_url: String, contract: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let usdc = Address::from_str(contract).context("Invalid USDC contract address")?;

        Ok(Self {
            client,
            rpc_url,
            usdc,
        })
    }

    /// Fetch an account's USDC balance in whole-token units.
    pub async fn usdc_balance(&self, address: &str) -> Result<Decimal> {
        let owner = Address::from_str(address).context("Invalid wallet address")?;

        let params = serde_json::json!([
            {
                "to": format!("{:?}", self.usdc),
                "data": balance_of_calldata(owner),
            },
            "latest"
        ]);

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_call",
            params,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach RPC endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("RPC request failed: {}", response.status());
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        if let Some(err) = body.error {
            anyhow::bail!("RPC error {}: {}", err.code, err.message);
        }

        let raw = body
            .result
            .ok_or_else(|| anyhow!("Empty result from eth_call"))?;

        let balance = decode_token_amount(&raw)?;
        debug!(address = %address, balance = %balance, "Fetched USDC balance");

        Ok(balance)
    }
}

/// ABI-encode a `balanceOf(address)` call.
fn balance_of_calldata(owner: Address) -> String {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(owner.as_slice());
    format!("0x{}", hex::encode(data))
}

/// Decode a uint256 eth_call result into whole USDC units.
fn decode_token_amount(raw: &str) -> Result<Decimal> {
    let value = U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .context("Failed to parse eth_call result")?;

    let units: u64 = value
        .try_into()
        .map_err(|_| anyhow!("Balance exceeds representable range"))?;

    Ok(Decimal::from_i128_with_scale(units as i128, USDC_DECIMALS))
}
