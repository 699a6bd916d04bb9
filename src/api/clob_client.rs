//! Polymarket CLOB client for order execution.
//!
//! Submits fill-or-kill orders at a price the caller has already selected
//! from the book. Handles EIP-712 order signing and L2 (HMAC) request
//! authentication. The funder is a Polymarket proxy wallet, so orders are
//! signed with the POLY_PROXY signature type.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::Sha256;
use std::str::FromStr;

use super::types::{OrderResponse, OrderSide};

/// Default CLOB endpoint.
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon.
const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// Proxy-wallet signature type.
const SIG_TYPE_POLY_PROXY: u8 = 1;

/// Both USDC and outcome tokens use 6 decimal places on the exchange.
const TOKEN_DECIMALS: u32 = 6;

/// CLOB API client for executing trades.
pub struct ClobClient {
    http: Client,
    host: String,
    signer: PrivateKeySigner,
    funder: String,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    chain_id: u64,
}

/// Signed order in the shape the CLOB expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedOrder {
    salt: String,
    maker: String,
    signer: String,
    taker: String,
    token_id: String,
    maker_amount: String,
    taker_amount: String,
    side: String,
    expiration: String,
    nonce: String,
    fee_rate_bps: String,
    signature_type: u8,
    signature: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderPayload {
    order: SignedOrder,
    owner: String,
    order_type: String,
}

impl ClobClient {
    /// Create a new CLOB client.
    pub fn new(
        host: String,
        private_key: &str,
        funder: &str,
        api_key: &str,
        api_secret: &str,
        api_passphrase: &str,
        chain_id: u64,
    ) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            host,
            signer,
            funder: funder.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            api_passphrase: api_passphrase.to_string(),
            chain_id,
        })
    }

    /// Create from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - PROXY_WALLET (funder address holding balances and positions)
    /// - POLYMARKET_API_KEY / POLYMARKET_API_SECRET / POLYMARKET_API_PASSPHRASE
    /// - CLOB_HTTP_URL (defaults to the public endpoint)
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    pub fn from_env() -> Result<Self> {
        let private_key = std::env::var("POLYMARKET_PRIVATE_KEY")
            .context("POLYMARKET_PRIVATE_KEY not set")?;
        let funder = std::env::var("PROXY_WALLET").context("PROXY_WALLET not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY").context("POLYMARKET_API_KEY not set")?;
        let api_secret =
            std::env::var("POLYMARKET_API_SECRET").context("POLYMARKET_API_SECRET not set")?;
        let api_passphrase = std::env::var("POLYMARKET_API_PASSPHRASE")
            .context("POLYMARKET_API_PASSPHRASE not set")?;
        let host = std::env::var("CLOB_HTTP_URL").unwrap_or_else(|_| CLOB_URL.to_string());
        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        Self::new(
            host,
            &private_key,
            &funder,
            &api_key,
            &api_secret,
            &api_passphrase,
            chain_id,
        )
    }

    /// The signing wallet address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Submit a fill-or-kill order at the given price.
    ///
    /// For BUY the amount is the USDC to spend; for SELL it is the number of
    /// outcome tokens to shed. Either the order fully fills at these terms or
    /// the response reports failure with no effect.
    pub async fn submit_fok_order(
        &self,
        token_id: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderResponse> {
        let order = self.build_signed_order(token_id, side, amount, price).await?;

        let payload = OrderPayload {
            order,
            owner: self.api_key.clone(),
            order_type: "FOK".to_string(),
        };

        let body = serde_json::to_string(&payload)?;
        let url = format!("{}/order", self.host);
        let resp = self
            .http
            .post(&url)
            .headers(self.l2_headers("POST", "/order", &body)?)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Order placement failed: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order response")
    }

    /// Build and sign an order for submission.
    async fn build_signed_order(
        &self,
        token_id: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> Result<SignedOrder> {
        let (maker_amount, taker_amount) = order_amounts(side, amount, price)?;

        let salt = uuid::Uuid::new_v4().as_u128().to_string();
        let maker = self.funder.clone();
        let signer_addr = format!("{:?}", self.address());
        let taker = "0x0000000000000000000000000000000000000000".to_string();
        // FOK orders neither rest nor expire
        let expiration = "0".to_string();
        let nonce = "0".to_string();
        let fee_rate_bps = "0".to_string();

        let struct_hash = order_struct_hash(
            &salt,
            &maker,
            &signer_addr,
            &taker,
            token_id,
            &maker_amount,
            &taker_amount,
            &expiration,
            &nonce,
            &fee_rate_bps,
            side,
        )?;
        let domain = self.domain_separator()?;

        let mut message = Vec::with_capacity(2 + 32 + 32);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(domain.as_slice());
        message.extend_from_slice(struct_hash.as_slice());
        let digest = keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .context("Failed to sign order")?;

        Ok(SignedOrder {
            salt,
            maker,
            signer: signer_addr,
            taker,
            token_id: token_id.to_string(),
            maker_amount,
            taker_amount,
            side: side.as_str().to_string(),
            expiration,
            nonce,
            fee_rate_bps,
            signature_type: SIG_TYPE_POLY_PROXY,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// EIP-712 domain separator for the CTF exchange.
    fn domain_separator(&self) -> Result<B256> {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );

        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(keccak256(b"Polymarket CTF Exchange").as_slice());
        encoded.extend_from_slice(keccak256(b"1").as_slice());
        encoded.extend_from_slice(&uint_word(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&address_word(CTF_EXCHANGE)?);

        Ok(keccak256(&encoded))
    }

    /// L2 authentication headers: HMAC-SHA256 over timestamp + method + path + body.
    fn l2_headers(&self, method: &str, path: &str, body: &str) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp().to_string();
        let message = format!("{timestamp}{method}{path}{body}");

        let secret = URL_SAFE
            .decode(&self.api_secret)
            .context("API secret is not valid base64")?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&secret)
            .map_err(|_| anyhow!("API secret has invalid length"))?;
        mac.update(message.as_bytes());
        let signature = URL_SAFE.encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("poly-address"),
            HeaderValue::from_str(&format!("{:?}", self.address()))?,
        );
        headers.insert(
            HeaderName::from_static("poly-signature"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static("poly-timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("poly-api-key"),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("poly-passphrase"),
            HeaderValue::from_str(&self.api_passphrase)?,
        );

        Ok(headers)
    }
}

/// Derive maker/taker amounts in raw token units for one side of an order.
///
/// BUY: maker pays `amount` USDC and receives `amount / price` tokens.
/// SELL: maker gives `amount` tokens and receives `amount * price` USDC.
fn order_amounts(side: OrderSide, amount: Decimal, price: Decimal) -> Result<(String, String)> {
    if price.is_zero() {
        return Err(anyhow!("Order price must be nonzero"));
    }

    let (maker, taker) = match side {
        OrderSide::Buy => (amount, amount / price),
        OrderSide::Sell => (amount, amount * price),
    };

    Ok((to_token_units(maker), to_token_units(taker)))
}

/// Convert a decimal amount to raw 6-decimal token units, truncating dust.
fn to_token_units(amount: Decimal) -> String {
    let units = (amount * Decimal::from(10u64.pow(TOKEN_DECIMALS))).trunc();
    units.to_string()
}

/// EIP-712 struct hash for the exchange Order type.
fn order_struct_hash(
    salt: &str,
    maker: &str,
    signer: &str,
    taker: &str,
    token_id: &str,
    maker_amount: &str,
    taker_amount: &str,
    expiration: &str,
    nonce: &str,
    fee_rate_bps: &str,
    side: OrderSide,
) -> Result<B256> {
    let type_hash = keccak256(
        b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
    );

    let side_value = match side {
        OrderSide::Buy => 0u8,
        OrderSide::Sell => 1u8,
    };

    let mut encoded = Vec::with_capacity(13 * 32);
    encoded.extend_from_slice(type_hash.as_slice());
    encoded.extend_from_slice(&uint_word(salt)?);
    encoded.extend_from_slice(&address_word(maker)?);
    encoded.extend_from_slice(&address_word(signer)?);
    encoded.extend_from_slice(&address_word(taker)?);
    encoded.extend_from_slice(&uint_word(token_id)?);
    encoded.extend_from_slice(&uint_word(maker_amount)?);
    encoded.extend_from_slice(&uint_word(taker_amount)?);
    encoded.extend_from_slice(&uint_word(expiration)?);
    encoded.extend_from_slice(&uint_word(nonce)?);
    encoded.extend_from_slice(&uint_word(fee_rate_bps)?);
    encoded.extend_from_slice(&u8_word(side_value));
    encoded.extend_from_slice(&u8_word(SIG_TYPE_POLY_PROXY));

    Ok(keccak256(&encoded))
}

/// Encode a decimal-string uint256 as a 32-byte big-endian word.
fn uint_word(value: &str) -> Result<[u8; 32]> {
    let n = U256::from_str(value).with_context(|| format!("Invalid uint256: {value}"))?;
    Ok(n.to_be_bytes())
}

/// Encode an address as a left-padded 32-byte word.
fn address_word(value: &str) -> Result<[u8; 32]> {
    let addr = Address::from_str(value).with_context(|| format!("Invalid address: {value}"))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_slice());
    Ok(word)
}

fn u8_word(value: u8) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[31] = value;
    word
}
