//! Binance 现货行情客户端：`GET /api/v3/ticker/price?symbol=`

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::connectors::http_error;
use crate::connectors::traits::PriceTicker;
use crate::normalizer::parse_amount;
use crate::types::{EngineError, Result};

pub const BINANCE_SPOT_API_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

pub struct BinanceTicker {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl BinanceTicker {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("无法创建HTTP客户端: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl PriceTicker for BinanceTicker {
    async fn ticker_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| http_error(e, self.timeout_secs))?;

        // 交易对不存在时 Binance 返回 400 (-1121)
        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) {
            debug!("交易对不存在: {}", symbol);
            return Ok(None);
        }

        let ticker: TickerPrice = response
            .error_for_status()
            .map_err(|e| http_error(e, self.timeout_secs))?
            .json()
            .await
            .map_err(|e| EngineError::Parse(format!("解析行情失败: {e}")))?;

        Ok(parse_amount(&ticker.price).filter(|p| *p > Decimal::ZERO))
    }
}
