//! Lighter 直连客户端
//!
//! 账户按 L1 钱包地址查询；资金费收入走无认证的 `positionFunding` 接口，
//! 费率历史需要先从 `orderBooks` 查到 market_id。

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::connectors::commands::RemoteCommand;
use crate::connectors::{available_amount, http_error};
use crate::connectors::traits::RemoteExecutor;
use crate::normalizer::json::{array_at, i64_field, str_field};
use crate::types::{EngineError, ExchangeFamily, Result};

pub const LIGHTER_API_URL: &str = "https://mainnet.zklighter.elliot.ai";

/// `positionFunding` 中表示全部市场的 market_id
const ALL_MARKETS: i64 = 255;
const FUNDING_PAGE_LIMIT: u32 = 100;
const DAY_SECS: i64 = 24 * 60 * 60;

pub struct LighterClient {
    client: Client,
    api_url: String,
    wallet_address: String,
    timeout_secs: u64,
}

impl LighterClient {
    pub fn new(api_url: impl Into<String>, wallet_address: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("无法创建HTTP客户端: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            wallet_address: wallet_address.into(),
            timeout_secs,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        debug!("lighter GET {} {:?}", path, query);
        self.client
            .get(format!("{}{}", self.api_url, path))
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| http_error(e, self.timeout_secs))?
            .json()
            .await
            .map_err(|e| EngineError::RemoteExecution(format!("Lighter 响应不是JSON: {e}")))
    }

    async fn accounts(&self) -> Result<Value> {
        self.get(
            "/api/v1/account",
            &[("by", "l1_address".to_string()), ("value", self.wallet_address.clone())],
        )
        .await
    }

    /// 主账户索引：`account_type == 0`，缺失时取第一个
    fn account_index(accounts: &Value) -> Option<i64> {
        let rows = array_at(accounts, &["accounts"])?;
        rows.iter()
            .find(|acc| i64_field(acc, &["account_type"]) == Some(0))
            .or_else(|| rows.first())
            .and_then(|acc| i64_field(acc, &["account_index", "index"]))
    }

    async fn market_id(&self, symbol: &str) -> Result<i64> {
        let books = self.get("/api/v1/orderBooks", &[]).await?;
        array_at(&books, &["order_books"])
            .into_iter()
            .flatten()
            .find(|book| str_field(book, &["symbol"]).is_some_and(|s| s.eq_ignore_ascii_case(symbol)))
            .and_then(|book| i64_field(book, &["market_id"]))
            .ok_or_else(|| EngineError::RemoteExecution(format!("Lighter 市场不存在: {symbol}")))
    }

    async fn position_fundings(&self) -> Result<Value> {
        let accounts = self.accounts().await?;
        let index = Self::account_index(&accounts)
            .ok_or_else(|| EngineError::RemoteExecution(format!("Lighter 账户不存在: {}", self.wallet_address)))?;
        let page = self
            .get(
                "/api/v1/positionFunding",
                &[
                    ("account_index", index.to_string()),
                    ("market_id", ALL_MARKETS.to_string()),
                    ("limit", FUNDING_PAGE_LIMIT.to_string()),
                ],
            )
            .await?;
        // 无认证接口把记录放在 `fundings` 下，这里统一为 `position_fundings`
        let rows = page
            .get("position_fundings")
            .or_else(|| page.get("fundings"))
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(json!({ "position_fundings": rows }))
    }

    async fn funding_rates(&self, symbol: &str, days: u32) -> Result<Value> {
        let market_id = self.market_id(symbol).await?;
        let end = Utc::now().timestamp();
        let start = end - i64::from(days.max(1)) * DAY_SECS;
        let mut page = self
            .get(
                "/api/v1/fundings",
                &[
                    ("market_id", market_id.to_string()),
                    ("resolution", "1h".to_string()),
                    ("start_timestamp", start.to_string()),
                    ("end_timestamp", end.to_string()),
                    ("count_back", (days.max(1) * 24).to_string()),
                ],
            )
            .await?;
        // 费率点不带交易对名称，补上查询时的 symbol
        if let Some(rows) = page.get_mut("fundings").and_then(Value::as_array_mut) {
            for row in rows.iter_mut().filter_map(Value::as_object_mut) {
                row.entry("symbol").or_insert_with(|| json!(symbol));
            }
        }
        Ok(page)
    }
}

#[async_trait]
impl RemoteExecutor for LighterClient {
    async fn execute(&self, command: &str) -> Result<String> {
        let command = RemoteCommand::parse(command)?;
        let payload = match &command {
            RemoteCommand::Balance { .. } | RemoteCommand::Positions { .. } | RemoteCommand::MarginSummary { .. } => {
                self.accounts().await?
            }
            RemoteCommand::AccountBalance { account_type, coin, .. } => {
                let accounts = self.accounts().await?;
                return Ok(available_amount(ExchangeFamily::Lighter, &accounts.to_string(), *account_type, coin));
            }
            RemoteCommand::FundingHistory { .. } => self.position_fundings().await?,
            RemoteCommand::FundingRateHistory { symbol, days, .. } => self.funding_rates(symbol, *days).await?,
            other => {
                return Err(EngineError::RemoteExecution(format!(
                    "Lighter 不支持未签名的操作: {other}"
                )))
            }
        };
        Ok(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_index_prefers_main_account() {
        let accounts = json!({"accounts": [
            {"account_type": 1, "account_index": 7},
            {"account_type": 0, "account_index": 3}
        ]});
        assert_eq!(LighterClient::account_index(&accounts), Some(3));
        assert_eq!(LighterClient::account_index(&json!({"accounts": []})), None);
    }
}
