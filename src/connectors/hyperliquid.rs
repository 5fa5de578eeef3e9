//! Hyperliquid 直连客户端
//!
//! 只使用无需签名的 `POST /info` 查询接口，把命令词汇表映射为对应的 info 请求，
//! 返回原始 JSON 交给规范化模块解析。划转、调杠杆等需要钱包签名的操作不在此实现。

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::connectors::commands::RemoteCommand;
use crate::connectors::{available_amount, http_error};
use crate::connectors::traits::RemoteExecutor;
use crate::types::{EngineError, ExchangeFamily, Result};

pub const HYPERLIQUID_API_URL: &str = "https://api.hyperliquid.xyz";

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct HyperliquidClient {
    client: Client,
    api_url: String,
    wallet_address: String,
    timeout_secs: u64,
}

impl HyperliquidClient {
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

    async fn info(&self, body: Value) -> Result<Value> {
        debug!("hyperliquid info: {}", body);
        self.client
            .post(format!("{}/info", self.api_url))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| http_error(e, self.timeout_secs))?
            .json()
            .await
            .map_err(|e| EngineError::RemoteExecution(format!("Hyperliquid 响应不是JSON: {e}")))
    }

    /// 合约状态 + 现货余额 + 中间价，组合为一个载荷
    async fn account_state(&self) -> Result<Value> {
        let perp = self
            .info(json!({"type": "clearinghouseState", "user": self.wallet_address}))
            .await?;
        let spot = self
            .info(json!({"type": "spotClearinghouseState", "user": self.wallet_address}))
            .await?;
        let mids = self.info(json!({"type": "allMids"})).await?;
        Ok(json!({"perp": perp, "spot": spot, "mids": mids}))
    }

    fn window_start(days: u32) -> i64 {
        Utc::now().timestamp_millis() - i64::from(days.max(1)) * DAY_MS
    }
}

#[async_trait]
impl RemoteExecutor for HyperliquidClient {
    async fn execute(&self, command: &str) -> Result<String> {
        let command = RemoteCommand::parse(command)?;
        let payload = match &command {
            RemoteCommand::Balance { .. } | RemoteCommand::Positions { .. } | RemoteCommand::MarginSummary { .. } => {
                self.account_state().await?
            }
            RemoteCommand::AccountBalance { account_type, coin, .. } => {
                // 单值查询按文本数字返回，与远端脚本保持一致
                let state = self.account_state().await?;
                return Ok(available_amount(ExchangeFamily::Hyperliquid, &state.to_string(), *account_type, coin));
            }
            RemoteCommand::FundingHistory { days, .. } => {
                self.info(json!({
                    "type": "userFunding",
                    "user": self.wallet_address,
                    "startTime": Self::window_start(*days),
                }))
                .await?
            }
            RemoteCommand::FundingRateHistory { symbol, days, .. } => {
                self.info(json!({
                    "type": "fundingHistory",
                    "coin": symbol,
                    "startTime": Self::window_start(*days),
                }))
                .await?
            }
            other => {
                return Err(EngineError::RemoteExecution(format!(
                    "Hyperliquid 不支持未签名的操作: {other}"
                )))
            }
        };
        Ok(payload.to_string())
    }
}
