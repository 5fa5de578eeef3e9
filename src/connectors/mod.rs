// src/connectors/mod.rs - 连接器模块入口

pub mod traits;
pub mod commands;
pub mod ssh;
pub mod ticker;
pub mod hyperliquid;
pub mod lighter;

// 重新导出核心trait
pub use traits::*;

pub use commands::{RemoteCommand, UsdcOrder};
pub use hyperliquid::HyperliquidClient;
pub use lighter::LighterClient;
pub use ssh::SshExecutor;
pub use ticker::BinanceTicker;

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::normalizer::{is_failure_reply, parse_available_balance};
use crate::types::{AccountRef, AccountType, EngineError, ExchangeFamily, Result};

/// 交易所家族 -> 执行器
///
/// 默认执行器（SSH）服务所有家族，直连HTTP的家族通过 `with_override` 替换。
#[derive(Clone)]
pub struct ExecutorSet {
    default: Arc<dyn RemoteExecutor>,
    overrides: HashMap<ExchangeFamily, Arc<dyn RemoteExecutor>>,
}

impl ExecutorSet {
    pub fn new(default: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, family: ExchangeFamily, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.overrides.insert(family, executor);
        self
    }

    pub fn for_family(&self, family: ExchangeFamily) -> &dyn RemoteExecutor {
        self.overrides
            .get(&family)
            .map(|e| e.as_ref())
            .unwrap_or_else(|| self.default.as_ref())
    }

    pub fn for_account(&self, account: &AccountRef) -> &dyn RemoteExecutor {
        self.for_family(account.family)
    }

    /// 执行一条命令并返回原始输出
    ///
    /// 变更类命令（划转、调杠杆、提现、下单）的回复带失败标记时视为远端失败。
    pub async fn run(&self, account: &AccountRef, command: &RemoteCommand) -> Result<String> {
        let line = command.to_string();
        debug!("[{}] {}", account.display_name, line);
        let reply = self.for_account(account).execute(&line).await?;
        if command.is_mutating() && is_failure_reply(&reply) {
            return Err(EngineError::RemoteExecution(reply.trim().to_string()));
        }
        Ok(reply)
    }
}

/// 直连客户端回答单币种余额查询：取可动用部分，按文本数字返回
pub(crate) fn available_amount(family: ExchangeFamily, state: &str, account_type: AccountType, coin: &str) -> String {
    parse_available_balance(family, state)
        .into_iter()
        .find(|b| b.account_type == account_type && b.coin.eq_ignore_ascii_case(coin))
        .map(|b| b.amount)
        .unwrap_or_default()
        .normalize()
        .to_string()
}

/// reqwest 错误 -> 引擎错误：超时单独区分
pub(crate) fn http_error(e: reqwest::Error, timeout_secs: u64) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout(timeout_secs)
    } else {
        EngineError::RemoteExecution(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn failure_marker_only_fails_mutating_commands() {
        let executor = ScriptedExecutor::new()
            .reply("transfer bybit FUND UNIFIED USDT 5", "划转失败: 系统繁忙")
            .reply("balance bybit", "USDT 10\nerror_count 0\n");
        let executors = ExecutorSet::new(Arc::new(executor));
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();

        let transfer = RemoteCommand::Transfer {
            key: "bybit".into(),
            from: AccountType::Fund,
            to: AccountType::Unified,
            coin: "USDT".into(),
            amount: dec!(5),
        };
        assert!(matches!(executors.run(&account, &transfer).await, Err(EngineError::RemoteExecution(_))));

        let balance = RemoteCommand::Balance { key: "bybit".into() };
        assert!(executors.run(&account, &balance).await.unwrap().contains("USDT 10"));
    }

    #[test]
    fn single_coin_query_reports_only_movable_funds() {
        let state = r#"{
            "perp": {"marginSummary": {"accountValue": "10500", "totalMarginUsed": "9000"}, "withdrawable": "1500"},
            "spot": {"balances": [{"coin": "USDC", "total": "250", "hold": "200"}]}
        }"#;
        assert_eq!(available_amount(ExchangeFamily::Hyperliquid, state, AccountType::Unified, "usdc"), "1500");
        assert_eq!(available_amount(ExchangeFamily::Hyperliquid, state, AccountType::Spot, "USDC"), "50");
        assert_eq!(available_amount(ExchangeFamily::Hyperliquid, state, AccountType::Spot, "HYPE"), "0");

        let accounts = r#"{"accounts": [{"account_type": 0, "collateral": "800", "available_balance": "120.5"}]}"#;
        assert_eq!(available_amount(ExchangeFamily::Lighter, accounts, AccountType::Unified, "USDC"), "120.5");
    }
}
