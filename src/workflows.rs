//! 受流动性门控的主操作：提现、USDT 买入 USDC、理财申购/赎回、手动划转
//!
//! 主命令只在 `ensure_liquidity` 的结果允许时发出；
//! 余额不足或划转失败时返回对应错误，主命令不会被执行。
//! 手动划转和理财赎回不做再平衡，只核对来源余额。

use log::info;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregator::AccountAggregator;
use crate::connectors::{RemoteCommand, UsdcOrder};
use crate::normalizer::parse_earn_positions;
use crate::rebalancer::LiquidityRebalancer;
use crate::types::{AccountRef, AccountType, Balance, EngineError, RebalanceOutcome, Result};

/// 买入 USDC 时支付的币种和所在子账户
const TRADE_PAY_COIN: &str = "USDT";
const TRADE_ACCOUNT: AccountType = AccountType::Unified;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub coin: String,
    pub network: String,
    pub address: String,
    pub amount: Decimal,
    pub memo: Option<String>,
}

/// 主操作完成后的回执
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReceipt {
    pub rebalance: RebalanceOutcome,
    pub reply: String,
}

pub struct Workflows<'a> {
    aggregator: &'a AccountAggregator,
    buffer: Decimal,
}

impl<'a> Workflows<'a> {
    pub fn new(aggregator: &'a AccountAggregator, buffer: Decimal) -> Self {
        Self { aggregator, buffer }
    }

    async fn gated(
        &self,
        account: &AccountRef,
        coin: &str,
        target: AccountType,
        required: Decimal,
        primary: RemoteCommand,
    ) -> Result<ActionReceipt> {
        let outcome = LiquidityRebalancer::new(self.aggregator)
            .ensure_liquidity(account, coin, target, required, self.buffer)
            .await?;
        outcome.gate()?;

        info!("[{}] 执行: {}", account.display_name, primary);
        let reply = self.aggregator.executors().run(account, &primary).await?;
        Ok(ActionReceipt {
            rebalance: outcome,
            reply: reply.trim().to_string(),
        })
    }

    /// 来源余额已核对，直接执行
    async fn checked(&self, account: &AccountRef, available: Decimal, primary: RemoteCommand) -> Result<ActionReceipt> {
        info!("[{}] 执行: {}", account.display_name, primary);
        let reply = self.aggregator.executors().run(account, &primary).await?;
        Ok(ActionReceipt {
            rebalance: RebalanceOutcome::Sufficient { balance: available },
            reply: reply.trim().to_string(),
        })
    }

    pub async fn withdraw(&self, account: &AccountRef, request: WithdrawRequest) -> Result<ActionReceipt> {
        let source = account.family.withdraw_account().ok_or_else(|| {
            EngineError::RemoteExecution(format!("{} 不支持提现", account.family))
        })?;
        let coin = request.coin.to_ascii_uppercase();
        let command = RemoteCommand::Withdraw {
            key: account.exchange_key.clone(),
            coin: coin.clone(),
            network: request.network,
            address: request.address,
            amount: request.amount,
            memo: request.memo,
        };
        self.gated(account, &coin, source, request.amount, command).await
    }

    /// 用统一账户的 USDT 买入 USDC；限价单按 数量 × 价格 计算所需 USDT
    pub async fn buy_usdc(&self, account: &AccountRef, order: UsdcOrder) -> Result<ActionReceipt> {
        let required = match &order {
            UsdcOrder::Market { amount } => *amount,
            UsdcOrder::Limit { amount, price } => amount.saturating_mul(*price),
        };
        let command = RemoteCommand::BuyUsdc {
            key: account.exchange_key.clone(),
            order,
        };
        self.gated(account, TRADE_PAY_COIN, TRADE_ACCOUNT, required, command).await
    }

    /// 手动划转：方向必须是该交易所的子账户对，来源余额须覆盖数量
    pub async fn transfer(
        &self,
        account: &AccountRef,
        from: AccountType,
        to: AccountType,
        coin: &str,
        amount: Decimal,
    ) -> Result<ActionReceipt> {
        positive(amount)?;
        if !account.family.can_transfer(from, to) {
            return Err(EngineError::RemoteExecution(format!(
                "{} 不支持 {} -> {} 划转",
                account.family, from, to
            )));
        }
        let coin = coin.to_ascii_uppercase();
        let available = self.aggregator.sub_account_balance(account, from, &coin).await?;
        info!("[{}] {} {} 余额: {}", account.display_name, from, coin, available);
        if available < amount {
            return Err(EngineError::InsufficientLiquidity {
                coin,
                available,
                required: amount,
            });
        }
        let command = RemoteCommand::Transfer {
            key: account.exchange_key.clone(),
            from,
            to,
            coin,
            amount,
        };
        self.checked(account, available, command).await
    }

    /// 活期理财持仓
    pub async fn earn_positions(&self, account: &AccountRef) -> Result<Vec<Balance>> {
        ensure_earn(account)?;
        let command = RemoteCommand::EarnPosition {
            key: account.exchange_key.clone(),
        };
        let reply = self.aggregator.executors().run(account, &command).await?;
        Ok(parse_earn_positions(account.family, &reply))
    }

    /// 用现货余额申购活期理财，现货不足时先从资金账户补足
    pub async fn earn_subscribe(&self, account: &AccountRef, coin: &str, amount: Decimal) -> Result<ActionReceipt> {
        ensure_earn(account)?;
        positive(amount)?;
        let coin = coin.to_ascii_uppercase();
        let command = RemoteCommand::EarnSubscribe {
            key: account.exchange_key.clone(),
            coin: coin.clone(),
            amount,
        };
        self.gated(account, &coin, AccountType::Spot, amount, command).await
    }

    /// 赎回活期理财到现货；不给数量时全部赎回
    pub async fn earn_redeem(&self, account: &AccountRef, coin: &str, amount: Option<Decimal>) -> Result<ActionReceipt> {
        ensure_earn(account)?;
        if let Some(amount) = amount {
            positive(amount)?;
        }
        let coin = coin.to_ascii_uppercase();
        let held = self
            .earn_positions(account)
            .await?
            .into_iter()
            .find(|b| b.coin == coin)
            .map(|b| b.amount)
            .unwrap_or_default();
        let required = amount.unwrap_or(held);
        if held.is_zero() || held < required {
            return Err(EngineError::InsufficientLiquidity {
                coin,
                available: held,
                required,
            });
        }
        let command = RemoteCommand::EarnRedeem {
            key: account.exchange_key.clone(),
            coin,
            amount,
        };
        self.checked(account, held, command).await
    }
}

fn ensure_earn(account: &AccountRef) -> Result<()> {
    if account.family.supports_earn() {
        Ok(())
    } else {
        Err(EngineError::RemoteExecution(format!("{} 没有活期理财", account.family)))
    }
}

fn positive(amount: Decimal) -> Result<()> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(EngineError::Config(format!("数量必须为正: {amount}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ExecutorSet;
    use crate::oracle::PriceOracle;
    use crate::testing::{FixedTicker, LedgerExecutor};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn aggregator(ledger: Arc<LedgerExecutor>) -> AccountAggregator {
        AccountAggregator::new(ExecutorSet::new(ledger), PriceOracle::new(Arc::new(FixedTicker::new())))
    }

    fn request(amount: Decimal) -> WithdrawRequest {
        WithdrawRequest {
            coin: "usdt".into(),
            network: "TRC20".into(),
            address: "TXyzAddress".into(),
            amount,
            memo: None,
        }
    }

    #[tokio::test]
    async fn withdraw_runs_after_transfer() {
        let ledger = Arc::new(
            LedgerExecutor::new()
                .with_balance(AccountType::Fund, "USDT", dec!(10))
                .with_balance(AccountType::Unified, "USDT", dec!(100)),
        );
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();

        let receipt = Workflows::new(&aggregator, dec!(1))
            .withdraw(&account, request(dec!(50)))
            .await
            .unwrap();

        assert!(matches!(receipt.rebalance, RebalanceOutcome::Transferred { .. }));
        let calls = ledger.calls();
        let transfer = calls.iter().position(|c| c.starts_with("transfer ")).unwrap();
        let withdraw = calls.iter().position(|c| c.starts_with("withdraw ")).unwrap();
        assert!(transfer < withdraw);
        assert_eq!(calls[withdraw], "withdraw bybit USDT TRC20 TXyzAddress 50");
    }

    #[tokio::test]
    async fn insufficient_funds_never_withdraw() {
        let ledger = Arc::new(LedgerExecutor::new().with_balance(AccountType::Spot, "USDT", dec!(10)));
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "binance", "binance").unwrap();

        let result = Workflows::new(&aggregator, dec!(1)).withdraw(&account, request(dec!(50))).await;
        assert!(matches!(result, Err(EngineError::InsufficientLiquidity { .. })));
        assert!(ledger.calls().iter().all(|c| !c.starts_with("withdraw ")));
    }

    #[tokio::test]
    async fn unsupported_family_cannot_withdraw() {
        let ledger = Arc::new(LedgerExecutor::new());
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "gate", "gate").unwrap();
        let result = Workflows::new(&aggregator, dec!(1)).withdraw(&account, request(dec!(1))).await;
        assert!(matches!(result, Err(EngineError::RemoteExecution(_))));
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn limit_order_requires_amount_times_price() {
        let ledger = Arc::new(
            LedgerExecutor::new()
                .with_balance(AccountType::Unified, "USDT", dec!(100))
                .with_balance(AccountType::Fund, "USDT", dec!(0.5)),
        );
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();
        let workflows = Workflows::new(&aggregator, dec!(1));

        let ok = workflows
            .buy_usdc(&account, UsdcOrder::Limit { amount: dec!(100), price: dec!(0.999) })
            .await
            .unwrap();
        assert_eq!(ok.rebalance, RebalanceOutcome::Sufficient { balance: dec!(100) });

        let short = workflows
            .buy_usdc(&account, UsdcOrder::Limit { amount: dec!(100), price: dec!(1.01) })
            .await;
        assert!(matches!(short, Err(EngineError::InsufficientLiquidity { .. })));
        assert_eq!(ledger.calls().iter().filter(|c| c.starts_with("buy_usdc ")).count(), 1);
    }

    #[tokio::test]
    async fn manual_transfer_checks_pair_and_source() {
        let ledger = Arc::new(LedgerExecutor::new().with_balance(AccountType::Unified, "USDT", dec!(30)));
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();
        let workflows = Workflows::new(&aggregator, dec!(1));

        let receipt = workflows
            .transfer(&account, AccountType::Unified, AccountType::Fund, "usdt", dec!(20))
            .await
            .unwrap();
        assert_eq!(receipt.rebalance, RebalanceOutcome::Sufficient { balance: dec!(30) });
        assert_eq!(ledger.balance(AccountType::Fund, "USDT"), dec!(20));

        let short = workflows
            .transfer(&account, AccountType::Unified, AccountType::Fund, "USDT", dec!(20))
            .await;
        assert!(matches!(short, Err(EngineError::InsufficientLiquidity { .. })));

        let bad_pair = workflows
            .transfer(&account, AccountType::Unified, AccountType::Spot, "USDT", dec!(1))
            .await;
        assert!(matches!(bad_pair, Err(EngineError::RemoteExecution(_))));
        assert_eq!(ledger.transfers(), vec!["transfer bybit UNIFIED FUND USDT 20".to_string()]);
    }

    #[tokio::test]
    async fn earn_subscribe_tops_up_spot_first() {
        let ledger = Arc::new(
            LedgerExecutor::new()
                .with_balance(AccountType::Spot, "USDT", dec!(5))
                .with_balance(AccountType::Fund, "USDT", dec!(100)),
        );
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "binance", "binance").unwrap();

        let receipt = Workflows::new(&aggregator, dec!(1))
            .earn_subscribe(&account, "USDT", dec!(50))
            .await
            .unwrap();
        assert!(matches!(receipt.rebalance, RebalanceOutcome::Transferred { .. }));
        assert_eq!(ledger.balance(AccountType::Earn, "USDT"), dec!(50));
        let calls = ledger.calls();
        let transfer = calls.iter().position(|c| c.starts_with("transfer ")).unwrap();
        let subscribe = calls.iter().position(|c| c.starts_with("earn binance subscribe")).unwrap();
        assert!(transfer < subscribe);
    }

    #[tokio::test]
    async fn earn_redeem_rejects_more_than_held() {
        let ledger = Arc::new(LedgerExecutor::new().with_balance(AccountType::Earn, "USDC", dec!(40)));
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "binance", "binance").unwrap();
        let workflows = Workflows::new(&aggregator, dec!(1));

        let too_much = workflows.earn_redeem(&account, "USDC", Some(dec!(41))).await;
        assert!(matches!(too_much, Err(EngineError::InsufficientLiquidity { .. })));
        assert!(ledger.calls().iter().all(|c| !c.contains(" redeem ")));

        workflows.earn_redeem(&account, "usdc", None).await.unwrap();
        assert_eq!(ledger.balance(AccountType::Spot, "USDC"), dec!(40));
        assert!(workflows.earn_positions(&account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn earn_is_binance_only() {
        let ledger = Arc::new(LedgerExecutor::new());
        let aggregator = aggregator(ledger.clone());
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();
        let result = Workflows::new(&aggregator, dec!(1)).earn_subscribe(&account, "USDT", dec!(1)).await;
        assert!(matches!(result, Err(EngineError::RemoteExecution(_))));
        assert!(ledger.calls().is_empty());
    }
}
