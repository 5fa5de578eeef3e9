//! 账户汇总模块
//!
//! 逐个账户拉取全部子账户余额，按币种合并并估值，再汇总为按交易所、按用户的总额和排名分布。
//! 取数失败的账户保留在报告中并带上 `error`，不计入任何数值总额。

use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::connectors::{ExecutorSet, RemoteCommand};
use crate::normalizer::{is_failure_reply, merge_balances, parse_balance, parse_single_amount};
use crate::oracle::{PriceOracle, PriceSession};
use crate::types::{AccountRef, AccountType, Balance, EngineError, ExchangeFamily, Result};

/// 展示阈值（美元）：低于此价值的币种视为粉尘
pub const DEFAULT_DUST_THRESHOLD_USD: Decimal = Decimal::TEN;

/// 逐币种探测子账户时总会查询的币种
pub const PROBE_COINS: [&str; 4] = ["USDC", "USDT", "BTC", "ETH"];

/// 一个币种在某账户下的合计持有
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinHolding {
    pub coin: String,
    pub amount: Decimal,
    pub price_usd: Decimal,
    pub value_usd: Decimal,
    pub by_account_type: BTreeMap<AccountType, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReport {
    pub account: AccountRef,
    pub balances: Vec<Balance>,
    /// 按价值降序，未过滤粉尘
    pub holdings: Vec<CoinHolding>,
    /// 取数失败时为 None
    pub total_usd: Option<Decimal>,
    pub error: Option<String>,
}

impl AccountReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 展示用的持有列表（已过滤粉尘）
    pub fn display_holdings(&self, threshold: Decimal) -> Vec<CoinHolding> {
        filter_dust(&self.holdings, threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeBreakdown {
    pub family: ExchangeFamily,
    pub accounts: usize,
    pub total_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserTotal {
    pub user_id: String,
    pub total_usd: Decimal,
}

/// 排名分布中的一项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub account_id: String,
    pub display_name: String,
    pub family: ExchangeFamily,
    pub total_usd: Decimal,
    pub share_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub accounts: Vec<AccountReport>,
    pub by_exchange: Vec<ExchangeBreakdown>,
    pub by_user: Vec<UserTotal>,
    pub distribution: Vec<DistributionEntry>,
    pub grand_total_usd: Decimal,
}

impl AggregateReport {
    pub fn failed_accounts(&self) -> impl Iterator<Item = &AccountReport> {
        self.accounts.iter().filter(|a| !a.is_ok())
    }
}

/// 粉尘过滤：只保留价值不低于阈值的币种。纯函数，重复过滤结果不变
pub fn filter_dust(holdings: &[CoinHolding], threshold: Decimal) -> Vec<CoinHolding> {
    holdings.iter().filter(|h| h.value_usd >= threshold).cloned().collect()
}

pub struct AccountAggregator {
    executors: ExecutorSet,
    oracle: PriceOracle,
}

impl AccountAggregator {
    pub fn new(executors: ExecutorSet, oracle: PriceOracle) -> Self {
        Self { executors, oracle }
    }

    pub fn executors(&self) -> &ExecutorSet {
        &self.executors
    }

    /// 查询单个子账户中某币种的余额（未过滤）
    ///
    /// 用法提示等无法解析的回复按 0 处理；远端失败（包括带失败标记的回复）向上传播。
    pub async fn sub_account_balance(&self, account: &AccountRef, account_type: AccountType, coin: &str) -> Result<Decimal> {
        let command = RemoteCommand::AccountBalance {
            key: account.exchange_key.clone(),
            account_type,
            coin: coin.to_ascii_uppercase(),
        };
        let reply = self.executors.run(account, &command).await?;
        if is_failure_reply(&reply) {
            warn!("[{}] {} {} 余额查询失败: {}", account.display_name, account_type, coin, reply.trim());
            return Err(EngineError::RemoteExecution(reply.trim().to_string()));
        }
        let amount = parse_single_amount(&reply).unwrap_or_else(|| {
            debug!("[{}] {} {} 余额回复无法解析，按0处理: {}", account.display_name, account_type, coin, reply.trim());
            Decimal::ZERO
        });
        Ok(amount.max(Decimal::ZERO))
    }

    /// 拉取账户全部子账户余额
    pub async fn fetch_balances(&self, account: &AccountRef) -> Result<Vec<Balance>> {
        let command = RemoteCommand::Balance {
            key: account.exchange_key.clone(),
        };
        let reply = self.executors.run(account, &command).await?;
        let mut balances = parse_balance(account.family, &reply);
        if balances.is_empty() && is_failure_reply(&reply) {
            return Err(EngineError::RemoteExecution(reply.trim().to_string()));
        }

        for &account_type in account.family.probed_account_types() {
            let mut coins: BTreeSet<String> = PROBE_COINS.iter().map(|c| c.to_string()).collect();
            coins.extend(balances.iter().map(|b| b.coin.clone()));
            for coin in coins {
                let amount = self.sub_account_balance(account, account_type, &coin).await?;
                balances.extend(Balance::new(account.family, account_type, &coin, amount));
            }
        }
        Ok(merge_balances(balances))
    }

    async fn account_report(&self, account: &AccountRef, prices: &mut PriceSession<'_>) -> AccountReport {
        match self.fetch_balances(account).await {
            Ok(balances) => {
                let holdings = value_holdings(&balances, prices).await;
                let total = holdings.iter().fold(Decimal::ZERO, |acc, h| acc.saturating_add(h.value_usd));
                info!("[{}] 账户估值 ${}", account.display_name, total.round_dp(2));
                AccountReport {
                    account: account.clone(),
                    balances,
                    holdings,
                    total_usd: Some(total),
                    error: None,
                }
            }
            Err(e) => {
                warn!("[{}] 查询失败: {}", account.display_name, e);
                AccountReport {
                    account: account.clone(),
                    balances: Vec::new(),
                    holdings: Vec::new(),
                    total_usd: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// 按顺序汇总多个账户
    pub async fn aggregate_balances(&self, accounts: &[AccountRef]) -> AggregateReport {
        let mut prices = self.oracle.session();
        let mut reports = Vec::with_capacity(accounts.len());
        for account in accounts {
            reports.push(self.account_report(account, &mut prices).await);
        }
        build_report(reports)
    }
}

async fn value_holdings(balances: &[Balance], prices: &mut PriceSession<'_>) -> Vec<CoinHolding> {
    let mut by_coin: BTreeMap<String, BTreeMap<AccountType, Decimal>> = BTreeMap::new();
    for b in balances {
        let slot = by_coin
            .entry(b.coin.clone())
            .or_default()
            .entry(b.account_type)
            .or_insert(Decimal::ZERO);
        *slot = slot.saturating_add(b.amount);
    }

    let mut holdings = Vec::with_capacity(by_coin.len());
    for (coin, by_account_type) in by_coin {
        let amount = by_account_type.values().fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v));
        let price_usd = prices.price_usd(&coin).await;
        holdings.push(CoinHolding {
            value_usd: amount.saturating_mul(price_usd),
            coin,
            amount,
            price_usd,
            by_account_type,
        });
    }
    holdings.sort_by(|a, b| b.value_usd.cmp(&a.value_usd).then_with(|| a.coin.cmp(&b.coin)));
    holdings
}

fn build_report(accounts: Vec<AccountReport>) -> AggregateReport {
    let mut by_exchange: BTreeMap<ExchangeFamily, (usize, Decimal)> = BTreeMap::new();
    let mut by_user: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut grand_total = Decimal::ZERO;

    for report in &accounts {
        let Some(total) = report.total_usd else {
            continue;
        };
        let entry = by_exchange.entry(report.account.family).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(total);
        let user = by_user.entry(report.account.user_id.clone()).or_insert(Decimal::ZERO);
        *user = user.saturating_add(total);
        grand_total = grand_total.saturating_add(total);
    }

    let mut distribution: Vec<DistributionEntry> = accounts
        .iter()
        .filter_map(|r| {
            let total = r.total_usd?;
            Some(DistributionEntry {
                account_id: r.account.account_id.clone(),
                display_name: r.account.display_name.clone(),
                family: r.account.family,
                total_usd: total,
                share_pct: share_pct(total, grand_total),
            })
        })
        .collect();
    distribution.sort_by(|a, b| b.total_usd.cmp(&a.total_usd));

    let mut by_exchange: Vec<ExchangeBreakdown> = by_exchange
        .into_iter()
        .map(|(family, (accounts, total_usd))| ExchangeBreakdown { family, accounts, total_usd })
        .collect();
    by_exchange.sort_by(|a, b| b.total_usd.cmp(&a.total_usd));

    AggregateReport {
        accounts,
        by_exchange,
        by_user: by_user
            .into_iter()
            .map(|(user_id, total_usd)| UserTotal { user_id, total_usd })
            .collect(),
        distribution,
        grand_total_usd: grand_total,
    }
}

fn share_pct(part: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        (part / total).saturating_mul(Decimal::ONE_HUNDRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedTicker, ScriptedExecutor};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn holding(coin: &str, value: Decimal) -> CoinHolding {
        CoinHolding {
            coin: coin.into(),
            amount: value,
            price_usd: Decimal::ONE,
            value_usd: value,
            by_account_type: BTreeMap::new(),
        }
    }

    fn aggregator(executor: ScriptedExecutor, ticker: FixedTicker) -> AccountAggregator {
        AccountAggregator::new(
            ExecutorSet::new(Arc::new(executor)),
            PriceOracle::new(Arc::new(ticker)),
        )
    }

    #[test]
    fn dust_filter_is_idempotent() {
        let holdings = vec![holding("USDT", dec!(250)), holding("PEPE", dec!(9.99)), holding("ETH", dec!(10))];
        let once = filter_dust(&holdings, DEFAULT_DUST_THRESHOLD_USD);
        let twice = filter_dust(&once, DEFAULT_DUST_THRESHOLD_USD);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
        assert!(once.iter().all(|h| h.coin != "PEPE"));
    }

    #[tokio::test]
    async fn failed_account_is_reported_not_totalled() {
        let _ = env_logger::try_init();
        let executor = ScriptedExecutor::new()
            .reply("balance binance", "💰 现货账户余额 (SPOT):\nUSDT\t\t100\nETH\t\t0.5\n")
            .reply("balance gate", "USDC 50\nDOGE 3\n")
            .fail("balance bitget", EngineError::RemoteExecution("ssh: connection refused".into()));
        let ticker = FixedTicker::new().price("ETHUSDT", dec!(3000)).price("DOGEUSDT", dec!(0.1));
        let aggregator = aggregator(executor, ticker);

        let accounts = vec![
            AccountRef::new("eb65", "binance", "binance").unwrap(),
            AccountRef::new("eb65", "gate", "gate").unwrap(),
            AccountRef::new("eb65", "bitget", "bitget").unwrap(),
        ];
        let report = aggregator.aggregate_balances(&accounts).await;

        assert_eq!(report.accounts.len(), 3);
        assert_eq!(report.accounts.iter().filter(|a| a.total_usd.is_some()).count(), 2);
        let failed: Vec<_> = report.failed_accounts().collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap_or_default().contains("connection refused"));

        // 1600 + 50.3
        assert_eq!(report.grand_total_usd, dec!(1650.3));
        assert_eq!(report.by_user[0].total_usd, dec!(1650.3));
        assert_eq!(report.distribution.len(), 2);
        assert_eq!(report.distribution[0].family, ExchangeFamily::Binance);

        // DOGE 只有 0.3 美元，不展示但计入总额
        let gate = &report.accounts[1];
        assert_eq!(gate.holdings.len(), 2);
        assert_eq!(gate.display_holdings(DEFAULT_DUST_THRESHOLD_USD).len(), 1);
    }

    #[tokio::test]
    async fn bybit_unified_is_probed_per_coin() {
        let executor = ScriptedExecutor::new()
            .reply("balance bybit", "币种\t\t可用\nUSDT\t\t20\nSOL\t\t2\n")
            .reply("account_balance bybit UNIFIED USDC", "150.5")
            .reply("account_balance bybit UNIFIED USDT", "用法: account_balance <exchange> <type> <coin>")
            .reply("account_balance bybit UNIFIED SOL", "1");
        let ticker = FixedTicker::new().price("SOLUSDT", dec!(150));
        let aggregator = aggregator(executor, ticker);
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();

        let balances = aggregator.fetch_balances(&account).await.unwrap();
        let unified: Vec<_> = balances.iter().filter(|b| b.account_type == AccountType::Unified).collect();
        assert_eq!(unified.len(), 2);

        let report = aggregator.aggregate_balances(&[account]).await;
        let sol = report.accounts[0].holdings.iter().find(|h| h.coin == "SOL").unwrap();
        assert_eq!(sol.amount, dec!(3));
        assert_eq!(sol.by_account_type.get(&AccountType::Unified), Some(&dec!(1)));
        assert_eq!(report.grand_total_usd, dec!(620.5));
    }

    #[tokio::test]
    async fn failed_probe_marks_account_failed() {
        let executor = ScriptedExecutor::new()
            .reply("balance bybit", "USDT\t\t20\n")
            .reply("account_balance bybit UNIFIED BTC", "获取余额失败: timeout");
        let aggregator = aggregator(executor, FixedTicker::new());
        let account = AccountRef::new("eb65", "bybit", "bybit").unwrap();

        let report = aggregator.aggregate_balances(&[account]).await;
        assert_eq!(report.accounts[0].total_usd, None);
        assert!(report.accounts[0].error.as_deref().unwrap_or_default().contains("失败"));
        assert_eq!(report.grand_total_usd, Decimal::ZERO);
    }

    #[test]
    fn share_of_empty_total_is_zero() {
        assert_eq!(share_pct(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(share_pct(dec!(25), dec!(100)), dec!(25));
    }
}
