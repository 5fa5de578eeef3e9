//! 持仓风险分析
//!
//! 把规范化后的持仓按名义价值降序排列，给出总名义价值、总未实现盈亏、
//! 每个持仓距强平的百分比和预警级别；合约账户另有保证金使用率分级。
//! 调杠杆成功后只就地更新内存中的 `leverage`，不重新拉取。

use log::{info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::connectors::{ExecutorSet, RemoteCommand};
use crate::normalizer::{parse_margin_summary, parse_positions};
use crate::types::{AccountRef, EngineError, MarginSummary, Position, Result};

pub const MIN_LEVERAGE: u32 = 1;
pub const MAX_LEVERAGE: u32 = 125;

/// 强平预警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LiquidationAlert {
    Warning,
    Critical,
}

impl LiquidationAlert {
    /// 距强平 < 5% 为 Critical，< 10% 为 Warning
    pub fn for_position(position: &Position) -> Option<Self> {
        let distance = position.distance_to_liquidation_pct()?;
        if distance < Decimal::from(5) {
            Some(LiquidationAlert::Critical)
        } else if distance < Decimal::TEN {
            Some(LiquidationAlert::Warning)
        } else {
            None
        }
    }
}

/// 保证金使用率分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MarginRisk {
    Safe,
    Moderate,
    High,
    Danger,
}

impl MarginRisk {
    pub fn from_usage_pct(usage: Decimal) -> Self {
        if usage < Decimal::from(30) {
            MarginRisk::Safe
        } else if usage < Decimal::from(60) {
            MarginRisk::Moderate
        } else if usage < Decimal::from(80) {
            MarginRisk::High
        } else {
            MarginRisk::Danger
        }
    }
}

impl fmt::Display for MarginRisk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            MarginRisk::Safe => "安全",
            MarginRisk::Moderate => "适中",
            MarginRisk::High => "较高",
            MarginRisk::Danger => "危险",
        };
        f.write_str(label)
    }
}

/// 保证金使用率（%）；账户价值不为正时为 0
pub fn margin_usage_pct(summary: &MarginSummary) -> Decimal {
    if summary.account_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    summary
        .margin_used
        .checked_div(summary.account_value)
        .map_or(Decimal::ZERO, |r| r.saturating_mul(Decimal::ONE_HUNDRED))
}

/// 一个账户的持仓快照及汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionBook {
    /// 按名义价值降序
    pub positions: Vec<Position>,
    pub total_notional: Decimal,
    pub total_pnl: Decimal,
}

impl PositionBook {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }

    /// 需要预警的持仓，Critical 在前
    pub fn alerts(&self) -> Vec<(&Position, LiquidationAlert)> {
        let mut alerts: Vec<_> = self
            .positions
            .iter()
            .filter_map(|p| LiquidationAlert::for_position(p).map(|a| (p, a)))
            .collect();
        alerts.sort_by(|a, b| b.1.cmp(&a.1));
        alerts
    }

    // 双向持仓模式下同一交易对可能有多空两条
    fn set_leverage(&mut self, symbol: &str, leverage: u32) {
        for position in self.positions.iter_mut().filter(|p| p.symbol.eq_ignore_ascii_case(symbol)) {
            position.leverage = Some(leverage);
        }
    }
}

/// 过滤零持仓、按名义价值降序并计算汇总
pub fn analyze_positions(positions: Vec<Position>) -> PositionBook {
    let mut positions: Vec<Position> = positions.into_iter().filter(|p| !p.size.is_zero()).collect();
    positions.sort_by(|a, b| b.notional().cmp(&a.notional()).then_with(|| a.symbol.cmp(&b.symbol)));
    let total_notional = positions.iter().fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.notional()));
    let total_pnl = positions.iter().fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.unrealized_pnl));
    PositionBook {
        positions,
        total_notional,
        total_pnl,
    }
}

pub fn validate_leverage(leverage: u32) -> Result<()> {
    if (MIN_LEVERAGE..=MAX_LEVERAGE).contains(&leverage) {
        Ok(())
    } else {
        Err(EngineError::InvalidLeverage(leverage))
    }
}

pub struct RiskAnalyzer {
    executors: ExecutorSet,
}

impl RiskAnalyzer {
    pub fn new(executors: ExecutorSet) -> Self {
        Self { executors }
    }

    pub async fn fetch_positions(&self, account: &AccountRef) -> Result<PositionBook> {
        let command = RemoteCommand::Positions {
            key: account.exchange_key.clone(),
            family: account.family,
        };
        let reply = self.executors.run(account, &command).await?;
        Ok(analyze_positions(parse_positions(account.family, &reply)))
    }

    /// 合约账户保证金概况；交易所不提供时为 None
    pub async fn fetch_margin_summary(&self, account: &AccountRef) -> Result<Option<MarginSummary>> {
        let command = RemoteCommand::MarginSummary {
            key: account.exchange_key.clone(),
        };
        let reply = self.executors.run(account, &command).await?;
        Ok(parse_margin_summary(account.family, &reply))
    }

    /// 修改杠杆，成功后就地更新持仓快照中的杠杆
    pub async fn apply_leverage_update(
        &self,
        account: &AccountRef,
        book: &mut PositionBook,
        symbol: &str,
        leverage: u32,
    ) -> Result<()> {
        validate_leverage(leverage)?;
        let symbol = book
            .get(symbol)
            .map(|p| p.symbol.clone())
            .ok_or_else(|| EngineError::PositionNotFound(symbol.to_string()))?;

        let command = RemoteCommand::Leverage {
            key: account.exchange_key.clone(),
            symbol: symbol.clone(),
            leverage,
        };
        if let Err(e) = self.executors.run(account, &command).await {
            warn!("[{}] {} 杠杆修改失败: {}", account.display_name, symbol, e);
            return Err(e);
        }
        book.set_leverage(&symbol, leverage);
        info!("[{}] {} 杠杆已修改为 {}x", account.display_name, symbol, leverage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;
    use crate::types::{ExchangeFamily, PositionSide};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn position(symbol: &str, side: PositionSide, size: Decimal, mark: Decimal, liq: Option<Decimal>) -> Position {
        Position {
            exchange: ExchangeFamily::Binance,
            symbol: symbol.into(),
            side,
            size,
            entry_price: mark,
            mark_price: mark,
            unrealized_pnl: dec!(1.5),
            leverage: Some(10),
            liquidation_price: liq,
        }
    }

    #[test]
    fn book_is_sorted_by_notional_with_totals() {
        let book = analyze_positions(vec![
            position("ETHUSDT", PositionSide::Long, dec!(1), dec!(3000), None),
            position("BTCUSDT", PositionSide::Short, dec!(0.1), dec!(60000), None),
            position("XRPUSDT", PositionSide::Long, dec!(0), dec!(0.5), None),
        ]);
        assert_eq!(book.positions.len(), 2);
        assert_eq!(book.positions[0].symbol, "BTCUSDT");
        assert_eq!(book.total_notional, dec!(9000));
        assert_eq!(book.total_pnl, dec!(3));
    }

    #[test]
    fn alerts_follow_distance_tiers() {
        let book = analyze_positions(vec![
            position("A", PositionSide::Long, dec!(1), dec!(100), Some(dec!(96))),
            position("B", PositionSide::Short, dec!(1), dec!(100), Some(dec!(108))),
            position("C", PositionSide::Long, dec!(1), dec!(100), Some(dec!(50))),
        ]);
        let alerts = book.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].0.symbol, "A");
        assert_eq!(alerts[0].1, LiquidationAlert::Critical);
        assert_eq!(alerts[1].1, LiquidationAlert::Warning);
    }

    #[test]
    fn margin_risk_tiers() {
        let summary = MarginSummary {
            exchange: ExchangeFamily::Hyperliquid,
            account_value: dec!(1000),
            margin_used: dec!(650),
            withdrawable: dec!(350),
        };
        assert_eq!(margin_usage_pct(&summary), dec!(65));
        assert_eq!(MarginRisk::from_usage_pct(dec!(29.9)), MarginRisk::Safe);
        assert_eq!(MarginRisk::from_usage_pct(dec!(30)), MarginRisk::Moderate);
        assert_eq!(MarginRisk::from_usage_pct(dec!(65)), MarginRisk::High);
        assert_eq!(MarginRisk::from_usage_pct(dec!(80)), MarginRisk::Danger);
    }

    #[tokio::test]
    async fn leverage_update_validates_then_updates_in_place() {
        let executor = Arc::new(ScriptedExecutor::new().reply("leverage binance BTCUSDT 20", "{\"leverage\": 20}"));
        let analyzer = RiskAnalyzer::new(ExecutorSet::new(executor.clone()));
        let account = AccountRef::new("eb65", "binance", "binance").unwrap();
        let mut book = analyze_positions(vec![position("BTCUSDT", PositionSide::Long, dec!(1), dec!(60000), None)]);

        assert_eq!(
            analyzer.apply_leverage_update(&account, &mut book, "BTCUSDT", 0).await,
            Err(EngineError::InvalidLeverage(0))
        );
        assert_eq!(
            analyzer.apply_leverage_update(&account, &mut book, "BTCUSDT", 126).await,
            Err(EngineError::InvalidLeverage(126))
        );
        assert!(matches!(
            analyzer.apply_leverage_update(&account, &mut book, "ETHUSDT", 5).await,
            Err(EngineError::PositionNotFound(_))
        ));
        assert!(executor.calls().is_empty());

        analyzer.apply_leverage_update(&account, &mut book, "btcusdt", 20).await.unwrap();
        assert_eq!(book.positions[0].leverage, Some(20));
        assert_eq!(executor.calls(), vec!["leverage binance BTCUSDT 20".to_string()]);
    }

    #[tokio::test]
    async fn leverage_failure_keeps_old_value() {
        let executor = ScriptedExecutor::new().reply("leverage binance BTCUSDT 50", "Error: leverage not valid");
        let analyzer = RiskAnalyzer::new(ExecutorSet::new(Arc::new(executor)));
        let account = AccountRef::new("eb65", "binance", "binance").unwrap();
        let mut book = analyze_positions(vec![position("BTCUSDT", PositionSide::Long, dec!(1), dec!(60000), None)]);

        let result = analyzer.apply_leverage_update(&account, &mut book, "BTCUSDT", 50).await;
        assert!(matches!(result, Err(EngineError::RemoteExecution(_))));
        assert_eq!(book.positions[0].leverage, Some(10));
    }

    #[tokio::test]
    async fn fetch_positions_uses_family_command() {
        let raw = r#"[{"symbol":"BTCUSDT","positionAmt":"0.5","entryPrice":"60000","markPrice":"61000","unRealizedProfit":"500","liquidationPrice":"40000","leverage":"5"}]"#;
        let executor = ScriptedExecutor::new().reply("portfolio_um_positions binance2", raw);
        let analyzer = RiskAnalyzer::new(ExecutorSet::new(Arc::new(executor)));
        let account = AccountRef::new("eb65", "binance2", "binance2").unwrap();
        let book = analyzer.fetch_positions(&account).await.unwrap();
        assert_eq!(book.total_notional, dec!(30500));
        assert!(book.alerts().is_empty());
    }
}
