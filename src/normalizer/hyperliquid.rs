//! Hyperliquid 响应解析
//!
//! 直连 `/info` 接口返回的 JSON：
//! - `{"perp": clearinghouseState, "spot": spotClearinghouseState, "mids": allMids}`
//! - `userFunding` 数组（`delta.usdc` 为收入，`delta.fundingRate` 为当期费率）
//! - `fundingHistory` 数组

use rust_decimal::Decimal;
use serde_json::Value;

use super::json::{array_at, decimal, decimal_field, i64_field, leverage_field, parse_payload, str_field};
use super::{RawPosition, ResponseNormalizer};
use crate::types::{AccountType, Balance, ExchangeFamily, FundingRate, FundingRecord, MarginSummary, Position};

const USDC: &str = "USDC";

pub struct HyperliquidNormalizer;

/// 合约账户状态：组合载荷中的 `perp`，或者直接就是 clearinghouseState
fn perp_state(payload: &Value) -> &Value {
    payload.get("perp").unwrap_or(payload)
}

impl ResponseNormalizer for HyperliquidNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let mut balances = Vec::new();

        // 合约账户按账户价值计入 USDC
        let account_value = perp_state(&payload)
            .get("marginSummary")
            .and_then(|m| decimal_field(m, &["accountValue"]));
        if let Some(value) = account_value {
            balances.extend(Balance::new(ExchangeFamily::Hyperliquid, AccountType::Unified, USDC, value));
        }

        if let Some(rows) = payload.get("spot").and_then(|s| s.get("balances")).and_then(Value::as_array) {
            for row in rows {
                let (Some(coin), Some(total)) = (str_field(row, &["coin"]), decimal_field(row, &["total"])) else {
                    continue;
                };
                balances.extend(Balance::new(ExchangeFamily::Hyperliquid, AccountType::Spot, coin, total));
            }
        }
        balances
    }

    /// 合约账户只有 `withdrawable` 可动用；现货扣除挂单冻结的 `hold`
    fn parse_available_balance(&self, raw: &str) -> Vec<Balance> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let mut balances = Vec::new();
        if let Some(withdrawable) = decimal_field(perp_state(&payload), &["withdrawable"]) {
            balances.extend(Balance::new(ExchangeFamily::Hyperliquid, AccountType::Unified, USDC, withdrawable));
        }
        if let Some(rows) = payload.get("spot").and_then(|s| s.get("balances")).and_then(Value::as_array) {
            for row in rows {
                let (Some(coin), Some(total)) = (str_field(row, &["coin"]), decimal_field(row, &["total"])) else {
                    continue;
                };
                let hold = decimal_field(row, &["hold"]).unwrap_or(Decimal::ZERO);
                let Some(free) = total.checked_sub(hold) else {
                    continue;
                };
                balances.extend(Balance::new(ExchangeFamily::Hyperliquid, AccountType::Spot, coin, free));
            }
        }
        balances
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let mids = payload.get("mids");
        let Some(rows) = array_at(perp_state(&payload), &["assetPositions"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let pos = row.get("position").unwrap_or(row);
                let coin = str_field(pos, &["coin"])?;
                let szi = decimal_field(pos, &["szi"])?;
                // 优先使用中间价，缺失时用 持仓价值/数量 推算
                let mark_price = mids
                    .and_then(|m| m.get(coin))
                    .and_then(decimal)
                    .or_else(|| {
                        let value = decimal_field(pos, &["positionValue"])?;
                        value.abs().checked_div(szi.abs())
                    })
                    .unwrap_or_default();
                RawPosition {
                    symbol: coin.to_string(),
                    signed_size: szi,
                    side: None,
                    entry_price: decimal_field(pos, &["entryPx"]).unwrap_or_default(),
                    mark_price,
                    unrealized_pnl: decimal_field(pos, &["unrealizedPnl"]).unwrap_or_default(),
                    leverage: leverage_field(pos, &["leverage"]),
                    liquidation_price: decimal_field(pos, &["liquidationPx"]),
                }
                .into_position(ExchangeFamily::Hyperliquid)
            })
            .collect()
    }

    fn parse_funding(&self, raw: &str) -> Vec<FundingRecord> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["fundings"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let delta = row.get("delta")?;
                if str_field(delta, &["type"]).is_some_and(|t| t != "funding") {
                    return None;
                }
                Some(FundingRecord {
                    exchange: ExchangeFamily::Hyperliquid,
                    symbol: str_field(delta, &["coin"])?.to_string(),
                    timestamp_ms: i64_field(row, &["time"])?,
                    income: decimal_field(delta, &["usdc"])?,
                    rate: decimal_field(delta, &["fundingRate"]),
                })
            })
            .collect()
    }

    fn parse_funding_rates(&self, raw: &str) -> Vec<FundingRate> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["history"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                Some(FundingRate {
                    exchange: ExchangeFamily::Hyperliquid,
                    symbol: str_field(row, &["coin"])?.to_string(),
                    timestamp_ms: i64_field(row, &["time"])?,
                    rate: decimal_field(row, &["fundingRate"])?,
                })
            })
            .collect()
    }

    fn parse_margin_summary(&self, raw: &str) -> Option<MarginSummary> {
        let payload = parse_payload(raw)?;
        let perp = perp_state(&payload);
        let summary = perp.get("marginSummary")?;
        Some(MarginSummary {
            exchange: ExchangeFamily::Hyperliquid,
            account_value: decimal_field(summary, &["accountValue"])?,
            margin_used: decimal_field(summary, &["totalMarginUsed"]).unwrap_or(Decimal::ZERO),
            withdrawable: decimal_field(perp, &["withdrawable"]).unwrap_or(Decimal::ZERO),
        })
    }
}
