//! Lighter 响应解析
//!
//! 账户接口返回 `accounts` 数组，只取主账户（`account_type == 0`，缺失时取第一个）；
//! 资金费记录的 `timestamp` 单位是秒。

use rust_decimal::Decimal;
use serde_json::Value;

use super::json::{array_at, decimal, decimal_field, i64_field, leverage_field, parse_payload, str_field};
use super::{RawPosition, ResponseNormalizer};
use crate::types::{AccountType, Balance, ExchangeFamily, FundingRate, FundingRecord, MarginSummary, Position, PositionSide};

const USDC: &str = "USDC";

pub struct LighterNormalizer;

fn main_account(payload: &Value) -> Option<&Value> {
    let accounts = array_at(payload, &["accounts"])?;
    accounts
        .iter()
        .find(|acc| i64_field(acc, &["account_type"]) == Some(0))
        .or_else(|| accounts.first())
}

/// 秒级时间戳转换为毫秒；已经是毫秒的保持不变，负数或溢出返回 None
fn to_millis(ts: i64) -> Option<i64> {
    match ts {
        t if t < 0 => None,
        t if t < 100_000_000_000 => t.checked_mul(1000),
        t => Some(t),
    }
}

fn record_symbol(row: &Value) -> Option<String> {
    str_field(row, &["symbol"])
        .map(str::to_string)
        .or_else(|| i64_field(row, &["market_id"]).map(|id| format!("MARKET-{id}")))
}

impl ResponseNormalizer for LighterNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(account) = main_account(&payload) else {
            return Vec::new();
        };
        let mut balances = Vec::new();
        if let Some(collateral) = decimal_field(account, &["collateral"]) {
            balances.extend(Balance::new(ExchangeFamily::Lighter, AccountType::Unified, USDC, collateral));
        }
        if let Some(assets) = account.get("assets").and_then(Value::as_array) {
            for asset in assets {
                let (Some(symbol), Some(amount)) = (str_field(asset, &["symbol"]), decimal_field(asset, &["balance"])) else {
                    continue;
                };
                balances.extend(Balance::new(ExchangeFamily::Lighter, AccountType::Spot, symbol, amount));
            }
        }
        balances
    }

    fn parse_available_balance(&self, raw: &str) -> Vec<Balance> {
        let Some(account) = parse_payload(raw).and_then(|p| main_account(&p).cloned()) else {
            return Vec::new();
        };
        let mut balances = Vec::new();
        if let Some(available) = decimal_field(&account, &["available_balance"]) {
            balances.extend(Balance::new(ExchangeFamily::Lighter, AccountType::Unified, USDC, available));
        }
        // 现货资产扣除挂单锁定
        if let Some(assets) = account.get("assets").and_then(Value::as_array) {
            for asset in assets {
                let (Some(symbol), Some(amount)) = (str_field(asset, &["symbol"]), decimal_field(asset, &["balance"])) else {
                    continue;
                };
                let locked = decimal_field(asset, &["locked_balance"]).unwrap_or(Decimal::ZERO);
                if let Some(free) = amount.checked_sub(locked) {
                    balances.extend(Balance::new(ExchangeFamily::Lighter, AccountType::Spot, symbol, free));
                }
            }
        }
        balances
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let prices = payload.get("prices");
        let Some(rows) = main_account(&payload).and_then(|acc| acc.get("positions")).and_then(Value::as_array) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let symbol = str_field(row, &["symbol"])?;
                let size = decimal_field(row, &["position"])?.abs();
                let side = match i64_field(row, &["sign"]).unwrap_or(1) {
                    s if s > 0 => PositionSide::Long,
                    _ => PositionSide::Short,
                };
                let mark_price = prices
                    .and_then(|p| p.get(symbol))
                    .and_then(decimal)
                    .filter(|p| *p > Decimal::ZERO)
                    .or_else(|| {
                        let value = decimal_field(row, &["position_value"])?;
                        value.abs().checked_div(size)
                    })
                    .unwrap_or_default();
                RawPosition {
                    symbol: symbol.to_string(),
                    signed_size: size,
                    side: Some(side),
                    entry_price: decimal_field(row, &["avg_entry_price"]).unwrap_or_default(),
                    mark_price,
                    unrealized_pnl: decimal_field(row, &["unrealized_pnl"]).unwrap_or_default(),
                    leverage: leverage_field(row, &["leverage"]),
                    liquidation_price: decimal_field(row, &["liquidation_price"]),
                }
                .into_position(ExchangeFamily::Lighter)
            })
            .collect()
    }

    fn parse_funding(&self, raw: &str) -> Vec<FundingRecord> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["position_fundings"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                Some(FundingRecord {
                    exchange: ExchangeFamily::Lighter,
                    symbol: record_symbol(row)?,
                    timestamp_ms: to_millis(i64_field(row, &["timestamp"])?)?,
                    income: decimal_field(row, &["change", "amount"])?,
                    rate: decimal_field(row, &["rate", "funding_rate"]),
                })
            })
            .collect()
    }

    fn parse_funding_rates(&self, raw: &str) -> Vec<FundingRate> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["fundings"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                Some(FundingRate {
                    exchange: ExchangeFamily::Lighter,
                    symbol: record_symbol(row).unwrap_or_default(),
                    timestamp_ms: to_millis(i64_field(row, &["timestamp"])?)?,
                    rate: decimal_field(row, &["rate", "funding_rate"])?,
                })
            })
            .collect()
    }

    fn parse_margin_summary(&self, raw: &str) -> Option<MarginSummary> {
        let payload = parse_payload(raw)?;
        let account = main_account(&payload)?;
        let collateral = decimal_field(account, &["collateral"]).unwrap_or(Decimal::ZERO);
        let available = decimal_field(account, &["available_balance"]).unwrap_or(Decimal::ZERO);
        Some(MarginSummary {
            exchange: ExchangeFamily::Lighter,
            account_value: decimal_field(account, &["total_asset_value"]).unwrap_or(collateral),
            margin_used: collateral.checked_sub(available).unwrap_or_default().max(Decimal::ZERO),
            withdrawable: available,
        })
    }
}
