//! Binance 响应解析
//!
//! 余额为分段文本（SPOT / FUND / EARN / PORTFOLIO_MARGIN），
//! 持仓、资金费收入和资金费率为 Binance 风格的 JSON 数组。Aster 复用同一套字段。

use log::debug;

use super::json::{array_at, decimal_field, i64_field, leverage_field, parse_payload, str_field};
use super::table::parse_text_balances;
use super::{RawPosition, ResponseNormalizer};
use crate::types::{Balance, ExchangeFamily, FundingRate, FundingRecord, Position};

const FUNDING_FEE: &str = "FUNDING_FEE";

pub struct BinanceNormalizer;

impl ResponseNormalizer for BinanceNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        parse_text_balances(ExchangeFamily::Binance, raw)
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        parse_position_risk(ExchangeFamily::Binance, raw)
    }

    fn parse_funding(&self, raw: &str) -> Vec<FundingRecord> {
        parse_income(ExchangeFamily::Binance, raw)
    }

    fn parse_funding_rates(&self, raw: &str) -> Vec<FundingRate> {
        parse_funding_rate_history(ExchangeFamily::Binance, raw)
    }
}

/// `positionRisk` 风格的持仓数组（统一账户 UM 与 Aster 相同）
pub(super) fn parse_position_risk(family: ExchangeFamily, raw: &str) -> Vec<Position> {
    let Some(payload) = parse_payload(raw) else {
        debug!("{} 持仓输出不是JSON", family);
        return Vec::new();
    };
    let Some(rows) = array_at(&payload, &["positions"]) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            RawPosition {
                symbol: str_field(row, &["symbol"])?.to_string(),
                signed_size: decimal_field(row, &["positionAmt"])?,
                side: None,
                entry_price: decimal_field(row, &["entryPrice"]).unwrap_or_default(),
                mark_price: decimal_field(row, &["markPrice"]).unwrap_or_default(),
                unrealized_pnl: decimal_field(row, &["unRealizedProfit", "unrealizedProfit"]).unwrap_or_default(),
                leverage: leverage_field(row, &["leverage"]),
                liquidation_price: decimal_field(row, &["liquidationPrice"]),
            }
            .into_position(family)
        })
        .collect()
}

/// `income` 历史，仅保留 FUNDING_FEE
pub(super) fn parse_income(family: ExchangeFamily, raw: &str) -> Vec<FundingRecord> {
    let Some(payload) = parse_payload(raw) else {
        return Vec::new();
    };
    let Some(rows) = array_at(&payload, &["rows"]) else {
        return Vec::new();
    };
    rows.iter()
        .filter(|row| str_field(row, &["incomeType"]).map_or(true, |t| t == FUNDING_FEE))
        .filter_map(|row| {
            Some(FundingRecord {
                exchange: family,
                symbol: str_field(row, &["symbol", "asset"])?.to_string(),
                timestamp_ms: i64_field(row, &["time"])?,
                income: decimal_field(row, &["income"])?,
                rate: None,
            })
        })
        .collect()
}

/// `fundingRate` 历史
pub(super) fn parse_funding_rate_history(family: ExchangeFamily, raw: &str) -> Vec<FundingRate> {
    let Some(payload) = parse_payload(raw) else {
        return Vec::new();
    };
    let Some(rows) = array_at(&payload, &["rows"]) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            Some(FundingRate {
                exchange: family,
                symbol: str_field(row, &["symbol"])?.to_string(),
                timestamp_ms: i64_field(row, &["fundingTime", "time"])?,
                rate: decimal_field(row, &["fundingRate"])?,
            })
        })
        .collect()
}
