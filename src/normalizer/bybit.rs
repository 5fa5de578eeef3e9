//! Bybit 响应解析
//!
//! `balance bybit` 只输出资金账户(FUND)表格，统一账户需要逐币种查询；
//! 持仓为 v5 接口的 `result.list`。

use super::json::{array_at, decimal_field, leverage_field, parse_payload, str_field};
use super::table::parse_text_balances;
use super::{RawPosition, ResponseNormalizer};
use crate::types::{Balance, ExchangeFamily, Position, PositionSide};

pub struct BybitNormalizer;

impl ResponseNormalizer for BybitNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        parse_text_balances(ExchangeFamily::Bybit, raw)
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["result", "list"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let side = match str_field(row, &["side"])? {
                    "Buy" => PositionSide::Long,
                    "Sell" => PositionSide::Short,
                    // 单向持仓模式下无仓位时 side 为 "None"
                    _ => return None,
                };
                RawPosition {
                    symbol: str_field(row, &["symbol"])?.to_string(),
                    signed_size: decimal_field(row, &["size"])?,
                    side: Some(side),
                    entry_price: decimal_field(row, &["avgPrice", "entryPrice"]).unwrap_or_default(),
                    mark_price: decimal_field(row, &["markPrice"]).unwrap_or_default(),
                    unrealized_pnl: decimal_field(row, &["unrealisedPnl"]).unwrap_or_default(),
                    leverage: leverage_field(row, &["leverage"]),
                    liquidation_price: decimal_field(row, &["liqPrice"]),
                }
                .into_position(ExchangeFamily::Bybit)
            })
            .collect()
    }
}
