//! Gate 响应解析：现货余额文本，期货持仓数组（`size` 带符号，单位为张）

use super::json::{array_at, decimal_field, leverage_field, parse_payload, str_field};
use super::table::parse_text_balances;
use super::{RawPosition, ResponseNormalizer};
use crate::types::{Balance, ExchangeFamily, Position};

pub struct GateNormalizer;

impl ResponseNormalizer for GateNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        parse_text_balances(ExchangeFamily::Gate, raw)
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["positions"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                RawPosition {
                    symbol: str_field(row, &["contract"])?.to_string(),
                    signed_size: decimal_field(row, &["size"])?,
                    side: None,
                    entry_price: decimal_field(row, &["entry_price"]).unwrap_or_default(),
                    mark_price: decimal_field(row, &["mark_price"]).unwrap_or_default(),
                    unrealized_pnl: decimal_field(row, &["unrealised_pnl"]).unwrap_or_default(),
                    leverage: leverage_field(row, &["leverage", "cross_leverage_limit"]),
                    liquidation_price: decimal_field(row, &["liq_price"]),
                }
                .into_position(ExchangeFamily::Gate)
            })
            .collect()
    }
}
