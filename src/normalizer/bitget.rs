//! Bitget 响应解析：余额为 SPOT / FUND 分段文本，持仓在 `data` 数组中，方向由 `holdSide` 给出

use super::json::{array_at, decimal_field, leverage_field, parse_payload, str_field};
use super::table::parse_text_balances;
use super::{RawPosition, ResponseNormalizer};
use crate::types::{Balance, ExchangeFamily, Position, PositionSide};

pub struct BitgetNormalizer;

impl ResponseNormalizer for BitgetNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        parse_text_balances(ExchangeFamily::Bitget, raw)
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        let Some(payload) = parse_payload(raw) else {
            return Vec::new();
        };
        let Some(rows) = array_at(&payload, &["data"]) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let side = match str_field(row, &["holdSide"])?.to_ascii_lowercase().as_str() {
                    "long" => PositionSide::Long,
                    "short" => PositionSide::Short,
                    _ => return None,
                };
                RawPosition {
                    symbol: str_field(row, &["symbol"])?.to_string(),
                    signed_size: decimal_field(row, &["total"])?,
                    side: Some(side),
                    entry_price: decimal_field(row, &["openPriceAvg", "averageOpenPrice"]).unwrap_or_default(),
                    mark_price: decimal_field(row, &["markPrice"]).unwrap_or_default(),
                    unrealized_pnl: decimal_field(row, &["unrealizedPL"]).unwrap_or_default(),
                    leverage: leverage_field(row, &["leverage"]),
                    liquidation_price: decimal_field(row, &["liquidationPrice"]),
                }
                .into_position(ExchangeFamily::Bitget)
            })
            .collect()
    }
}
