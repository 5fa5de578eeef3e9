//! Aster 响应解析：余额为 SPOT / UNIFIED(合约) 分段文本，其余沿用 Binance 字段

use super::binance::{parse_funding_rate_history, parse_income, parse_position_risk};
use super::table::parse_text_balances;
use super::ResponseNormalizer;
use crate::types::{Balance, ExchangeFamily, FundingRate, FundingRecord, Position};

pub struct AsterNormalizer;

impl ResponseNormalizer for AsterNormalizer {
    fn parse_balance(&self, raw: &str) -> Vec<Balance> {
        parse_text_balances(ExchangeFamily::Aster, raw)
    }

    fn parse_positions(&self, raw: &str) -> Vec<Position> {
        parse_position_risk(ExchangeFamily::Aster, raw)
    }

    fn parse_funding(&self, raw: &str) -> Vec<FundingRecord> {
        parse_income(ExchangeFamily::Aster, raw)
    }

    fn parse_funding_rates(&self, raw: &str) -> Vec<FundingRate> {
        parse_funding_rate_history(ExchangeFamily::Aster, raw)
    }
}
