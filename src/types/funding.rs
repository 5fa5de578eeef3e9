//! 资金费相关类型定义

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::exchange::ExchangeFamily;

/// 一条已结算的资金费收入记录（获取后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub exchange: ExchangeFamily,
    /// 币种或交易对
    pub symbol: String,
    /// 结算时间（毫秒）
    pub timestamp_ms: i64,
    /// 实收（正）或实付（负）的资金费
    pub income: Decimal,
    /// 当期资金费率（部分交易所随记录返回）
    pub rate: Option<Decimal>,
}

/// 资金费率历史中的一个点，与实际收入是两条独立的序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRate {
    pub exchange: ExchangeFamily,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub rate: Decimal,
}
