//! 响应规范化模块
//!
//! 把各交易所远端命令返回的文本或 JSON 转换为统一的 `Balance` / `Position` /
//! `FundingRecord`。解析永不失败：无法解析的行或记录被跳过，整体失败时返回空列表。

pub mod numeric;
pub mod json;
pub mod table;

mod binance;
mod bybit;
mod aster;
mod gate;
mod bitget;
mod hyperliquid;
mod lighter;


use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::types::{AccountType, Balance, ExchangeFamily, FundingRate, FundingRecord, MarginSummary, Position, PositionSide};

pub use binance::BinanceNormalizer;
pub use bybit::BybitNormalizer;
pub use aster::AsterNormalizer;
pub use gate::GateNormalizer;
pub use bitget::BitgetNormalizer;
pub use hyperliquid::HyperliquidNormalizer;
pub use lighter::LighterNormalizer;
pub use numeric::parse_amount;
pub use table::parse_single_amount;

/// 单个交易所家族的响应解析器
pub trait ResponseNormalizer: Send + Sync {
    /// 解析余额输出
    fn parse_balance(&self, raw: &str) -> Vec<Balance>;

    /// 解析可动用余额（可划转、可提现的部分），默认与余额相同
    fn parse_available_balance(&self, raw: &str) -> Vec<Balance> {
        self.parse_balance(raw)
    }

    /// 解析持仓输出，零持仓不出现在结果中
    fn parse_positions(&self, _raw: &str) -> Vec<Position> {
        Vec::new()
    }

    /// 解析已结算资金费记录
    fn parse_funding(&self, _raw: &str) -> Vec<FundingRecord> {
        Vec::new()
    }

    /// 解析资金费率历史
    fn parse_funding_rates(&self, _raw: &str) -> Vec<FundingRate> {
        Vec::new()
    }

    /// 解析合约账户保证金概况
    fn parse_margin_summary(&self, _raw: &str) -> Option<MarginSummary> {
        None
    }
}

static BINANCE: BinanceNormalizer = BinanceNormalizer;
static BYBIT: BybitNormalizer = BybitNormalizer;
static ASTER: AsterNormalizer = AsterNormalizer;
static GATE: GateNormalizer = GateNormalizer;
static BITGET: BitgetNormalizer = BitgetNormalizer;
static HYPERLIQUID: HyperliquidNormalizer = HyperliquidNormalizer;
static LIGHTER: LighterNormalizer = LighterNormalizer;

/// 按交易所家族分派解析器
pub fn normalizer_for(family: ExchangeFamily) -> &'static dyn ResponseNormalizer {
    match family {
        ExchangeFamily::Binance => &BINANCE,
        ExchangeFamily::Bybit => &BYBIT,
        ExchangeFamily::Aster => &ASTER,
        ExchangeFamily::Gate => &GATE,
        ExchangeFamily::Bitget => &BITGET,
        ExchangeFamily::Hyperliquid => &HYPERLIQUID,
        ExchangeFamily::Lighter => &LIGHTER,
    }
}

pub fn parse_balance(family: ExchangeFamily, raw: &str) -> Vec<Balance> {
    merge_balances(normalizer_for(family).parse_balance(raw))
}

/// 可动用余额，用于单币种余额查询和流动性判断
pub fn parse_available_balance(family: ExchangeFamily, raw: &str) -> Vec<Balance> {
    merge_balances(normalizer_for(family).parse_available_balance(raw))
}

/// 理财持仓输出：只保留理财子账户的行，无标题的行视为理财
pub fn parse_earn_positions(family: ExchangeFamily, raw: &str) -> Vec<Balance> {
    let balances = table::parse_text_balances_as(family, raw, AccountType::Earn)
        .into_iter()
        .filter(|b| b.account_type == AccountType::Earn)
        .collect();
    merge_balances(balances)
}

pub fn parse_positions(family: ExchangeFamily, raw: &str) -> Vec<Position> {
    normalizer_for(family).parse_positions(raw)
}

pub fn parse_funding(family: ExchangeFamily, raw: &str) -> Vec<FundingRecord> {
    normalizer_for(family).parse_funding(raw)
}

pub fn parse_funding_rates(family: ExchangeFamily, raw: &str) -> Vec<FundingRate> {
    normalizer_for(family).parse_funding_rates(raw)
}

pub fn parse_margin_summary(family: ExchangeFamily, raw: &str) -> Option<MarginSummary> {
    normalizer_for(family).parse_margin_summary(raw)
}

/// 远端回复是否带失败标记
pub fn is_failure_reply(raw: &str) -> bool {
    raw.to_lowercase().contains("error") || raw.contains("失败")
}

/// 同一 (交易所, 子账户, 币种) 只保留一条，数量相加
pub fn merge_balances(balances: Vec<Balance>) -> Vec<Balance> {
    let mut merged: BTreeMap<(ExchangeFamily, AccountType, String), Decimal> = BTreeMap::new();
    for b in balances {
        let slot = merged.entry((b.exchange, b.account_type, b.coin)).or_insert(Decimal::ZERO);
        *slot = slot.saturating_add(b.amount);
    }
    merged
        .into_iter()
        .filter_map(|((exchange, account_type, coin), amount)| Balance::new(exchange, account_type, &coin, amount))
        .collect()
}

/// 各交易所持仓字段的中间形态
#[derive(Debug, Default)]
pub(crate) struct RawPosition {
    pub symbol: String,
    /// 带符号的数量；明确给出方向时可以是绝对值
    pub signed_size: Decimal,
    pub side: Option<PositionSide>,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: Option<u32>,
    pub liquidation_price: Option<Decimal>,
}

impl RawPosition {
    pub fn into_position(self, exchange: ExchangeFamily) -> Option<Position> {
        if self.signed_size.is_zero() || self.symbol.is_empty() {
            return None;
        }
        let side = self.side.unwrap_or_else(|| PositionSide::from_signed(self.signed_size));
        Some(Position {
            exchange,
            symbol: self.symbol,
            side,
            size: self.signed_size.abs(),
            entry_price: self.entry_price,
            mark_price: self.mark_price,
            unrealized_pnl: self.unrealized_pnl,
            leverage: self.leverage,
            liquidation_price: self.liquidation_price.filter(|p| *p > Decimal::ZERO),
        })
    }
}
