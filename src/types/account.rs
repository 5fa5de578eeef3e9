//! 账户相关类型定义：余额、持仓、保证金概况

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::exchange::{AccountType, ExchangeFamily};

/// 单个子账户中单个币种的余额（每次查询生成，不做持久化）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Balance {
    pub exchange: ExchangeFamily,
    pub account_type: AccountType,
    pub coin: String,
    /// 始终大于0，零或负数在解析阶段即被丢弃
    pub amount: Decimal,
}

impl Balance {
    /// 构造余额；数量不为正时返回 None
    pub fn new(exchange: ExchangeFamily, account_type: AccountType, coin: &str, amount: Decimal) -> Option<Self> {
        if amount <= Decimal::ZERO {
            return None;
        }
        let coin = coin.trim().to_ascii_uppercase();
        if coin.is_empty() {
            return None;
        }
        Some(Self {
            exchange,
            account_type,
            coin,
            amount,
        })
    }
}

/// 持仓方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    /// 多头
    Long,
    /// 空头
    Short,
}

impl PositionSide {
    /// 根据带符号的持仓数量判断方向
    pub fn from_signed(size: Decimal) -> Self {
        if size.is_sign_negative() {
            PositionSide::Short
        } else {
            PositionSide::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

/// 持仓信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub exchange: ExchangeFamily,
    /// 交易对
    pub symbol: String,
    /// 持仓方向（多头/空头）
    pub side: PositionSide,
    /// 持仓数量（绝对值，非零）
    pub size: Decimal,
    /// 平均开仓价格
    pub entry_price: Decimal,
    /// 标记价格
    pub mark_price: Decimal,
    /// 未实现盈亏
    pub unrealized_pnl: Decimal,
    /// 杠杆倍数
    pub leverage: Option<u32>,
    /// 强平价格
    pub liquidation_price: Option<Decimal>,
}

impl Position {
    /// 名义价值 = 数量 × 标记价格
    pub fn notional(&self) -> Decimal {
        self.size.saturating_mul(self.mark_price)
    }

    /// 距强平价格的百分比，仅在强平价和标记价均为正时有定义
    pub fn distance_to_liquidation_pct(&self) -> Option<Decimal> {
        let liq = self.liquidation_price?;
        if liq <= Decimal::ZERO || self.mark_price <= Decimal::ZERO {
            return None;
        }
        let gap = match self.side {
            PositionSide::Long => self.mark_price - liq,
            PositionSide::Short => liq - self.mark_price,
        };
        gap.checked_div(self.mark_price).map(|r| r.saturating_mul(Decimal::ONE_HUNDRED))
    }
}

/// 合约账户保证金概况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginSummary {
    pub exchange: ExchangeFamily,
    /// 账户价值
    pub account_value: Decimal,
    /// 已用保证金
    pub margin_used: Decimal,
    /// 可提取余额
    pub withdrawable: Decimal,
}
