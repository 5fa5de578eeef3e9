//! 远端命令词汇表
//!
//! 所有组件都通过 `RemoteCommand` 构造命令，`Display` 输出远端 `run.sh` 接受的字符串；
//! 直连HTTP的客户端再用 `parse` 把字符串还原为命令后分派。

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::types::{AccountType, EngineError, ExchangeFamily, Result};

/// USDC买入订单类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsdcOrder {
    Market { amount: Decimal },
    Limit { amount: Decimal, price: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    Balance {
        key: String,
    },
    AccountBalance {
        key: String,
        account_type: AccountType,
        coin: String,
    },
    Transfer {
        key: String,
        from: AccountType,
        to: AccountType,
        coin: String,
        amount: Decimal,
    },
    Positions {
        key: String,
        family: ExchangeFamily,
    },
    Leverage {
        key: String,
        symbol: String,
        leverage: u32,
    },
    FundingHistory {
        key: String,
        days: u32,
    },
    FundingRateHistory {
        key: String,
        symbol: String,
        days: u32,
    },
    MarginSummary {
        key: String,
    },
    Withdraw {
        key: String,
        coin: String,
        network: String,
        address: String,
        amount: Decimal,
        memo: Option<String>,
    },
    BuyUsdc {
        key: String,
        order: UsdcOrder,
    },
    /// 活期理财持仓
    EarnPosition {
        key: String,
    },
    EarnSubscribe {
        key: String,
        coin: String,
        amount: Decimal,
    },
    /// 不带数量时全部赎回
    EarnRedeem {
        key: String,
        coin: String,
        amount: Option<Decimal>,
    },
}

impl RemoteCommand {
    /// 是否会改变账户状态（回复需要检查失败标记）
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            RemoteCommand::Transfer { .. }
                | RemoteCommand::Leverage { .. }
                | RemoteCommand::Withdraw { .. }
                | RemoteCommand::BuyUsdc { .. }
                | RemoteCommand::EarnSubscribe { .. }
                | RemoteCommand::EarnRedeem { .. }
        )
    }

    /// 把命令字符串还原为命令
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let bad = || EngineError::Parse(format!("无法识别的命令: {line}"));
        let arg = |i: usize| tokens.get(i).copied().ok_or_else(bad);
        let number = |i: usize| -> Result<Decimal> { Decimal::from_str(arg(i)?).map_err(|_| bad()) };
        let count = |i: usize| -> Result<u32> { arg(i)?.parse().map_err(|_| bad()) };

        let name = arg(0)?;
        let key = arg(1)?.to_string();
        let command = match name {
            "balance" => RemoteCommand::Balance { key },
            "account_balance" => RemoteCommand::AccountBalance {
                key,
                account_type: arg(2)?.parse()?,
                coin: arg(3)?.to_string(),
            },
            "transfer" => RemoteCommand::Transfer {
                key,
                from: arg(2)?.parse()?,
                to: arg(3)?.parse()?,
                coin: arg(4)?.to_string(),
                amount: number(5)?,
            },
            "portfolio_um_positions" | "aster_positions" | "positions" => {
                let family = ExchangeFamily::from_exchange_key(&key)?;
                RemoteCommand::Positions { key, family }
            }
            "leverage" => RemoteCommand::Leverage {
                key,
                symbol: arg(2)?.to_string(),
                leverage: count(3)?,
            },
            "funding_history" => RemoteCommand::FundingHistory { key, days: count(2)? },
            "funding_rate_history" => RemoteCommand::FundingRateHistory {
                key,
                symbol: arg(2)?.to_string(),
                days: count(3)?,
            },
            "margin_summary" => RemoteCommand::MarginSummary { key },
            "withdraw" => RemoteCommand::Withdraw {
                key,
                coin: arg(2)?.to_string(),
                network: arg(3)?.to_string(),
                address: arg(4)?.to_string(),
                amount: number(5)?,
                memo: tokens.get(6).map(|m| m.to_string()),
            },
            "buy_usdc" => {
                let order = match arg(2)? {
                    "market" => UsdcOrder::Market { amount: number(3)? },
                    "limit" => UsdcOrder::Limit {
                        amount: number(3)?,
                        price: number(4)?,
                    },
                    _ => return Err(bad()),
                };
                RemoteCommand::BuyUsdc { key, order }
            }
            "earn" => match arg(2)? {
                "position" => RemoteCommand::EarnPosition { key },
                "subscribe" => RemoteCommand::EarnSubscribe {
                    key,
                    coin: arg(3)?.to_string(),
                    amount: number(4)?,
                },
                "redeem" => RemoteCommand::EarnRedeem {
                    key,
                    coin: arg(3)?.to_string(),
                    amount: if tokens.len() > 4 { Some(number(4)?) } else { None },
                },
                _ => return Err(bad()),
            },
            _ => return Err(bad()),
        };
        Ok(command)
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RemoteCommand::Balance { key } => write!(f, "balance {key}"),
            RemoteCommand::AccountBalance { key, account_type, coin } => {
                write!(f, "account_balance {key} {account_type} {coin}")
            }
            RemoteCommand::Transfer { key, from, to, coin, amount } => {
                write!(f, "transfer {key} {from} {to} {coin} {}", amount.normalize())
            }
            RemoteCommand::Positions { key, family } => write!(f, "{} {key}", family.positions_command()),
            RemoteCommand::Leverage { key, symbol, leverage } => write!(f, "leverage {key} {symbol} {leverage}"),
            RemoteCommand::FundingHistory { key, days } => write!(f, "funding_history {key} {days}"),
            RemoteCommand::FundingRateHistory { key, symbol, days } => {
                write!(f, "funding_rate_history {key} {symbol} {days}")
            }
            RemoteCommand::MarginSummary { key } => write!(f, "margin_summary {key}"),
            RemoteCommand::Withdraw { key, coin, network, address, amount, memo } => {
                write!(f, "withdraw {key} {coin} {network} {address} {}", amount.normalize())?;
                if let Some(memo) = memo {
                    write!(f, " {memo}")?;
                }
                Ok(())
            }
            RemoteCommand::BuyUsdc { key, order } => match order {
                UsdcOrder::Market { amount } => write!(f, "buy_usdc {key} market {}", amount.normalize()),
                UsdcOrder::Limit { amount, price } => {
                    write!(f, "buy_usdc {key} limit {} {}", amount.normalize(), price.normalize())
                }
            },
            RemoteCommand::EarnPosition { key } => write!(f, "earn {key} position"),
            RemoteCommand::EarnSubscribe { key, coin, amount } => {
                write!(f, "earn {key} subscribe {coin} {}", amount.normalize())
            }
            RemoteCommand::EarnRedeem { key, coin, amount } => {
                write!(f, "earn {key} redeem {coin}")?;
                if let Some(amount) = amount {
                    write!(f, " {}", amount.normalize())?;
                }
                Ok(())
            }
        }
    }
}
