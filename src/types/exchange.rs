// src/types/exchange.rs - 交易所家族与子账户类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::errors::EngineError;

/// 交易所家族（exchange base）
///
/// 同一家族下可以有多个不同key的账户，例如 `binance`、`binance3` 都属于 `Binance`。
/// 家族在账户配置解析时确定一次，之后随 `AccountRef` 传递，不再从字符串重新推导。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExchangeFamily {
    Binance,
    Bybit,
    Aster,
    Gate,
    Bitget,
    Hyperliquid,
    Lighter,
}

impl fmt::Display for ExchangeFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExchangeFamily::Binance => write!(f, "BINANCE"),
            ExchangeFamily::Bybit => write!(f, "BYBIT"),
            ExchangeFamily::Aster => write!(f, "ASTER"),
            ExchangeFamily::Gate => write!(f, "GATE"),
            ExchangeFamily::Bitget => write!(f, "BITGET"),
            ExchangeFamily::Hyperliquid => write!(f, "HYPERLIQUID"),
            ExchangeFamily::Lighter => write!(f, "LIGHTER"),
        }
    }
}

impl FromStr for ExchangeFamily {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeFamily::Binance),
            "bybit" => Ok(ExchangeFamily::Bybit),
            "aster" => Ok(ExchangeFamily::Aster),
            "gate" | "gateio" => Ok(ExchangeFamily::Gate),
            "bitget" => Ok(ExchangeFamily::Bitget),
            "hyperliquid" | "hl" => Ok(ExchangeFamily::Hyperliquid),
            "lighter" => Ok(ExchangeFamily::Lighter),
            other => Err(EngineError::UnknownExchange(other.to_string())),
        }
    }
}

impl ExchangeFamily {
    pub const ALL: [ExchangeFamily; 7] = [
        ExchangeFamily::Binance,
        ExchangeFamily::Bybit,
        ExchangeFamily::Aster,
        ExchangeFamily::Gate,
        ExchangeFamily::Bitget,
        ExchangeFamily::Hyperliquid,
        ExchangeFamily::Lighter,
    ];

    /// 从远端使用的账户key解析交易所家族，例如 `binance3` / `bybit_sub` -> 家族
    pub fn from_exchange_key(key: &str) -> Result<Self, EngineError> {
        let lowered = key.trim().to_ascii_lowercase();
        let base = lowered
            .split(|c: char| c == '_' || c == '-')
            .next()
            .unwrap_or("")
            .trim_end_matches(|c: char| c.is_ascii_digit());
        base.parse()
            .map_err(|_| EngineError::UnknownExchange(key.to_string()))
    }

    /// 查询余额时需要覆盖的全部子账户
    pub fn balance_account_types(&self) -> &'static [AccountType] {
        use AccountType::*;
        match self {
            ExchangeFamily::Binance => &[Spot, Fund, Earn, PortfolioMargin],
            ExchangeFamily::Bybit => &[Fund, Unified],
            ExchangeFamily::Aster => &[Spot, Unified],
            ExchangeFamily::Gate => &[Spot],
            ExchangeFamily::Bitget => &[Spot, Fund],
            ExchangeFamily::Hyperliquid => &[Spot, Unified],
            ExchangeFamily::Lighter => &[Unified, Spot],
        }
    }

    /// 无分段标题的文本余额默认归属的子账户
    pub fn default_account_type(&self) -> AccountType {
        match self {
            ExchangeFamily::Bybit => AccountType::Fund,
            ExchangeFamily::Lighter => AccountType::Unified,
            _ => AccountType::Spot,
        }
    }

    /// 合并余额输出中不包含、需要按币种逐个查询的子账户
    pub fn probed_account_types(&self) -> &'static [AccountType] {
        match self {
            ExchangeFamily::Bybit => &[AccountType::Unified],
            _ => &[],
        }
    }

    /// 再平衡时目标子账户对应的资金来源子账户
    pub fn secondary_account(&self, target: AccountType) -> Option<AccountType> {
        use AccountType::*;
        match (self, target) {
            (ExchangeFamily::Bybit, Unified) => Some(Fund),
            (ExchangeFamily::Bybit, Fund) => Some(Unified),
            (ExchangeFamily::Binance, Spot) => Some(Fund),
            (ExchangeFamily::Binance, Fund) => Some(Spot),
            (ExchangeFamily::Binance, PortfolioMargin) => Some(Spot),
            (ExchangeFamily::Binance, Earn) => Some(Spot),
            (ExchangeFamily::Aster, Spot) => Some(Unified),
            (ExchangeFamily::Aster, Unified) => Some(Spot),
            (ExchangeFamily::Bitget, Spot) => Some(Fund),
            (ExchangeFamily::Bitget, Fund) => Some(Spot),
            (ExchangeFamily::Hyperliquid, Spot) => Some(Unified),
            (ExchangeFamily::Hyperliquid, Unified) => Some(Spot),
            _ => None,
        }
    }

    /// 手动划转是否支持该方向；理财只能通过申购/赎回进出
    pub fn can_transfer(&self, from: AccountType, to: AccountType) -> bool {
        if from == to || from == AccountType::Earn || to == AccountType::Earn {
            return false;
        }
        self.secondary_account(to) == Some(from) || self.secondary_account(from) == Some(to)
    }

    /// 是否有活期理财
    pub fn supports_earn(&self) -> bool {
        matches!(self, ExchangeFamily::Binance)
    }

    /// 提现扣款的子账户；不支持提现的交易所返回 None
    pub fn withdraw_account(&self) -> Option<AccountType> {
        match self {
            ExchangeFamily::Binance | ExchangeFamily::Bitget => Some(AccountType::Spot),
            ExchangeFamily::Bybit => Some(AccountType::Fund),
            _ => None,
        }
    }

    /// 持仓查询命令名
    pub fn positions_command(&self) -> &'static str {
        match self {
            ExchangeFamily::Binance => "portfolio_um_positions",
            ExchangeFamily::Aster => "aster_positions",
            _ => "positions",
        }
    }

    /// 是否通过直连HTTP而不是远端命令访问
    pub fn is_direct_http(&self) -> bool {
        matches!(self, ExchangeFamily::Hyperliquid | ExchangeFamily::Lighter)
    }
}

/// 子账户类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Spot,
    Fund,
    Unified,
    PortfolioMargin,
    Earn,
}

impl AccountType {
    /// 远端命令使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Spot => "SPOT",
            AccountType::Fund => "FUND",
            AccountType::Unified => "UNIFIED",
            AccountType::PortfolioMargin => "PORTFOLIO_MARGIN",
            AccountType::Earn => "EARN",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPOT" => Ok(AccountType::Spot),
            "FUND" | "FUNDING" => Ok(AccountType::Fund),
            "UNIFIED" | "PERP" => Ok(AccountType::Unified),
            "PORTFOLIO_MARGIN" | "PM" => Ok(AccountType::PortfolioMargin),
            "EARN" => Ok(AccountType::Earn),
            other => Err(EngineError::Parse(format!("unknown account type: {other}"))),
        }
    }
}

/// 已解析的账户引用：用户 + 账户 + 远端key + 交易所家族
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub user_id: String,
    pub account_id: String,
    /// 远端命令使用的key，例如 `binance3`
    pub exchange_key: String,
    pub family: ExchangeFamily,
    pub display_name: String,
}

impl AccountRef {
    pub fn new(user_id: &str, account_id: &str, exchange_key: &str) -> Result<Self, EngineError> {
        let family = ExchangeFamily::from_exchange_key(exchange_key)?;
        Ok(Self {
            user_id: user_id.to_string(),
            account_id: account_id.to_string(),
            exchange_key: exchange_key.to_string(),
            family,
            display_name: account_id.to_ascii_uppercase(),
        })
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_key_resolves_to_family() {
        assert_eq!(ExchangeFamily::from_exchange_key("binance3").unwrap(), ExchangeFamily::Binance);
        assert_eq!(ExchangeFamily::from_exchange_key("BYBIT").unwrap(), ExchangeFamily::Bybit);
        assert_eq!(ExchangeFamily::from_exchange_key("aster_main").unwrap(), ExchangeFamily::Aster);
        assert_eq!(ExchangeFamily::from_exchange_key("hyperliquid").unwrap(), ExchangeFamily::Hyperliquid);
        assert!(ExchangeFamily::from_exchange_key("kraken2").is_err());
    }

    #[test]
    fn secondary_accounts_pair_up() {
        assert_eq!(ExchangeFamily::Bybit.secondary_account(AccountType::Unified), Some(AccountType::Fund));
        assert_eq!(ExchangeFamily::Binance.secondary_account(AccountType::PortfolioMargin), Some(AccountType::Spot));
        assert_eq!(ExchangeFamily::Lighter.secondary_account(AccountType::Unified), None);
    }

    #[test]
    fn manual_transfer_follows_account_pairs() {
        assert!(ExchangeFamily::Bybit.can_transfer(AccountType::Unified, AccountType::Fund));
        assert!(ExchangeFamily::Binance.can_transfer(AccountType::Spot, AccountType::PortfolioMargin));
        assert!(!ExchangeFamily::Binance.can_transfer(AccountType::Spot, AccountType::Earn));
        assert!(!ExchangeFamily::Bybit.can_transfer(AccountType::Fund, AccountType::Fund));
        assert!(!ExchangeFamily::Gate.can_transfer(AccountType::Spot, AccountType::Fund));
    }

    #[test]
    fn account_type_parses_aliases() {
        assert_eq!("funding".parse::<AccountType>().unwrap(), AccountType::Fund);
        assert_eq!("PORTFOLIO_MARGIN".parse::<AccountType>().unwrap(), AccountType::PortfolioMargin);
        assert!("margin".parse::<AccountType>().is_err());
    }
}
