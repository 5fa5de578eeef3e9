// src/types/mod.rs - 规范化数据类型

pub mod exchange;
pub mod errors;
pub mod account;
pub mod funding;
pub mod rebalance;

pub use exchange::{AccountRef, AccountType, ExchangeFamily};
pub use errors::{EngineError, Result};
pub use account::{Balance, MarginSummary, Position, PositionSide};
pub use funding::{FundingRate, FundingRecord};
pub use rebalance::{RebalanceOutcome, RebalancePlan};
