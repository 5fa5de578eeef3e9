// Define modules
pub mod types;  // 统一的数据模型与错误
pub mod normalizer;  // 各交易所原始回复 -> 统一模型
pub mod connectors;  // 远端命令执行器与HTTP客户端
pub mod oracle;
pub mod aggregator;
pub mod risk;
pub mod rebalancer;
pub mod funding;
pub mod workflows;
pub mod config;

#[cfg(test)]
pub mod testing;

// Re-export key components for easier usage
pub use types::*;

pub use aggregator::{AccountAggregator, AggregateReport, AccountReport, CoinHolding, DEFAULT_DUST_THRESHOLD_USD};
pub use funding::{DailyReport, FundingAggregator};
pub use oracle::PriceOracle;
pub use rebalancer::{LiquidityRebalancer, DEFAULT_BUFFER};
pub use risk::{PositionBook, RiskAnalyzer};
pub use workflows::{ActionReceipt, WithdrawRequest, Workflows};
