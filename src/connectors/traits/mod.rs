// src/connectors/traits/mod.rs - 外部协作方的核心Trait定义

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::Result;

/// 远端命令执行器
///
/// 输入是完整的命令字符串（例如 `balance binance3`），输出是远端打印的原始文本或JSON。
/// 实现方负责超时控制：超时返回 `EngineError::Timeout`，
/// 传输或远端失败返回 `EngineError::RemoteExecution`。
/// 调用方不能假设连接复用语义，每次调用都是一次独立的往返。
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<String>;
}

/// 价格行情接口
#[async_trait]
pub trait PriceTicker: Send + Sync {
    /// 查询交易对最新价格；交易对不存在时返回 `Ok(None)`
    async fn ticker_price(&self, symbol: &str) -> Result<Option<Decimal>>;
}
