// src/types/errors.rs - 错误类型定义

use rust_decimal::Decimal;
use thiserror::Error;

/// 引擎错误类型
///
/// 解析和报价类错误在边界处被吸收（跳过/置零），
/// 远端执行和业务类错误向上传播并终止调用它的流程。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // 可吸收的错误
    #[error("Data parsing error: {0}")]
    Parse(String),
    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    // 远端相关错误
    #[error("Remote execution failed: {0}")]
    RemoteExecution(String),
    #[error("Timeout error: remote call exceeded {0}s")]
    Timeout(u64),

    // 业务相关错误
    #[error("Insufficient liquidity: {coin} available {available}, required {required}")]
    InsufficientLiquidity {
        coin: String,
        available: Decimal,
        required: Decimal,
    },
    #[error("Transfer failed: {0}, please retry manually")]
    TransferFailed(String),
    #[error("Invalid leverage {0}, expected 1-125")]
    InvalidLeverage(u32),
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    // 配置相关错误
    #[error("Exchange not found: {0}")]
    UnknownExchange(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl EngineError {
    /// 是否必须终止上层流程（交易/提现）
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Parse(_) | EngineError::PriceUnavailable(_))
    }
}

/// 定义Result类型别名
pub type Result<T> = std::result::Result<T, EngineError>;
