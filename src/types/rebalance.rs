//! 再平衡相关类型定义

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::errors::{EngineError, Result};
use crate::types::exchange::AccountType;

/// 子账户间划转计划（临时生成，执行后即丢弃）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub exchange_key: String,
    pub coin: String,
    pub from_account_type: AccountType,
    pub to_account_type: AccountType,
    pub amount: Decimal,
}

/// 一次流动性检查的终态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RebalanceOutcome {
    /// 目标子账户余额已足够，无需划转
    Sufficient { balance: Decimal },
    /// 已从来源子账户划转完整缺口
    Transferred { plan: RebalancePlan },
    /// 来源余额不足以覆盖缺口+缓冲，已划转全部来源余额，复查后满足需求
    PartialCover { plan: RebalancePlan, post_balance: Decimal },
    /// 可用总额不足，主操作必须取消
    Insufficient {
        coin: String,
        available: Decimal,
        required: Decimal,
        transferred: Option<RebalancePlan>,
    },
    /// 划转调用本身失败，主操作必须取消
    TransferFailed { plan: RebalancePlan, reason: String },
}

impl RebalanceOutcome {
    /// 主操作能否继续
    pub fn permits_action(&self) -> bool {
        matches!(
            self,
            RebalanceOutcome::Sufficient { .. }
                | RebalanceOutcome::Transferred { .. }
                | RebalanceOutcome::PartialCover { .. }
        )
    }

    /// 实际发出的划转计划
    pub fn plan(&self) -> Option<&RebalancePlan> {
        match self {
            RebalanceOutcome::Sufficient { .. } => None,
            RebalanceOutcome::Transferred { plan }
            | RebalanceOutcome::PartialCover { plan, .. }
            | RebalanceOutcome::TransferFailed { plan, .. } => Some(plan),
            RebalanceOutcome::Insufficient { transferred, .. } => transferred.as_ref(),
        }
    }

    /// 转换为门控结果：不允许继续时返回对应的业务错误
    pub fn gate(&self) -> Result<()> {
        match self {
            RebalanceOutcome::Insufficient { coin, available, required, .. } => {
                Err(EngineError::InsufficientLiquidity {
                    coin: coin.clone(),
                    available: *available,
                    required: *required,
                })
            }
            RebalanceOutcome::TransferFailed { reason, .. } => Err(EngineError::TransferFailed(reason.clone())),
            _ => Ok(()),
        }
    }
}
