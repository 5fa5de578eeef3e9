//! 流动性再平衡
//!
//! 交易或提现之前检查目标子账户余额，不足时从指定的来源子账户划入缺口（含缓冲），
//! 返回的 `RebalanceOutcome` 决定主操作能否继续。每次调用独立，不保存任何状态。
//!
//! 顺序：目标余额查询 -> 来源余额查询 -> 划转 -> （部分覆盖时）复查目标余额。

use log::{info, warn};
use rust_decimal::Decimal;

use crate::aggregator::AccountAggregator;
use crate::connectors::RemoteCommand;
use crate::types::{AccountRef, AccountType, RebalanceOutcome, RebalancePlan, Result};

/// 默认缓冲：吸收下单/提现时的价格波动和手续费
pub const DEFAULT_BUFFER: Decimal = Decimal::ONE;

pub struct LiquidityRebalancer<'a> {
    aggregator: &'a AccountAggregator,
}

impl<'a> LiquidityRebalancer<'a> {
    pub fn new(aggregator: &'a AccountAggregator) -> Self {
        Self { aggregator }
    }

    /// 确保 `target` 子账户至少有 `required` 数量的 `coin`
    ///
    /// 远端查询失败直接返回 Err；划转失败返回 `TransferFailed` 结果而不是 Err，
    /// 两者都意味着主操作不能继续。
    pub async fn ensure_liquidity(
        &self,
        account: &AccountRef,
        coin: &str,
        target: AccountType,
        required: Decimal,
        buffer: Decimal,
    ) -> Result<RebalanceOutcome> {
        let coin = coin.to_ascii_uppercase();
        let balance = self.aggregator.sub_account_balance(account, target, &coin).await?;
        if balance >= required {
            return Ok(RebalanceOutcome::Sufficient { balance });
        }

        let deficit = required - balance + buffer;
        let insufficient = |available: Decimal, transferred: Option<RebalancePlan>| RebalanceOutcome::Insufficient {
            coin: coin.clone(),
            available,
            required,
            transferred,
        };

        let Some(source) = account.family.secondary_account(target) else {
            warn!("[{}] {} 余额 {} 不足 {}，且没有可划转的来源子账户", account.display_name, target, balance, required);
            return Ok(insufficient(balance, None));
        };
        let source_balance = self.aggregator.sub_account_balance(account, source, &coin).await?;
        if balance + source_balance < required {
            warn!(
                "[{}] {} 总余额不足: {} {} + {} {} < {}",
                account.display_name, coin, target, balance, source, source_balance, required
            );
            return Ok(insufficient(balance + source_balance, None));
        }

        // 来源不足以覆盖缺口+缓冲时划转全部来源余额
        let partial = source_balance < deficit;
        let plan = RebalancePlan {
            exchange_key: account.exchange_key.clone(),
            coin: coin.clone(),
            from_account_type: source,
            to_account_type: target,
            amount: if partial { source_balance } else { deficit },
        };
        let command = RemoteCommand::Transfer {
            key: plan.exchange_key.clone(),
            from: plan.from_account_type,
            to: plan.to_account_type,
            coin: plan.coin.clone(),
            amount: plan.amount,
        };
        info!(
            "[{}] 划转 {} {}: {} -> {}",
            account.display_name, plan.amount, coin, source, target
        );
        if let Err(e) = self.aggregator.executors().run(account, &command).await {
            warn!("[{}] 划转失败: {}", account.display_name, e);
            return Ok(RebalanceOutcome::TransferFailed {
                plan,
                reason: e.to_string(),
            });
        }

        if !partial {
            return Ok(RebalanceOutcome::Transferred { plan });
        }

        let post_balance = self.aggregator.sub_account_balance(account, target, &coin).await?;
        if post_balance >= required {
            info!("[{}] 部分覆盖后 {} 余额 {}", account.display_name, target, post_balance);
            Ok(RebalanceOutcome::PartialCover { plan, post_balance })
        } else {
            warn!("[{}] 划转后 {} 余额 {} 仍不足 {}", account.display_name, target, post_balance, required);
            Ok(insufficient(post_balance, Some(plan)))
        }
    }
}
