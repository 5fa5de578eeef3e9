//! 测试用的协作方替身

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::connectors::{PriceTicker, RemoteCommand, RemoteExecutor};
use crate::types::{AccountType, EngineError, Result};

/// 按命令字符串返回预设输出，并记录收到的全部命令
#[derive(Default)]
pub struct ScriptedExecutor {
    replies: HashMap<String, Result<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: &str, output: &str) -> Self {
        self.replies.insert(command.to_string(), Ok(output.to_string()));
        self
    }

    pub fn fail(mut self, command: &str, error: EngineError) -> Self {
        self.replies.insert(command.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        // 未预设的命令模拟远端脚本的用法提示
        self.replies
            .get(command)
            .cloned()
            .unwrap_or_else(|| Ok(format!("未知命令: {command}")))
    }
}

/// 内存中的子账户账本：回答余额查询并真实执行划转
pub struct LedgerExecutor {
    balances: Mutex<BTreeMap<(AccountType, String), Decimal>>,
    calls: Mutex<Vec<String>>,
    reject_transfers: bool,
}

impl LedgerExecutor {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            reject_transfers: false,
        }
    }

    pub fn with_balance(self, account_type: AccountType, coin: &str, amount: Decimal) -> Self {
        if let Ok(mut balances) = self.balances.lock() {
            balances.insert((account_type, coin.to_string()), amount);
        }
        self
    }

    /// 划转一律返回失败
    pub fn rejecting_transfers(mut self) -> Self {
        self.reject_transfers = true;
        self
    }

    pub fn balance(&self, account_type: AccountType, coin: &str) -> Decimal {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(&(account_type, coin.to_string())).copied())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn transfers(&self) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with("transfer ")).collect()
    }

    fn apply(&self, command: RemoteCommand) -> String {
        let Ok(mut balances) = self.balances.lock() else {
            return "error: ledger poisoned".to_string();
        };
        match command {
            RemoteCommand::AccountBalance { account_type, coin, .. } => balances
                .get(&(account_type, coin))
                .copied()
                .unwrap_or_default()
                .to_string(),
            RemoteCommand::Balance { .. } => {
                let mut out = String::new();
                let types: HashSet<AccountType> = balances.keys().map(|(t, _)| *t).collect();
                let mut types: Vec<AccountType> = types.into_iter().collect();
                types.sort();
                for account_type in types {
                    out.push_str(&format!("📦 余额 ({account_type}):\n"));
                    for ((t, coin), amount) in balances.iter() {
                        if *t == account_type {
                            out.push_str(&format!("{coin}\t\t{amount}\n"));
                        }
                    }
                }
                out
            }
            RemoteCommand::Transfer { from, to, coin, amount, .. } => {
                if self.reject_transfers {
                    return "划转失败: 系统繁忙".to_string();
                }
                match shift(&mut balances, from, to, coin, amount) {
                    Ok(()) => "{\"tranId\": 1}".to_string(),
                    Err(e) => format!("划转失败: {e}"),
                }
            }
            RemoteCommand::EarnPosition { .. } => {
                let mut out = String::from("📈 活期理财持仓 (EARN):\n");
                for ((t, coin), amount) in balances.iter() {
                    if *t == AccountType::Earn {
                        out.push_str(&format!("{coin}\t\t{amount}\n"));
                    }
                }
                out
            }
            RemoteCommand::EarnSubscribe { coin, amount, .. } => {
                match shift(&mut balances, AccountType::Spot, AccountType::Earn, coin, amount) {
                    Ok(()) => "{\"purchaseId\": 1, \"success\": true}".to_string(),
                    Err(e) => format!("申购失败: {e}"),
                }
            }
            RemoteCommand::EarnRedeem { coin, amount, .. } => {
                let held = balances.get(&(AccountType::Earn, coin.clone())).copied().unwrap_or_default();
                match shift(&mut balances, AccountType::Earn, AccountType::Spot, coin, amount.unwrap_or(held)) {
                    Ok(()) => "{\"redeemId\": 1, \"success\": true}".to_string(),
                    Err(e) => format!("赎回失败: {e}"),
                }
            }
            RemoteCommand::Withdraw { .. } => "{\"id\": \"w-1\"}".to_string(),
            RemoteCommand::BuyUsdc { .. } => "{\"orderId\": 1, \"status\": \"FILLED\"}".to_string(),
            RemoteCommand::Leverage { leverage, .. } => format!("{{\"leverage\": {leverage}}}"),
            other => format!("未知命令: {other}"),
        }
    }
}

fn shift(
    balances: &mut BTreeMap<(AccountType, String), Decimal>,
    from: AccountType,
    to: AccountType,
    coin: String,
    amount: Decimal,
) -> std::result::Result<(), String> {
    let source = balances.get(&(from, coin.clone())).copied().unwrap_or_default();
    if source < amount {
        return Err(format!("{from} {coin} 余额不足"));
    }
    balances.insert((from, coin.clone()), source - amount);
    *balances.entry((to, coin)).or_insert(Decimal::ZERO) += amount;
    Ok(())
}

#[async_trait]
impl RemoteExecutor for LedgerExecutor {
    async fn execute(&self, command: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        Ok(self.apply(RemoteCommand::parse(command)?))
    }
}

/// 固定价格表；记录查询次数
#[derive(Default)]
pub struct FixedTicker {
    prices: HashMap<String, Decimal>,
    failing: HashSet<String>,
    hits: AtomicUsize,
}

impl FixedTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    /// 该交易对的查询返回网络错误
    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceTicker for FixedTicker {
    async fn ticker_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(symbol) {
            return Err(EngineError::Timeout(5));
        }
        Ok(self.prices.get(symbol).copied())
    }
}
