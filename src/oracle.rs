//! 价格预言机
//!
//! 稳定币固定为 1.0，不发起网络请求；其它币种依次尝试 `COINUSDT`、`COINBUSD`，
//! 都失败时返回 0，表示“没有可靠估值”，调用方据此把该币种从按价值过滤的视图中剔除。

use log::{debug, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connectors::PriceTicker;

pub const STABLECOINS: [&str; 6] = ["USDT", "USDC", "USD1", "BUSD", "TUSD", "FDUSD"];

const QUOTES: [&str; 2] = ["USDT", "BUSD"];

pub fn is_stablecoin(coin: &str) -> bool {
    STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(coin))
}

#[derive(Clone)]
pub struct PriceOracle {
    ticker: Arc<dyn PriceTicker>,
}

impl PriceOracle {
    pub fn new(ticker: Arc<dyn PriceTicker>) -> Self {
        Self { ticker }
    }

    /// 币种的美元参考价；无法估值时为 0
    pub async fn price_usd(&self, coin: &str) -> Decimal {
        let coin = coin.trim().to_ascii_uppercase();
        if is_stablecoin(&coin) {
            return Decimal::ONE;
        }
        for quote in QUOTES {
            let symbol = format!("{coin}{quote}");
            match self.ticker.ticker_price(&symbol).await {
                Ok(Some(price)) if price > Decimal::ZERO => return price,
                Ok(_) => debug!("{} 无报价", symbol),
                Err(e) => warn!("查询 {} 价格失败: {}", symbol, e),
            }
        }
        warn!("{} 无可靠估值，按 0 处理", coin);
        Decimal::ZERO
    }

    /// 单次汇总内使用的价格缓存，同一币种只查询一次
    pub fn session(&self) -> PriceSession<'_> {
        PriceSession {
            oracle: self,
            cache: HashMap::new(),
        }
    }
}

pub struct PriceSession<'a> {
    oracle: &'a PriceOracle,
    cache: HashMap<String, Decimal>,
}

impl PriceSession<'_> {
    pub async fn price_usd(&mut self, coin: &str) -> Decimal {
        let key = coin.trim().to_ascii_uppercase();
        if let Some(price) = self.cache.get(&key) {
            return *price;
        }
        let price = self.oracle.price_usd(&key).await;
        self.cache.insert(key, price);
        price
    }
}
