//! 资金费收入汇总
//!
//! 所有记录按 Asia/Shanghai 日历日分桶（与交易所自身时区无关），
//! 给出每日、每币种的收入以及日均、年化收入。
//! 费率序列与实际收入是两条独立的数据，只在同一交易对上按日对齐展示。

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::connectors::{ExecutorSet, RemoteCommand};
use crate::normalizer::{parse_funding, parse_funding_rates};
use crate::types::{AccountRef, FundingRate, FundingRecord, Result};

pub const DAYS_PER_YEAR: u32 = 365;

const SHANGHAI_OFFSET_SECS: i32 = 8 * 3600;
const QUOTE_SUFFIXES: [&str; 4] = ["USDT", "USDC", "PERP", "USD"];

/// Asia/Shanghai（UTC+8，无夏令时）
pub fn shanghai() -> FixedOffset {
    FixedOffset::east_opt(SHANGHAI_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// 毫秒时间戳对应的上海日历日
pub fn shanghai_date(timestamp_ms: i64) -> Option<NaiveDate> {
    let utc = Utc.timestamp_millis_opt(timestamp_ms).single()?;
    Some(utc.with_timezone(&shanghai()).date_naive())
}

/// 统计窗口起点：上海时间 `now - (days-1)` 当天零点（毫秒）
pub fn window_start_ms(now: DateTime<Utc>, days: u32) -> i64 {
    let today = now.with_timezone(&shanghai()).date_naive();
    let first_day = today
        .checked_sub_signed(Duration::days(i64::from(days.max(1) - 1)))
        .unwrap_or(NaiveDate::MIN);
    first_day
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| shanghai().from_local_datetime(&midnight).single())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

/// 交易对归一为基础币种：`BTCUSDT` / `BTC-USDT` / `BTC_USDT` -> `BTC`
pub fn base_symbol(symbol: &str) -> String {
    let upper: String = symbol
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    QUOTE_SUFFIXES
        .iter()
        .find_map(|q| upper.strip_suffix(q).filter(|base| !base.is_empty()))
        .map(str::to_string)
        .unwrap_or(upper)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub count: usize,
    pub income: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinSummary {
    pub symbol: String,
    pub count: usize,
    pub total_income: Decimal,
    pub by_day: BTreeMap<NaiveDate, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub days: u32,
    /// 日期升序
    pub by_day: Vec<DayBucket>,
    /// 按总收入降序
    pub by_coin: Vec<CoinSummary>,
    pub grand_total: Decimal,
    pub avg_daily_income: Decimal,
    pub annualized_income: Decimal,
}

/// 单个交易对的费率 + 收入按日对齐
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateDay {
    pub date: NaiveDate,
    pub rate_sum: Option<Decimal>,
    /// 百分比
    pub annualized_rate: Option<Decimal>,
    pub income: Option<Decimal>,
}

/// 按上海日历日汇总资金费收入
pub fn aggregate_funding(records: &[FundingRecord], days: u32) -> DailyReport {
    let mut by_day: BTreeMap<NaiveDate, (usize, Decimal)> = BTreeMap::new();
    let mut by_coin: BTreeMap<String, CoinSummary> = BTreeMap::new();

    for record in records {
        let Some(date) = shanghai_date(record.timestamp_ms) else {
            debug!("跳过时间戳无效的资金费记录: {:?}", record);
            continue;
        };
        let day = by_day.entry(date).or_insert((0, Decimal::ZERO));
        day.0 += 1;
        day.1 = day.1.saturating_add(record.income);

        let coin = by_coin.entry(record.symbol.clone()).or_insert_with(|| CoinSummary {
            symbol: record.symbol.clone(),
            count: 0,
            total_income: Decimal::ZERO,
            by_day: BTreeMap::new(),
        });
        coin.count += 1;
        coin.total_income = coin.total_income.saturating_add(record.income);
        let daily = coin.by_day.entry(date).or_insert(Decimal::ZERO);
        *daily = daily.saturating_add(record.income);
    }

    let grand_total = by_coin.values().fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.total_income));
    let avg_daily_income = if days == 0 {
        Decimal::ZERO
    } else {
        grand_total / Decimal::from(days)
    };

    let mut by_coin: Vec<CoinSummary> = by_coin.into_values().collect();
    by_coin.sort_by(|a, b| b.total_income.cmp(&a.total_income).then_with(|| a.symbol.cmp(&b.symbol)));

    DailyReport {
        days,
        by_day: by_day
            .into_iter()
            .map(|(date, (count, income))| DayBucket { date, count, income })
            .collect(),
        by_coin,
        grand_total,
        avg_daily_income,
        annualized_income: avg_daily_income.saturating_mul(Decimal::from(DAYS_PER_YEAR)),
    }
}

/// 把某交易对的费率序列与收入记录按日对齐；`annualized_rate = 日费率和 × 365 × 100`
pub fn join_rates(records: &[FundingRecord], rates: &[FundingRate], symbol: &str) -> Vec<RateDay> {
    let base = base_symbol(symbol);
    let mut days: BTreeMap<NaiveDate, (Option<Decimal>, Option<Decimal>)> = BTreeMap::new();

    for rate in rates.iter().filter(|r| r.symbol.is_empty() || base_symbol(&r.symbol) == base) {
        let Some(date) = shanghai_date(rate.timestamp_ms) else {
            continue;
        };
        let entry = days.entry(date).or_default();
        let sum = entry.0.get_or_insert(Decimal::ZERO);
        *sum = sum.saturating_add(rate.rate);
    }
    for record in records.iter().filter(|r| base_symbol(&r.symbol) == base) {
        let Some(date) = shanghai_date(record.timestamp_ms) else {
            continue;
        };
        let entry = days.entry(date).or_default();
        let income = entry.1.get_or_insert(Decimal::ZERO);
        *income = income.saturating_add(record.income);
    }

    days.into_iter()
        .map(|(date, (rate_sum, income))| RateDay {
            date,
            rate_sum,
            annualized_rate: rate_sum.map(|r| r.saturating_mul(Decimal::from(DAYS_PER_YEAR * 100))),
            income,
        })
        .collect()
}

fn within_window<T>(items: Vec<T>, start_ms: i64, timestamp: impl Fn(&T) -> i64) -> Vec<T> {
    let before = items.len();
    let kept: Vec<T> = items.into_iter().filter(|item| timestamp(item) >= start_ms).collect();
    if kept.len() < before {
        debug!("丢弃 {} 条窗口外的记录", before - kept.len());
    }
    kept
}

pub struct FundingAggregator {
    executors: ExecutorSet,
}

impl FundingAggregator {
    pub fn new(executors: ExecutorSet) -> Self {
        Self { executors }
    }

    /// 拉取最近 `days` 个上海日历日的资金费收入
    pub async fn fetch_records(&self, account: &AccountRef, days: u32) -> Result<Vec<FundingRecord>> {
        let command = RemoteCommand::FundingHistory {
            key: account.exchange_key.clone(),
            days,
        };
        let reply = self.executors.run(account, &command).await?;
        let records = parse_funding(account.family, &reply);
        if records.is_empty() && !reply.trim().is_empty() {
            warn!("[{}] 资金费记录为空或无法解析", account.display_name);
        }
        Ok(within_window(records, window_start_ms(Utc::now(), days), |r| r.timestamp_ms))
    }

    pub async fn fetch_rates(&self, account: &AccountRef, symbol: &str, days: u32) -> Result<Vec<FundingRate>> {
        let command = RemoteCommand::FundingRateHistory {
            key: account.exchange_key.clone(),
            symbol: symbol.to_string(),
            days,
        };
        let reply = self.executors.run(account, &command).await?;
        let rates = parse_funding_rates(account.family, &reply);
        Ok(within_window(rates, window_start_ms(Utc::now(), days), |r| r.timestamp_ms))
    }

    /// 多个账户的收入记录汇总为一份日报；单个账户失败时跳过并记录
    pub async fn daily_report(&self, accounts: &[AccountRef], days: u32) -> (DailyReport, Vec<(AccountRef, String)>) {
        let mut records = Vec::new();
        let mut failures = Vec::new();
        for account in accounts {
            match self.fetch_records(account, days).await {
                Ok(mut fetched) => records.append(&mut fetched),
                Err(e) => {
                    warn!("[{}] 资金费查询失败: {}", account.display_name, e);
                    failures.push((account.clone(), e.to_string()));
                }
            }
        }
        (aggregate_funding(&records, days), failures)
    }
}
