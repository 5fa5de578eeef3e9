//! 文本表格解析
//!
//! 远端 `balance` 命令输出逐行的 `币种  可用  [冻结]` 表格。
//! 一个输出里可能包含多个子账户分段，每段以带账户标记的标题行开头，
//! 例如 `📦 资金账户余额 (FUND):`，遇到下一个标题即结束。

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use super::numeric::parse_amount;
use crate::types::{AccountType, Balance, ExchangeFamily};

static SECTION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\(\[（【]\s*(SPOT|FUNDING|FUND|UNIFIED|PORTFOLIO_MARGIN|EARN)\s*[\)\]）】]")
        .expect("section token regex")
});

// 顺序敏感："统一保证金" 要先于 "统一账户" 之外的其它标签匹配
const SECTION_LABELS: [(&str, AccountType); 5] = [
    ("统一保证金", AccountType::PortfolioMargin),
    ("现货账户", AccountType::Spot),
    ("资金账户", AccountType::Fund),
    ("统一账户", AccountType::Unified),
    ("理财", AccountType::Earn),
];

const NOISE_MARKERS: [&str; 5] = ["---", "===", "币种", "正在查询", "暂无"];

const USAGE_MARKERS: [&str; 4] = ["用法", "未知", "usage", "unknown"];

/// 一个子账户分段
#[derive(Debug, Clone, PartialEq)]
pub struct Section<'a> {
    /// 分段标题之前的行没有账户标记，为 None
    pub account_type: Option<AccountType>,
    pub lines: Vec<&'a str>,
}

/// 解析一行余额数据：`COIN AMOUNT ...`
pub fn parse_row(line: &str) -> Option<(String, Decimal)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || NOISE_MARKERS.iter().any(|m| trimmed.contains(m)) {
        return None;
    }
    let mut tokens = trimmed.split_whitespace();
    let coin = tokens.next()?.trim_end_matches(':');
    let amount = tokens.next()?;

    let valid_coin = !coin.is_empty()
        && coin.len() <= 20
        && coin.chars().all(|c| c.is_ascii_alphanumeric())
        && coin.chars().any(|c| c.is_ascii_alphabetic());
    if !valid_coin {
        return None;
    }
    let amount = parse_amount(amount)?;
    Some((coin.to_ascii_uppercase(), amount))
}

/// 判断一行是否为子账户分段标题
pub fn section_header(line: &str) -> Option<AccountType> {
    if line.contains("正在查询") || parse_row(line).is_some() {
        return None;
    }
    if let Some(caps) = SECTION_TOKEN.captures(&line.to_ascii_uppercase()) {
        return caps.get(1).and_then(|m| m.as_str().parse().ok());
    }
    SECTION_LABELS
        .iter()
        .find(|(label, _)| line.contains(label))
        .map(|(_, ty)| *ty)
}

/// 按标题把输出切分为分段
pub fn split_sections(raw: &str) -> Vec<Section<'_>> {
    let mut sections = vec![Section { account_type: None, lines: Vec::new() }];
    for line in raw.lines() {
        if let Some(ty) = section_header(line) {
            sections.push(Section { account_type: Some(ty), lines: Vec::new() });
            continue;
        }
        if let Some(current) = sections.last_mut() {
            current.lines.push(line);
        }
    }
    sections.retain(|s| s.account_type.is_some() || !s.lines.is_empty());
    sections
}

/// 取出某个子账户分段的全部行（从其标题开始，到下一个标题为止）
pub fn section_lines<'a>(raw: &'a str, account_type: AccountType) -> Vec<&'a str> {
    split_sections(raw)
        .into_iter()
        .filter(|s| s.account_type == Some(account_type))
        .flat_map(|s| s.lines)
        .collect()
}

/// 解析带分段的文本余额；无标题的行归入 `family.default_account_type()`
pub fn parse_text_balances(family: ExchangeFamily, raw: &str) -> Vec<Balance> {
    parse_text_balances_as(family, raw, family.default_account_type())
}

/// 同上，无标题的行归入 `untitled`
pub fn parse_text_balances_as(family: ExchangeFamily, raw: &str, untitled: AccountType) -> Vec<Balance> {
    let mut balances = Vec::new();
    for section in split_sections(raw) {
        let account_type = section.account_type.unwrap_or(untitled);
        for line in section.lines {
            match parse_row(line) {
                Some((coin, amount)) => {
                    if let Some(balance) = Balance::new(family, account_type, &coin, amount) {
                        balances.push(balance);
                    }
                }
                None if !line.trim().is_empty() => debug!("跳过无法解析的行: {}", line.trim()),
                None => {}
            }
        }
    }
    balances
}

/// 解析只有一个数值的回复（`account_balance` 命令）
pub fn parse_single_amount(raw: &str) -> Option<Decimal> {
    let line = raw.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    let lowered = line.to_lowercase();
    if USAGE_MARKERS.iter().any(|m| lowered.starts_with(m)) {
        return None;
    }
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    parse_amount(first).or_else(|| tokens.next().and_then(parse_amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const COMBINED: &str = "正在查询 BINANCE 余额...\n\
        ==================================================\n\
        💰 现货账户余额 (SPOT):\n\
        币种\t\t可用\t\t冻结\n\
        --------------------------------------------------\n\
        USDT\t\t1,250.5\t\t0\n\
        BNB\t\t0.8\t\t0\n\
        📦 资金账户余额 (FUND):\n\
        USDC\t\t300\n\
        📈 理财持仓 (EARN):\n\
        USDT\t\t12.5K\t\t活期\n";

    #[test]
    fn rows_skip_headers_and_noise() {
        assert_eq!(parse_row("USDT\t\t100.5\t\t0"), Some(("USDT".into(), dec!(100.5))));
        assert_eq!(parse_row("1INCH 3"), Some(("1INCH".into(), dec!(3))));
        assert_eq!(parse_row("币种\t\t可用"), None);
        assert_eq!(parse_row("-----"), None);
        assert_eq!(parse_row("账户价值: $1,000"), None);
        assert_eq!(parse_row("BTC"), None);
    }

    #[test]
    fn sections_are_located_by_header() {
        let spot = section_lines(COMBINED, AccountType::Spot);
        assert!(spot.iter().any(|l| l.starts_with("USDT")));
        assert!(!spot.iter().any(|l| l.starts_with("USDC")));

        let fund = section_lines(COMBINED, AccountType::Fund);
        assert_eq!(fund.iter().filter(|l| !l.trim().is_empty()).count(), 1);
        assert!(section_lines(COMBINED, AccountType::Unified).is_empty());
    }

    #[test]
    fn combined_dump_parses_every_section() {
        let balances = parse_text_balances(ExchangeFamily::Binance, COMBINED);
        assert_eq!(balances.len(), 4);
        let earn = balances.iter().find(|b| b.account_type == AccountType::Earn).unwrap();
        assert_eq!(earn.amount, dec!(12500));
        let fund = balances.iter().find(|b| b.account_type == AccountType::Fund).unwrap();
        assert_eq!(fund.coin, "USDC");
    }

    #[test]
    fn unsectioned_rows_use_family_default() {
        let raw = "币种\t\t可用\nUSDT\t\t50\nETH\t\t0\n";
        let balances = parse_text_balances(ExchangeFamily::Bybit, raw);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].account_type, AccountType::Fund);
    }

    #[test]
    fn single_amount_replies() {
        assert_eq!(parse_single_amount("  123.45\n"), Some(dec!(123.45)));
        assert_eq!(parse_single_amount("正在查询...\n88"), Some(dec!(88)));
        assert_eq!(parse_single_amount("用法: account_balance <ex> <type> <coin>"), None);
        assert_eq!(parse_single_amount("未知账户类型"), None);
        assert_eq!(parse_single_amount(""), None);
    }
}
