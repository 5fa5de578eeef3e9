//! 数值解析
//!
//! 远端输出的数字可能带千分位、货币符号或 K/M/B 后缀，统一解析为 Decimal。

use rust_decimal::Decimal;
use std::str::FromStr;

/// 解析金额文本，支持 `12.5K`、`1,234.5`、`$3.2M`、`1e-5` 等形式
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut cleaned: String = raw
        .trim()
        .trim_start_matches('+')
        .replacen('$', "", 1)
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();

    let multiplier = match cleaned.chars().last()? {
        'K' | 'k' => Some(Decimal::from(1_000u32)),
        'M' | 'm' => Some(Decimal::from(1_000_000u32)),
        'B' | 'b' => Some(Decimal::from(1_000_000_000u32)),
        _ => None,
    };
    if multiplier.is_some() {
        cleaned.pop();
    }
    if cleaned.is_empty() {
        return None;
    }

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;

    // 超出 Decimal 范围的后缀金额视为无法解析
    match multiplier {
        Some(m) => value.checked_mul(m),
        None => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_suffixes_and_separators() {
        assert_eq!(parse_amount("12.5K"), Some(dec!(12500)));
        assert_eq!(parse_amount("1,234.5"), Some(dec!(1234.5)));
        assert_eq!(parse_amount("3M"), Some(dec!(3000000)));
        assert_eq!(parse_amount("0.5b"), Some(dec!(500000000)));
        assert_eq!(parse_amount("$1,000.25"), Some(dec!(1000.25)));
        assert_eq!(parse_amount("-42.1"), Some(dec!(-42.1)));
    }

    #[test]
    fn parses_scientific_notation() {
        assert_eq!(parse_amount("1e-5"), Some(dec!(0.00001)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("K"), None);
        assert_eq!(parse_amount("可用"), None);
        assert_eq!(parse_amount("USDT"), None);
        assert_eq!(parse_amount("--"), None);
    }

    #[test]
    fn suffix_overflow_is_rejected() {
        assert_eq!(parse_amount("79228162514264337593543950335K"), None);
        assert_eq!(parse_amount("79228162514264337593543950335"), Some(Decimal::MAX));
    }
}
