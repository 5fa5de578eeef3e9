//! JSON 载荷辅助函数
//!
//! 交易所返回的数字有时是字符串、有时是数值，这里统一处理。

use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use super::numeric::parse_amount;

/// 解析远端输出中的 JSON，容忍 JSON 之前的提示行
pub fn parse_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find(|c| c == '{' || c == '[')?;
    match serde_json::from_str::<Value>(&trimmed[start..]) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("JSON解析失败: {}", e);
            None
        }
    }
}

/// 数值或数字字符串 -> Decimal
pub fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_amount(s),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        _ => None,
    }
}

/// 按字段名依次尝试取 Decimal
pub fn decimal_field(obj: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|k| obj.get(*k).and_then(decimal))
}

/// 按字段名依次尝试取 i64（兼容字符串）
pub fn i64_field(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

/// 按字段名依次尝试取字符串
pub fn str_field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
}

/// 杠杆可能是 `"10"`、`10` 或 `{"type": "cross", "value": 10}`
pub fn leverage_field(obj: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|k| {
            let v = obj.get(*k)?;
            decimal(v.get("value").unwrap_or(v))?.trunc().to_u32()
        })
        .filter(|lev| *lev > 0)
}

/// 取数组：值本身是数组，或者在给定路径下的数组
pub fn array_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Some(arr);
    }
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(*key)?;
    }
    cursor.as_array()
}
