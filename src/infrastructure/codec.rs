//! 响应解析工具
//!
//! 京东接口大量使用 JSONP（`jQuery1234567({...})`），解析前需要剥掉回调包装

use crate::error::{Result, SeckillError};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

/// 截取文本中第一个 `{` 到最后一个 `}` 之间的 JSON
///
/// 同时兼容纯 JSON 和 JSONP
pub fn unwrap_jsonp(text: &str) -> Result<&str> {
    let begin = text.find('{');
    let end = text.rfind('}');
    match (begin, end) {
        (Some(b), Some(e)) if b < e => Ok(&text[b..=e]),
        _ => Err(SeckillError::Decode(format!(
            "响应中没有 JSON 对象: {}",
            truncate_text(text, 64)
        ))),
    }
}

/// 解析 JSON / JSONP 响应
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let body = unwrap_jsonp(text)?;
    Ok(serde_json::from_str(body)?)
}

/// 提取 HTML 页面标题
pub fn extract_title(html: &str) -> Option<String> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let re = TITLE.get_or_init(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid")
    });
    re.captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// 京东返回的链接通常省略协议（`//divide.jd.com/...`）
pub fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

/// 依次用参数替换模板中的 `{}`
pub fn fill_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut args = args.iter();
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
