use std::collections::BTreeMap;

use serde_json::Value;

/// ====== 태그 디코딩 ======

/// 태그 키 → 값 매핑
pub type TagMap = BTreeMap<String, String>;

/// IRCv3 태그 값 이스케이프를 해제합니다.
/// `\s` → 공백, `\:` → `;`, `\\` → `\`, `\r`, `\n`.
/// 알 수 없는 이스케이프는 백슬래시만 제거합니다.
pub fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // 끝에 홀로 남은 백슬래시는 버림
            None => {}
        }
    }

    out
}

/// `moderator/1,subscriber/12` 형태의 배지 문자열을 매핑으로 변환합니다.
/// 값이 없는 키(`/` 누락)는 버립니다.
pub fn parse_badge_list(raw: &str) -> TagMap {
    raw.split(',')
        .filter_map(|entry| {
            let (key, value) = entry.split_once('/')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unescape_tag_value(value)))
        })
        .collect()
}

/// 배지 필드를 디코딩합니다. 문자열이면 파싱하고, 이미 객체면 문자열 값만 취합니다.
pub fn decode_badges(value: Option<&Value>) -> TagMap {
    match value {
        Some(Value::String(raw)) => parse_badge_list(raw),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
            .collect(),
        _ => TagMap::new(),
    }
}

/// 단일 태그 값을 문자열로 변환합니다. 문자열 값은 이스케이프를 해제합니다.
pub fn decode_tag_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(unescape_tag_value(s)),
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
