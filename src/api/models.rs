use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

/// ====== HTTP 응답 구조체들 ======

/// 편집으로 잘려나간 구간 (초 단위)
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Jumpcut {
    /// 편집본 타임라인 기준 컷 위치 (초)
    pub at: f64,
    /// 잘려나간 길이 (초)
    pub duration: f64,
}

/// `/streams` 목록의 한 항목
#[derive(Debug, Deserialize, Clone)]
pub struct Stream {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 방송 시작 시각 (epoch 초)
    pub timestamp: i64,
    /// 편집본 길이 (초)
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub jumpcuts: Vec<Jumpcut>,
    #[serde(default)]
    pub has_chat: bool,
}

/// 숫자/문자열 어느 쪽으로 와도 문자열 id로 받습니다.
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected stream id: {}",
            other
        ))),
    }
}

/// ====== 채팅 응답 포맷 ======

/// 백엔드가 돌려주는 원본 채팅 레코드
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RawRecord {
    /// 전달 시각 (epoch 밀리초)
    pub ts: i64,
    pub content: RawContent,
}

/// pull 방식은 객체로, push 방식은 JSON 문자열로 한 번 더 감싸서 보냅니다.
/// 어느 쪽에도 맞지 않는 본문은 `Malformed`로 남겨 메시지 디코딩 단계에서 버립니다.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum RawContent {
    Encoded(String),
    Inline(ChatPayload),
    Malformed(Value),
}

impl RawContent {
    /// 이중 인코딩 여부와 상관없이 페이로드를 꺼냅니다.
    pub fn decode(&self) -> Result<ChatPayload, serde_json::Error> {
        match self {
            RawContent::Encoded(text) => serde_json::from_str(text),
            RawContent::Inline(payload) => Ok(payload.clone()),
            RawContent::Malformed(value) => Err(serde::de::Error::custom(format!(
                "unexpected chat content: {}",
                value
            ))),
        }
    }
}

/// 레코드 본문. 필드가 없거나 `null`이면 빈 값으로 받습니다.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ChatPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 레코드 배열을 하나씩 해석하고, 깨진 레코드만 건너뜁니다.
fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<RawRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| match RawRecord::deserialize(&value) {
            Ok(record) => Some(record),
            Err(e) => {
                trace!("dropping malformed chat record {}: {}", value, e);
                None
            }
        })
        .collect())
}

/// pull 방식 응답: `{ session_token, res: [...] }`
#[derive(Debug, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub res: Vec<RawRecord>,
}

/// ====== WebSocket 메시지 포맷 ======

/// push 방식 요청: `{ id, start, end }`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PushRequest {
    pub id: u64,
    pub start: i64,
    pub end: i64,
}

/// push 방식 응답 배치
#[derive(Debug, Deserialize, Serialize)]
pub struct PushResponse {
    #[serde(default, deserialize_with = "lenient_records")]
    pub res: Vec<RawRecord>,
}
