use serde::Serialize;

use crate::api::models::{Jumpcut, RawRecord, Stream};
use crate::data::tags::{decode_badges, decode_tag_value, TagMap};

/// ====== 비디오 ======

/// 채팅 캐시가 기준으로 삼는 비디오 정보
#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub id: String,
    /// 편집본 타임라인의 기준 시각 (epoch 초)
    pub timestamp: i64,
    /// `at` 오름차순 정렬
    pub jumpcuts: Vec<Jumpcut>,
}

impl From<Stream> for Video {
    fn from(stream: Stream) -> Self {
        let mut jumpcuts = stream.jumpcuts;
        jumpcuts.sort_by(|a, b| a.at.total_cmp(&b.at));
        Video {
            id: stream.id,
            timestamp: stream.timestamp,
            jumpcuts,
        }
    }
}

/// ====== Chat 구조체 ======

/// 메시지 이벤트 종류 (`type` 필드)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Chat,
    Sub,
    Resub,
    SubGift,
    SubMysteryGift,
    Raid,
    Other(String),
}

impl MessageKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "chat" | "privmsg" | "message" => MessageKind::Chat,
            "sub" | "subscription" => MessageKind::Sub,
            "resub" => MessageKind::Resub,
            "subgift" => MessageKind::SubGift,
            "submysterygift" => MessageKind::SubMysteryGift,
            "raid" => MessageKind::Raid,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

/// 리플레이되는 채팅 메시지 한 건. 수신 후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// 백엔드가 부여한 고유 id (중복 제거 키)
    pub id: String,
    /// 전달 시각 (epoch 밀리초)
    pub timestamp: i64,
    pub display_name: String,
    pub color: Option<String>,
    pub message: String,
    pub kind: MessageKind,
    pub badges: TagMap,
    pub badge_info: TagMap,
    /// 위에서 따로 뽑지 않은 나머지 태그
    pub tags: TagMap,
}

impl ChatMessage {
    /// 원본 레코드를 디코딩합니다. `tags.id`가 없거나 본문이 깨진 경우 `None`.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let payload = record.content.decode().ok()?;
        let mut tags = payload.tags;

        let id = tags.remove("id").as_ref().and_then(decode_tag_value)?;
        if id.is_empty() {
            return None;
        }

        let badges = decode_badges(tags.remove("badges").as_ref());
        let badge_info = decode_badges(tags.remove("badge-info").as_ref());
        let display_name = tags
            .remove("display-name")
            .as_ref()
            .and_then(decode_tag_value)
            .unwrap_or_default();
        let color = tags
            .remove("color")
            .as_ref()
            .and_then(decode_tag_value)
            .filter(|c| !c.is_empty());

        let tags = tags
            .iter()
            .filter_map(|(k, v)| decode_tag_value(v).map(|s| (k.clone(), s)))
            .collect();

        Some(ChatMessage {
            id,
            timestamp: record.ts,
            display_name,
            color,
            message: payload.message,
            kind: MessageKind::parse(&payload.kind),
            badges,
            badge_info,
            tags,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_moderator(&self) -> bool {
        self.badges.get("moderator").map(String::as_str) == Some("1")
    }

    /// 예측(prediction) 배지 설명
    pub fn prediction(&self) -> Option<&str> {
        self.badge_info.get("predictions").map(String::as_str)
    }

    /// 구독/선물/레이드 등 이벤트 메시지의 한 줄 설명
    pub fn action_text(&self) -> Option<String> {
        match &self.kind {
            MessageKind::Resub => Some("resubscribed".to_string()),
            MessageKind::Sub => Some("subscribed".to_string()),
            MessageKind::SubGift => {
                let count = self
                    .tag("msg-param-sender-count")
                    .and_then(|c| c.parse::<u64>().ok())
                    .filter(|c| *c > 0)
                    .unwrap_or(1);
                if count > 1 {
                    Some(format!("gifted {} subs", count))
                } else {
                    Some(format!(
                        "gifted 1 sub to {}",
                        self.tag("msg-param-recipient-display-name").unwrap_or("")
                    ))
                }
            }
            MessageKind::SubMysteryGift => self.tag("system-msg").map(str::to_string),
            MessageKind::Raid => Some(format!(
                "raided with {} viewers",
                self.tag("msg-param-viewerCount").unwrap_or("0")
            )),
            MessageKind::Chat | MessageKind::Other(_) => None,
        }
    }
}
