pub mod inspect;
pub mod replay;

use std::env;
use std::str::FromStr;

use color_eyre::eyre::{eyre, Context, Result};
use structopt::StructOpt;

use chat_replay::api::{self, ChatSource, PullSession, PushSession};
use chat_replay::data::models::{ChatMessage, Video};
use chat_replay::utils;

/// 채팅 백엔드 전송 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Pull,
    Push,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pull" | "http" => Ok(Transport::Pull),
            "push" | "ws" | "websocket" => Ok(Transport::Push),
            other => Err(format!("unknown transport: {} (pull|push)", other)),
        }
    }
}

/// 백엔드 연결 옵션 (모든 서브커맨드 공통)
#[derive(StructOpt, Debug, Clone)]
pub struct BackendOpt {
    /// API 베이스 URL (기본값: $CHAT_REPLAY_API 또는 http://localhost:6070)
    #[structopt(long)]
    pub api: Option<String>,

    /// push 방식 WebSocket 베이스 URL (기본값: $CHAT_REPLAY_WS 또는 api의 ws:// 버전)
    #[structopt(long)]
    pub ws: Option<String>,

    /// 비디오 id
    #[structopt(long)]
    pub video: String,

    /// 전송 방식: pull | push
    #[structopt(long, default_value = "pull")]
    pub transport: Transport,
}

impl BackendOpt {
    pub fn api_base(&self) -> String {
        self.api
            .clone()
            .or_else(|| env::var("CHAT_REPLAY_API").ok())
            .unwrap_or_else(|| "http://localhost:6070".to_string())
    }

    pub fn ws_base(&self) -> String {
        self.ws
            .clone()
            .or_else(|| env::var("CHAT_REPLAY_WS").ok())
            .unwrap_or_else(|| {
                let api = self.api_base();
                if let Some(rest) = api.strip_prefix("https://") {
                    format!("wss://{}", rest)
                } else if let Some(rest) = api.strip_prefix("http://") {
                    format!("ws://{}", rest)
                } else {
                    api
                }
            })
    }
}

/// 비디오 정보를 가져오고 채팅이 있는지 확인합니다.
pub async fn load_video(client: &reqwest::Client, opts: &BackendOpt) -> Result<(Video, Option<f64>)> {
    let api = opts.api_base();
    utils::log(format!("비디오 정보 로드 중: {} ({})", opts.video, api));

    let stream = api::fetch_video(client, &api, &opts.video)
        .await
        .with_context(|| format!("Failed to fetch stream list from {}", api))?
        .ok_or_else(|| eyre!("비디오를 찾을 수 없습니다: {}", opts.video))?;

    if !stream.has_chat {
        return Err(eyre!("채팅 기록이 없는 비디오입니다: {}", opts.video));
    }

    let duration = stream.duration;
    Ok((Video::from(stream), duration))
}

/// 선택한 전송 방식의 채팅 소스를 만듭니다.
pub fn open_source(
    client: &reqwest::Client,
    opts: &BackendOpt,
    video: &Video,
) -> Result<Box<dyn ChatSource + Send>> {
    let source: Box<dyn ChatSource + Send> = match opts.transport {
        Transport::Pull => {
            let endpoint = api::chat_endpoint(&opts.api_base(), &video.id)
                .context("Invalid API base URL")?;
            Box::new(PullSession::new(client.clone(), endpoint))
        }
        Transport::Push => {
            let endpoint = api::chat_endpoint(&opts.ws_base(), &video.id)
                .context("Invalid WebSocket base URL")?;
            Box::new(PushSession::new(endpoint))
        }
    };
    Ok(source)
}

/// 채팅 한 줄: `[위치] 닉네임: 메시지`
pub fn format_message(position_ms: i64, message: &ChatMessage) -> String {
    let mut line = format!("[{}] ", utils::format_duration(position_ms));
    if message.is_moderator() {
        line.push_str("(mod) ");
    }
    if let Some(prediction) = message.prediction() {
        line.push_str(&format!("({}) ", prediction));
    }
    line.push_str(&message.display_name);

    match message.action_text() {
        Some(action) if message.message.is_empty() => {
            line.push_str(&format!(" {}", action));
        }
        Some(action) => {
            line.push_str(&format!(" {}: {}", action, message.message));
        }
        None => {
            line.push_str(&format!(": {}", message.message));
        }
    }
    line
}
