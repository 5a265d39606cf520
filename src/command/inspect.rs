use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use structopt::StructOpt;
use tokio::sync::mpsc;
use tokio::time;

use chat_replay::api::{ChatSource, FetchRange};
use chat_replay::data::models::ChatMessage;
use chat_replay::data::timeline::Timeline;
use chat_replay::utils;

use crate::command::{format_message, load_video, open_source, BackendOpt};

/// 구간 조회 옵션
#[derive(StructOpt, Debug)]
pub struct InspectOpt {
    #[structopt(flatten)]
    pub backend: BackendOpt,

    /// 구간 시작 (재생 위치: HH:MM:SS, MM:SS 또는 초)
    #[structopt(long)]
    pub start: String,

    /// 구간 끝 (재생 위치)
    #[structopt(long)]
    pub end: String,

    /// 응답 대기 시간 (초)
    #[structopt(long, default_value = "10")]
    pub timeout: u64,

    /// 원본 레코드를 JSON으로 출력
    #[structopt(long)]
    pub raw: bool,
}

/// 재생 위치 구간 하나를 실제 시각으로 바꿔 한 번만 요청하고 결과를 출력합니다.
pub async fn run_inspect(opts: &InspectOpt) -> Result<()> {
    let start_ms =
        utils::parse_position(&opts.start).ok_or_else(|| eyre!("잘못된 시작 위치: {}", opts.start))?;
    let end_ms =
        utils::parse_position(&opts.end).ok_or_else(|| eyre!("잘못된 끝 위치: {}", opts.end))?;
    if end_ms < start_ms {
        return Err(eyre!("끝 위치가 시작 위치보다 앞입니다"));
    }

    let client = reqwest::Client::new();
    let (video, _) = load_video(&client, &opts.backend).await?;
    let timeline = Timeline::for_video(&video);

    let range = FetchRange {
        start: timeline.real_timestamp(start_ms),
        end: timeline.real_timestamp(end_ms),
    };
    utils::log(format!(
        "구간 조회: {} ~ {} (실제 시각 {} ~ {})",
        utils::format_duration(start_ms),
        utils::format_duration(end_ms),
        range.start,
        range.end
    ));

    let mut source = open_source(&client, &opts.backend, &video)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    source.attach(tx);
    source.request(range)?;

    let outcome = time::timeout(Duration::from_secs(opts.timeout), rx.recv()).await;
    source.close();

    let batch = match outcome {
        Ok(Some(result)) => result?,
        Ok(None) => return Err(eyre!("채팅 세션이 응답 없이 닫혔습니다")),
        Err(_) => return Err(eyre!("{}초 안에 응답이 없습니다", opts.timeout)),
    };

    if opts.raw {
        println!("{}", serde_json::to_string_pretty(&batch.records)?);
        return Ok(());
    }

    let mut messages: Vec<ChatMessage> = batch
        .records
        .iter()
        .filter_map(ChatMessage::from_record)
        .collect();
    messages.sort_by_key(|m| m.timestamp);

    for message in &messages {
        println!(
            "{}",
            format_message(timeline.playback_offset(message.timestamp), message)
        );
    }
    println!(
        "... (레코드 {}개 중 메시지 {}개)",
        batch.records.len(),
        messages.len()
    );

    Ok(())
}
