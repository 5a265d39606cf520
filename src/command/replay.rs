use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use indicatif::ProgressBar;
use structopt::StructOpt;
use tokio::time;
use tracing::warn;

use chat_replay::data::cache::ChatWindowCache;
use chat_replay::data::models::ChatMessage;
use chat_replay::data::timeline::Timeline;
use chat_replay::data::view::{ChatFrame, ChatView, PlaybackState};
use chat_replay::utils;

use crate::command::{format_message, load_video, open_source, BackendOpt};

/// 채팅 리플레이 옵션
#[derive(StructOpt, Debug)]
pub struct ReplayOpt {
    #[structopt(flatten)]
    pub backend: BackendOpt,

    /// 시작 위치 (HH:MM:SS, MM:SS 또는 초)
    #[structopt(long, default_value = "0")]
    pub from: String,

    /// 재생할 길이 (지정하지 않으면 비디오 끝까지, 길이 정보도 없으면 10분)
    #[structopt(long)]
    pub duration: Option<String>,

    /// 재생 속도 배율
    #[structopt(long, default_value = "1.0")]
    pub speed: f64,

    /// 재생 위치 갱신 주기 (ms)
    #[structopt(long, default_value = "100")]
    pub tick_ms: u64,
}

enum Event {
    Tick,
    Data(Option<()>),
}

/// 직전에 출력한 마지막 메시지
#[derive(Default)]
struct PrintCursor {
    last: Option<(i64, String)>,
}

impl PrintCursor {
    /// 아직 출력하지 않은 메시지들
    fn unseen<'a>(&self, messages: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let Some((last_ts, last_id)) = &self.last else {
            return messages;
        };
        match messages.iter().rposition(|m| &m.id == last_id) {
            Some(idx) => &messages[idx + 1..],
            None => {
                let start = messages.partition_point(|m| m.timestamp <= *last_ts);
                &messages[start..]
            }
        }
    }

    fn advance(&mut self, printed: &[ChatMessage]) {
        if let Some(m) = printed.last() {
            self.last = Some((m.timestamp, m.id.clone()));
        }
    }
}

/// 가상 재생 시계를 돌리면서 채팅 창을 출력합니다.
pub async fn run_replay(opts: &ReplayOpt) -> Result<()> {
    if opts.speed <= 0.0 || !opts.speed.is_finite() {
        return Err(eyre!("재생 속도는 0보다 커야 합니다: {}", opts.speed));
    }
    let start_ms = utils::parse_position(&opts.from)
        .ok_or_else(|| eyre!("잘못된 시작 위치: {}", opts.from))?;

    let client = reqwest::Client::new();
    let (video, video_duration) = load_video(&client, &opts.backend).await?;

    let end_ms = match &opts.duration {
        Some(d) => {
            start_ms + utils::parse_position(d).ok_or_else(|| eyre!("잘못된 재생 길이: {}", d))?
        }
        None => match video_duration {
            Some(secs) => (secs * 1000.0) as i64,
            None => start_ms + 10 * 60 * 1000,
        },
    };
    if end_ms <= start_ms {
        return Err(eyre!("재생 구간이 비어 있습니다"));
    }

    let source = open_source(&client, &opts.backend, &video)?;
    let mut view = ChatView::new(&video, ChatWindowCache::new(source));

    utils::log(format!(
        "채팅 리플레이 시작: video={} {} ~ {} (x{})",
        video.id,
        utils::format_duration(start_ms),
        utils::format_duration(end_ms),
        opts.speed
    ));

    let pb = utils::create_progress_bar((end_ms - start_ms) as u64, "재생 중...");
    let timeline = view.timeline().clone();
    let mut cursor = PrintCursor::default();
    let mut ticker = time::interval(Duration::from_millis(opts.tick_ms.max(10)));
    let step = (opts.tick_ms.max(10) as f64 * opts.speed).round() as i64;
    let mut offset = start_ms;
    let mut source_alive = true;

    while offset < end_ms {
        let event = tokio::select! {
            _ = ticker.tick() => Event::Tick,
            update = view.cache_mut().next_update(), if source_alive => Event::Data(update),
        };

        match event {
            Event::Tick => {
                let state = PlaybackState {
                    offset_ms: offset,
                    playing: true,
                };
                if let Some(frame) = view.on_playback(state) {
                    print_frame(&timeline, frame, &mut cursor, &pb);
                }
                pb.set_position((offset - start_ms) as u64);
                pb.set_message(utils::format_duration(offset));
                offset += step;
            }
            Event::Data(Some(())) => {
                if let Some(frame) = view.on_data_ready() {
                    print_frame(&timeline, frame, &mut cursor, &pb);
                }
            }
            Event::Data(None) => {
                // 채팅은 더 늘지 않지만 재생은 계속
                warn!("chat source ended, chat window will stop growing");
                source_alive = false;
            }
        }
    }

    pb.finish_with_message("재생 완료");
    utils::log(format!(
        "채팅 리플레이 종료: 요청 {}회, 캐시 메시지 {}개",
        view.cache().requests_sent(),
        view.cache().messages().len()
    ));
    view.close();

    Ok(())
}

fn print_frame(
    timeline: &Timeline,
    frame: ChatFrame<'_>,
    cursor: &mut PrintCursor,
    pb: &ProgressBar,
) {
    let fresh = cursor.unseen(frame.messages);
    for message in fresh {
        pb.println(format_message(timeline.playback_offset(message.timestamp), message));
    }
    cursor.advance(fresh);
}
