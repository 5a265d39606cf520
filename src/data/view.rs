use crate::api::session::ChatSource;
use crate::data::cache::ChatWindowCache;
use crate::data::models::{ChatMessage, Video};
use crate::data::timeline::Timeline;

/// 이 이상 위치가 튀면 캐시를 비우고 새로 가져옴 (ms)
pub const CLEAR_THRESHOLD_MS: i64 = 3000;
/// 화면에 그리는 최대 메시지 수
pub const RENDER_LIMIT: usize = 300;
/// 이 이하로 움직이면 다시 그리지 않음 (ms)
pub const RENDER_DEBOUNCE_MS: i64 = 150;

/// 플레이어가 알려주는 재생 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    /// 편집본 기준 재생 위치 (ms)
    pub offset_ms: i64,
    pub playing: bool,
}

/// 재생 틱마다 다시 그릴지 결정하는 디바운스.
/// 재생/일시정지 상태가 바뀌었거나 위치가 150ms 넘게 움직였을 때만 통과합니다.
#[derive(Debug, Clone, Default)]
pub struct RenderGate {
    last: Option<PlaybackState>,
}

impl RenderGate {
    pub fn should_render(&self, next: PlaybackState) -> bool {
        match self.last {
            None => true,
            Some(last) => {
                last.playing != next.playing
                    || (next.offset_ms - last.offset_ms).abs() > RENDER_DEBOUNCE_MS
            }
        }
    }

    pub fn mark_rendered(&mut self, state: PlaybackState) {
        self.last = Some(state);
    }
}

/// 한 번 그린 결과
#[derive(Debug, Clone, Copy)]
pub struct ChatFrame<'a> {
    /// 현재 위치의 실제 채팅 시각
    pub real_timestamp: i64,
    /// 현재 위치까지의 최근 메시지 (최대 300개)
    pub messages: &'a [ChatMessage],
}

/// 재생 이벤트를 받아 캐시를 채우고, 표시할 채팅 창을 계산합니다.
pub struct ChatView<S: ChatSource> {
    cache: ChatWindowCache<S>,
    timeline: Timeline,
    gate: RenderGate,
    previous_offset: Option<i64>,
    current: Option<PlaybackState>,
}

impl<S: ChatSource> ChatView<S> {
    pub fn new(video: &Video, cache: ChatWindowCache<S>) -> Self {
        ChatView {
            cache,
            timeline: Timeline::for_video(video),
            gate: RenderGate::default(),
            previous_offset: None,
            current: None,
        }
    }

    pub fn cache(&self) -> &ChatWindowCache<S> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ChatWindowCache<S> {
        &mut self.cache
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// 재생 위치/상태 변경. 다시 그릴 필요가 없으면 `None`.
    pub fn on_playback(&mut self, state: PlaybackState) -> Option<ChatFrame<'_>> {
        self.current = Some(state);
        if !self.gate.should_render(state) {
            return None;
        }
        self.gate.mark_rendered(state);

        let jumped = match self.previous_offset {
            Some(previous) => (state.offset_ms - previous).abs() >= CLEAR_THRESHOLD_MS,
            None => true,
        };
        if jumped {
            self.cache.clear();
        }
        self.previous_offset = Some(state.offset_ms);

        let real_timestamp = self.timeline.real_timestamp(state.offset_ms);
        if state.playing || jumped {
            self.cache.ensure_data(real_timestamp);
        }

        Some(self.frame(real_timestamp))
    }

    /// 새 데이터가 병합됐을 때. 디바운스 없이 현재 위치로 다시 그립니다.
    pub fn on_data_ready(&mut self) -> Option<ChatFrame<'_>> {
        let state = self.current?;
        let real_timestamp = self.timeline.real_timestamp(state.offset_ms);
        Some(self.frame(real_timestamp))
    }

    /// 도착한 결과를 반영하고, 뭔가 반영됐으면 다시 그립니다.
    pub fn poll(&mut self) -> Option<ChatFrame<'_>> {
        if self.cache.drain() == 0 {
            return None;
        }
        self.on_data_ready()
    }

    /// 메시지 옆에 붙일 편집본 기준 위치 (ms)
    pub fn message_offset(&self, message: &ChatMessage) -> i64 {
        self.timeline.playback_offset(message.timestamp)
    }

    fn frame(&self, real_timestamp: i64) -> ChatFrame<'_> {
        let visible = self.cache.get_between(0, real_timestamp);
        let start = visible.len().saturating_sub(RENDER_LIMIT);
        ChatFrame {
            real_timestamp,
            messages: &visible[start..],
        }
    }

    pub fn close(&mut self) {
        self.cache.close();
    }
}
