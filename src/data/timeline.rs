use crate::api::models::Jumpcut;
use crate::data::models::Video;

/// 편집본 재생 위치(밀리초)를 채팅 백엔드의 실제 시각(epoch 밀리초)으로 변환합니다.
///
/// jumpcut 목록은 수십 개 수준이라 재생 위치가 바뀔 때마다 다시 계산합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    base_timestamp_ms: i64,
    /// (컷 위치 ms, 잘린 길이 ms), 컷 위치 오름차순
    cuts: Vec<(i64, i64)>,
}

fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

impl Timeline {
    pub fn new(base_timestamp_s: i64, jumpcuts: &[Jumpcut]) -> Self {
        let mut cuts: Vec<(i64, i64)> = jumpcuts
            .iter()
            .map(|j| (secs_to_ms(j.at), secs_to_ms(j.duration)))
            .collect();
        cuts.sort_by_key(|(at, _)| *at);

        Timeline {
            base_timestamp_ms: base_timestamp_s * 1000,
            cuts,
        }
    }

    pub fn for_video(video: &Video) -> Self {
        Self::new(video.timestamp, &video.jumpcuts)
    }

    pub fn base_timestamp_ms(&self) -> i64 {
        self.base_timestamp_ms
    }

    /// `offset_ms` 시점까지 지나간 jumpcut들의 잘린 길이 합 (ms)
    pub fn jumpcut_offset(&self, offset_ms: i64) -> i64 {
        let actual = self.base_timestamp_ms + offset_ms;
        self.cuts
            .iter()
            .take_while(|(at, _)| *at <= actual)
            .map(|(_, duration)| duration)
            .sum()
    }

    /// 재생 위치 → 실제 채팅 시각
    pub fn real_timestamp(&self, offset_ms: i64) -> i64 {
        self.base_timestamp_ms + offset_ms + self.jumpcut_offset(offset_ms)
    }

    /// 실제 채팅 시각 → 재생 위치 (메시지 옆에 표시하는 위치 라벨용)
    ///
    /// 잘려나간 구간 안의 시각은 해당 컷 위치로 모입니다.
    pub fn playback_offset(&self, real_ts_ms: i64) -> i64 {
        let mut removed = 0;
        for (at, duration) in &self.cuts {
            // 이 컷이 적용되는 가장 이른 실제 시각
            let cut_real = at + removed + duration;
            if real_ts_ms < cut_real {
                if real_ts_ms >= at + removed {
                    return at - self.base_timestamp_ms;
                }
                break;
            }
            removed += duration;
        }
        real_ts_ms - self.base_timestamp_ms - removed
    }
}
