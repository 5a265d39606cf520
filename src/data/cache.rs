use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::api::session::{ChatSource, FetchOutcome, FetchRange};
use crate::data::models::ChatMessage;

/// 캐시에 남겨둘 최대 메시지 수 (오래된 것부터 버림)
pub const MAX_CACHE: usize = 800;
/// 한 번에 요청하는 구간 길이 (ms)
pub const FETCH_REGION: i64 = 30 * 1000;
/// 현재 위치 앞뒤로 확보해야 하는 여유 (ms)
pub const FETCH_MARGIN: i64 = 10 * 1000;

/// 캐시 튜닝 값
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_cache: usize,
    pub fetch_region: i64,
    pub fetch_margin: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_cache: MAX_CACHE,
            fetch_region: FETCH_REGION,
            fetch_margin: FETCH_MARGIN,
        }
    }
}

/// 이미 요청(혹은 요청했다고 가정)한 구간 `[low, high]`.
/// 비어 있을 때는 `[+inf, -inf]`에 해당하는 `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchedRange(Option<(i64, i64)>);

impl FetchedRange {
    pub fn empty() -> Self {
        FetchedRange(None)
    }

    pub fn new(low: i64, high: i64) -> Self {
        FetchedRange(Some((low.min(high), low.max(high))))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn bounds(&self) -> Option<(i64, i64)> {
        self.0
    }

    pub fn covers(&self, low: i64, high: i64) -> bool {
        matches!(self.0, Some((l, h)) if l <= low && high <= h)
    }

    /// 두 구간을 감싸는 구간으로 넓힙니다.
    pub fn union(self, low: i64, high: i64) -> Self {
        match self.0 {
            None => FetchedRange::new(low, high),
            Some((l, h)) => FetchedRange::new(l.min(low), h.max(high)),
        }
    }

    /// `-inf` 취급된 상한 (비어 있으면 `None`)
    fn high(&self) -> Option<i64> {
        self.0.map(|(_, h)| h)
    }
}

type DataReadyCallback = Box<dyn FnMut() + Send>;

/// 재생 위치 주변의 채팅을 구간 단위로 가져와 중복 없이 들고 있는 캐시.
///
/// 메시지 버퍼는 항상 시각 오름차순, id 유일, 최근 `max_cache`개 이하입니다.
/// 단일 제어 흐름에서만 다루며, 멀티스레드에서 쓰려면 인스턴스 전체를 하나의
/// 뮤텍스로 감싸야 합니다.
pub struct ChatWindowCache<S: ChatSource> {
    source: S,
    config: CacheConfig,
    messages: Vec<ChatMessage>,
    fetched: FetchedRange,
    results: Option<mpsc::UnboundedReceiver<FetchOutcome>>,
    on_data_ready: Option<DataReadyCallback>,
    requests_sent: u64,
}

impl<S: ChatSource> ChatWindowCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, CacheConfig::default())
    }

    pub fn with_config(mut source: S, config: CacheConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        source.attach(tx);

        ChatWindowCache {
            source,
            config,
            messages: Vec::new(),
            fetched: FetchedRange::empty(),
            results: Some(rx),
            on_data_ready: None,
            requests_sent: 0,
        }
    }

    /// 병합이 끝날 때마다 호출될 콜백을 등록합니다.
    pub fn set_on_data_ready<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_data_ready = Some(Box::new(callback));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn fetched_range(&self) -> FetchedRange {
        self.fetched
    }

    pub fn is_closed(&self) -> bool {
        self.results.is_none()
    }

    /// 지금까지 백엔드로 보낸 요청 수
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// `target` 주변 데이터가 없으면 다음 구간을 요청합니다. 블로킹하지 않습니다.
    pub fn ensure_data(&mut self, target: i64) {
        if self.is_closed() {
            return;
        }

        let margin = self.config.fetch_margin;
        let required_low = (target - margin).max(0);
        let required_high = target + margin;

        if self.fetched.covers(required_low, required_high) {
            return;
        }

        // 이미 가진 구간 뒤쪽부터 고정 크기로 앞으로 가져옴
        let start = match self.fetched.high() {
            Some(high) => required_low.max(high),
            None => required_low,
        };
        let range = FetchRange {
            start,
            end: start + self.config.fetch_region,
        };

        // 응답 전에 미리 넓혀서 연속 호출이 같은 구간을 또 요청하지 않게 함
        self.fetched = self.fetched.union(range.start, range.end);

        debug!("fetching from {} to {}", range.start, range.end);
        self.requests_sent += 1;
        if let Err(e) = self.source.request(range) {
            warn!(
                "chat fetch {}..{} could not be sent: {}",
                range.start, range.end, e
            );
        }
    }

    /// 도착한 결과 하나를 반영합니다. 닫힌 캐시에서는 아무것도 하지 않습니다.
    pub fn apply(&mut self, outcome: FetchOutcome) {
        if self.is_closed() {
            return;
        }

        match outcome {
            Ok(batch) => {
                let incoming: Vec<ChatMessage> = batch
                    .records
                    .iter()
                    .filter_map(|record| {
                        let message = ChatMessage::from_record(record);
                        if message.is_none() {
                            trace!("dropping malformed chat record at {}", record.ts);
                        }
                        message
                    })
                    .collect();
                match batch.range {
                    Some(range) => debug!(
                        "merging {}/{} chat records for {}..{}",
                        incoming.len(),
                        batch.records.len(),
                        range.start,
                        range.end
                    ),
                    None => debug!(
                        "merging {}/{} pushed chat records",
                        incoming.len(),
                        batch.records.len()
                    ),
                }
                self.merge(incoming);
            }
            Err(e) => {
                // 낙관적으로 넓힌 구간은 되돌리지 않음
                warn!("chat fetch failed (transient={}): {}", e.is_transient(), e);
            }
        }
    }

    /// 이미 도착한 결과를 모두 반영하고 반영한 개수를 돌려줍니다.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(outcome) = self.results.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.apply(outcome);
            applied += 1;
        }
        applied
    }

    /// 다음 결과가 올 때까지 기다렸다가 반영합니다. 닫힌 캐시면 `None`.
    pub async fn next_update(&mut self) -> Option<()> {
        let outcome = self.results.as_mut()?.recv().await?;
        self.apply(outcome);
        Some(())
    }

    /// 기존 메시지와 새 메시지를 합칩니다. 같은 id는 먼저 들어온 쪽이 남습니다.
    fn merge(&mut self, incoming: Vec<ChatMessage>) {
        if incoming.is_empty() {
            return;
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(self.messages.len() + incoming.len());
        let mut merged = Vec::with_capacity(self.messages.len() + incoming.len());
        for message in self.messages.drain(..).chain(incoming) {
            if seen.insert(message.id.clone()) {
                merged.push(message);
            }
        }

        // 안정 정렬이라 같은 시각끼리는 도착 순서 유지
        merged.sort_by_key(|m| m.timestamp);

        let excess = merged.len().saturating_sub(self.config.max_cache);
        if excess > 0 {
            merged.drain(..excess);
        }
        self.messages = merged;

        if let Some(callback) = self.on_data_ready.as_mut() {
            callback();
        }
    }

    /// `start <= ts <= end`인 연속 구간
    pub fn get_between(&self, start: i64, end: i64) -> &[ChatMessage] {
        if start > end {
            return &[];
        }
        let lo = self.messages.partition_point(|m| m.timestamp < start);
        let hi = self.messages.partition_point(|m| m.timestamp <= end);
        &self.messages[lo..hi.max(lo)]
    }

    /// 구간 기록과 메시지를 비웁니다. 진행 중인 요청은 취소하지 않습니다.
    pub fn clear(&mut self) {
        self.fetched = FetchedRange::empty();
        self.messages.clear();
        self.source.reset();
    }

    /// 캐시를 비우고 네트워크 세션을 닫습니다. 이후 도착하는 결과는 버려집니다.
    pub fn close(&mut self) {
        self.clear();
        self.results = None;
        self.source.close();
    }
}

impl<S: ChatSource> Drop for ChatWindowCache<S> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.source.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::api::models::RawRecord;
    use crate::api::session::{BatchSink, FetchBatch};
    use crate::error::NetworkError;

    /// 요청을 기록만 하는 소스. 응답은 테스트가 직접 sink로 넣습니다.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSource {
        pub requests: Arc<Mutex<Vec<FetchRange>>>,
        pub sink: Arc<Mutex<Option<BatchSink>>>,
        pub resets: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl RecordingSource {
        pub fn requests(&self) -> Vec<FetchRange> {
            self.requests.lock().unwrap().clone()
        }

        pub fn respond(&self, outcome: FetchOutcome) {
            let sink = self.sink.lock().unwrap().clone().unwrap();
            let _ = sink.send(outcome);
        }
    }

    impl ChatSource for RecordingSource {
        fn attach(&mut self, sink: BatchSink) {
            *self.sink.lock().unwrap() = Some(sink);
        }

        fn request(&mut self, range: FetchRange) -> Result<(), NetworkError> {
            self.requests.lock().unwrap().push(range);
            Ok(())
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record(id: &str, ts: i64) -> RawRecord {
        serde_json::from_value(json!({
            "ts": ts,
            "content": { "tags": { "id": id, "display-name": "viewer" }, "message": id, "type": "chat" },
        }))
        .unwrap()
    }

    pub(crate) fn batch(records: Vec<RawRecord>) -> FetchOutcome {
        Ok(FetchBatch {
            range: None,
            records,
        })
    }

    fn ids(cache: &ChatWindowCache<RecordingSource>) -> Vec<String> {
        cache.messages().iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_cold_start_fetches_one_region() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);

        assert_eq!(
            source.requests(),
            vec![FetchRange { start: 10_000, end: 40_000 }]
        );
        assert_eq!(cache.fetched_range().bounds(), Some((10_000, 40_000)));
    }

    #[test]
    fn test_near_start_clamps_to_zero() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(3_000);
        assert_eq!(source.requests(), vec![FetchRange { start: 0, end: 30_000 }]);
    }

    #[test]
    fn test_covered_target_does_not_refetch() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        cache.ensure_data(20_000);
        cache.ensure_data(25_000);
        cache.ensure_data(30_000);

        assert_eq!(source.requests().len(), 1);
        assert_eq!(cache.requests_sent(), 1);
    }

    #[test]
    fn test_playback_extends_forward_from_known_end() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        // 20000..40000 필요, 이미 10000..40000 → 40000 넘으면 다음 구간
        cache.ensure_data(31_000);

        assert_eq!(
            source.requests(),
            vec![
                FetchRange { start: 10_000, end: 40_000 },
                FetchRange { start: 40_000, end: 70_000 },
            ]
        );
        assert_eq!(cache.fetched_range().bounds(), Some((10_000, 70_000)));
    }

    #[test]
    fn test_fetched_range_only_grows() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        let mut previous = cache.fetched_range();
        for target in [20_000, 35_000, 5_000, 90_000, 61_000, 0, 200_000] {
            cache.ensure_data(target);
            let current = cache.fetched_range();
            if let Some((low, high)) = previous.bounds() {
                assert!(current.covers(low, high), "{:?} shrank to {:?}", previous, current);
            }
            previous = current;
        }
    }

    #[test]
    fn test_large_seek_after_clear() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        cache.apply(batch(vec![record("a", 15_000)]));
        assert_eq!(cache.messages().len(), 1);

        cache.clear();
        assert!(cache.messages().is_empty());
        assert!(cache.fetched_range().is_empty());
        assert_eq!(source.resets.load(Ordering::SeqCst), 1);

        cache.ensure_data(500_000);
        assert_eq!(
            source.requests().last(),
            Some(&FetchRange { start: 490_000, end: 520_000 })
        );
    }

    #[test]
    fn test_duplicate_ids_across_overlapping_fetches() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        source.respond(batch(vec![record("x1", 15_000)]));
        source.respond(batch(vec![record("x1", 15_000), record("x2", 16_000)]));
        assert_eq!(cache.drain(), 2);

        assert_eq!(ids(&cache), vec!["x1", "x2"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source);

        let response = vec![record("b", 2_000), record("a", 1_000), record("c", 3_000)];
        cache.apply(batch(response.clone()));
        let once = cache.messages().to_vec();
        cache.apply(batch(response));

        assert_eq!(cache.messages(), once.as_slice());
        assert_eq!(ids(&cache), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_first_seen_wins() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source);

        cache.apply(batch(vec![record("x", 1_000)]));
        cache.apply(batch(vec![record("x", 9_000)]));

        assert_eq!(cache.messages().len(), 1);
        assert_eq!(cache.messages()[0].timestamp, 1_000);
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source);

        for chunk in 0..5 {
            let records = (0..250)
                .map(|i| {
                    let n = chunk * 250 + i;
                    record(&format!("m{}", n), n as i64 * 10)
                })
                .collect();
            cache.apply(batch(records));
            assert!(cache.messages().len() <= MAX_CACHE);
        }

        assert_eq!(cache.messages().len(), MAX_CACHE);
        assert_eq!(cache.messages()[0].id, "m450");
        assert_eq!(cache.messages().last().unwrap().id, "m1249");
        assert!(cache
            .messages()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_get_between_inclusive() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source);
        cache.apply(batch(vec![
            record("a", 1_000),
            record("b", 2_000),
            record("c", 2_000),
            record("d", 3_000),
        ]));

        let ids_between = |a, b| {
            cache
                .get_between(a, b)
                .iter()
                .map(|m| m.id.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids_between(2_000, 3_000), vec!["b", "c", "d"]);
        assert_eq!(ids_between(0, 1_000), vec!["a"]);
        assert_eq!(ids_between(1_001, 1_999), Vec::<&str>::new());
        assert_eq!(ids_between(5_000, 9_000), Vec::<&str>::new());
        assert_eq!(ids_between(3_000, 1_000), Vec::<&str>::new());
    }

    #[test]
    fn test_failed_fetch_keeps_optimistic_range() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        source.respond(Err(NetworkError::Status { status: 503 }));
        cache.drain();

        assert!(cache.messages().is_empty());
        assert_eq!(cache.fetched_range().bounds(), Some((10_000, 40_000)));
        cache.ensure_data(20_000);
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn test_malformed_record_next_to_good_one() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        let page: crate::api::models::PullResponse = serde_json::from_value(json!({
            "res": [
                { "ts": 12_000, "content": { "tags": { "id": "good" }, "message": "hi" } },
                { "ts": 13_000, "content": { "tags": { "id": "sub1" }, "message": null, "type": "sub" } },
                { "ts": 14_000, "content": { "tags": null, "message": "no id" } },
                { "ts": 15_000, "content": 5 },
            ],
        }))
        .unwrap();
        source.respond(Ok(FetchBatch {
            range: Some(FetchRange { start: 10_000, end: 40_000 }),
            records: page.res,
        }));
        cache.drain();

        assert_eq!(ids(&cache), vec!["good", "sub1"]);
        assert_eq!(cache.messages()[1].message, "");
    }

    #[test]
    fn test_late_fetch_after_clear_still_merges() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        cache.clear();
        source.respond(batch(vec![record("stale", 15_000)]));
        cache.drain();

        assert_eq!(ids(&cache), vec!["stale"]);
    }

    #[test]
    fn test_closed_cache_ignores_late_results() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        cache.close();
        source.respond(batch(vec![record("late", 15_000)]));
        cache.apply(batch(vec![record("late", 15_000)]));
        cache.drain();
        cache.ensure_data(90_000);

        assert!(cache.messages().is_empty());
        assert_eq!(source.requests().len(), 1);
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);
        drop(cache);
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_data_ready_callback() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache.set_on_data_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cache.apply(batch(vec![record("a", 1)]));
        cache.apply(batch(vec![]));
        cache.apply(Err(NetworkError::Transport("reset".into())));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_next_update_waits_for_result() {
        let source = RecordingSource::default();
        let mut cache = ChatWindowCache::new(source.clone());

        cache.ensure_data(20_000);
        let responder = source.clone();
        tokio::spawn(async move {
            responder.respond(batch(vec![record("a", 12_000)]));
        });

        assert_eq!(cache.next_update().await, Some(()));
        assert_eq!(cache.get_between(0, 20_000).len(), 1);

        cache.close();
        assert_eq!(cache.next_update().await, None);
    }
}
