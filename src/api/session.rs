use tokio::sync::mpsc;

use crate::api::models::RawRecord;
use crate::error::NetworkError;

/// 요청 구간 `[start, end]` (채팅 시각, epoch 밀리초)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRange {
    pub start: i64,
    pub end: i64,
}

/// 한 번의 응답으로 도착한 레코드 묶음
#[derive(Debug, Clone)]
pub struct FetchBatch {
    /// pull 방식은 요청 구간을 알 수 있고, push 방식은 응답에 구간이 없습니다.
    pub range: Option<FetchRange>,
    pub records: Vec<RawRecord>,
}

pub type FetchOutcome = Result<FetchBatch, NetworkError>;

/// 비동기로 끝난 요청 결과를 캐시 쪽으로 돌려보내는 채널
pub type BatchSink = mpsc::UnboundedSender<FetchOutcome>;

/// 채팅 백엔드 프로토콜 클라이언트.
///
/// `request`는 블로킹 없이 요청만 내보내고, 결과는 `attach`로 받은 sink로
/// 전달합니다. 내부에서 재시도하지 않습니다.
pub trait ChatSource {
    /// 결과를 보낼 sink를 연결합니다. 캐시 생성 시 한 번 호출됩니다.
    fn attach(&mut self, sink: BatchSink);

    /// `range` 구간을 요청합니다. 요청을 보낼 수조차 없으면 바로 에러를 돌려줍니다.
    fn request(&mut self, range: FetchRange) -> Result<(), NetworkError>;

    /// 세션 토큰 / 요청 id 같은 세션 상태를 초기화합니다.
    fn reset(&mut self) {}

    /// 연결 등 네트워크 자원을 정리합니다.
    fn close(&mut self);
}

impl<S: ChatSource + ?Sized> ChatSource for Box<S> {
    fn attach(&mut self, sink: BatchSink) {
        (**self).attach(sink)
    }

    fn request(&mut self, range: FetchRange) -> Result<(), NetworkError> {
        (**self).request(range)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
