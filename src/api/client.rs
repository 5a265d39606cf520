use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::api::models::{PullResponse, RawRecord, Stream};
use crate::api::session::{BatchSink, ChatSource, FetchBatch, FetchRange};
use crate::error::NetworkError;

const USER_AGENT: &str = "chat-replay/0.1";

/// ====== HTTP 함수들 ======

/// `{api}/streams` 전체 목록
pub async fn fetch_streams(client: &reqwest::Client, api: &str) -> Result<Vec<Stream>, NetworkError> {
    let url = format!("{}/streams", api.trim_end_matches('/'));

    let resp = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        warn!("fetch_streams() HTTP error {} for {}", status, url);
        return Err(NetworkError::Status {
            status: status.as_u16(),
        });
    }

    Ok(resp.json().await?)
}

/// 목록에서 id가 일치하는 스트림을 찾습니다.
pub async fn fetch_video(
    client: &reqwest::Client,
    api: &str,
    video_id: &str,
) -> Result<Option<Stream>, NetworkError> {
    let streams = fetch_streams(client, api).await?;
    Ok(streams.into_iter().find(|s| s.id == video_id))
}

/// `{api}/stream/{video_id}/chat`
pub fn chat_endpoint(api: &str, video_id: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/stream/{}/chat",
        api.trim_end_matches('/'),
        video_id
    ))
}

/// pull 방식 한 번의 응답
#[derive(Debug, Clone)]
pub struct PullPage {
    pub session_token: Option<String>,
    pub records: Vec<RawRecord>,
}

/// 구간 하나를 요청합니다: `GET ...?start=&end=&session_token=`
///
/// 공유 상태를 건드리지 않으며, 토큰 저장은 호출자 몫입니다.
pub async fn fetch_chat(
    client: &reqwest::Client,
    endpoint: &Url,
    range: FetchRange,
    session_token: Option<&str>,
) -> Result<PullPage, NetworkError> {
    let mut request = client
        .get(endpoint.clone())
        .header("User-Agent", USER_AGENT)
        .query(&[("start", range.start), ("end", range.end)]);
    if let Some(token) = session_token {
        request = request.query(&[("session_token", token)]);
    }

    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(NetworkError::Status {
            status: status.as_u16(),
        });
    }

    let body: PullResponse = resp.json().await?;
    Ok(PullPage {
        session_token: body.session_token,
        records: body.res,
    })
}

/// ====== pull 방식 세션 ======

/// HTTP 폴링으로 채팅을 가져오는 세션. 요청마다 태스크를 하나 띄우므로
/// `request`는 Tokio 런타임 안에서 불러야 합니다.
///
/// `reset`/`close` 이전에 나간 요청이 돌려준 토큰은 저장하지 않습니다.
pub struct PullSession {
    client: reqwest::Client,
    endpoint: Url,
    session_token: Arc<Mutex<Option<String>>>,
    generation: Arc<AtomicU64>,
    sink: Option<BatchSink>,
    in_flight: Vec<JoinHandle<()>>,
}

impl PullSession {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        PullSession {
            client,
            endpoint,
            session_token: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            sink: None,
            in_flight: Vec::new(),
        }
    }

    pub fn session_token(&self) -> Option<String> {
        lock_token(&self.session_token).clone()
    }
}

fn lock_token(token: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChatSource for PullSession {
    fn attach(&mut self, sink: BatchSink) {
        self.sink = Some(sink);
    }

    fn request(&mut self, range: FetchRange) -> Result<(), NetworkError> {
        let sink = self.sink.clone().ok_or(NetworkError::Closed)?;
        if sink.is_closed() {
            return Err(NetworkError::Closed);
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("chat fetch {}..{} requested outside a runtime", range.start, range.end);
            return Err(NetworkError::Closed);
        };

        self.in_flight.retain(|handle| !handle.is_finished());

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let token_slot = Arc::clone(&self.session_token);
        let generation = Arc::clone(&self.generation);
        let issued_in = generation.load(Ordering::SeqCst);

        let handle = runtime.spawn(async move {
            let token = lock_token(&token_slot).clone();
            debug!("fetching chat from {} to {}", range.start, range.end);

            let outcome = fetch_chat(&client, &endpoint, range, token.as_deref())
                .await
                .map(|page| {
                    if let Some(next) = page.session_token {
                        let mut slot = lock_token(&token_slot);
                        if generation.load(Ordering::SeqCst) == issued_in {
                            *slot = Some(next);
                        } else {
                            debug!(
                                "ignoring session token for {}..{} issued before reset",
                                range.start, range.end
                            );
                        }
                    }
                    FetchBatch {
                        range: Some(range),
                        records: page.records,
                    }
                });

            // 캐시가 이미 닫혔으면 결과는 버려집니다.
            let _ = sink.send(outcome);
        });
        self.in_flight.push(handle);

        Ok(())
    }

    fn reset(&mut self) {
        let mut slot = lock_token(&self.session_token);
        self.generation.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }

    fn close(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
        self.sink = None;
        self.reset();
    }
}
