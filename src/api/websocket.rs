use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::models::{PushRequest, PushResponse};
use crate::api::session::{BatchSink, ChatSource, FetchBatch, FetchRange};
use crate::error::NetworkError;

/// ====== push 방식 세션 ======

/// 하나의 WebSocket 연결 위에서 `{ id, start, end }` 요청을 보내고
/// 서버가 비동기로 밀어주는 배치를 받는 세션.
///
/// 연결 전에 보낸 요청은 큐에 쌓였다가 연결되면 순서대로 나갑니다.
/// 연결 태스크는 `attach` 시점의 Tokio 런타임에 띄웁니다. 런타임 밖에서
/// `attach`하면 sink로 `Closed`를 보내고 이후 요청은 모두 실패합니다.
pub struct PushSession {
    endpoint: Url,
    next_id: u64,
    outgoing: Option<mpsc::UnboundedSender<PushRequest>>,
    task: Option<JoinHandle<()>>,
}

impl PushSession {
    pub fn new(endpoint: Url) -> Self {
        PushSession {
            endpoint,
            next_id: 0,
            outgoing: None,
            task: None,
        }
    }

    /// 다음 요청에 붙을 id
    pub fn next_request_id(&self) -> u64 {
        self.next_id
    }
}

impl ChatSource for PushSession {
    fn attach(&mut self, sink: BatchSink) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("chat websocket {} attached outside a runtime", self.endpoint);
            let _ = sink.send(Err(NetworkError::Closed));
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = self.endpoint.clone();

        self.outgoing = Some(tx);
        self.task = Some(runtime.spawn(async move {
            if let Err(e) = run_connection(&endpoint, rx, &sink).await {
                warn!("chat websocket error for {}: {}", endpoint, e);
                let _ = sink.send(Err(e));
            }
        }));
    }

    fn request(&mut self, range: FetchRange) -> Result<(), NetworkError> {
        let outgoing = self.outgoing.as_ref().ok_or(NetworkError::Closed)?;

        let request = PushRequest {
            id: self.next_id,
            start: range.start,
            end: range.end,
        };
        outgoing.send(request).map_err(|_| NetworkError::Closed)?;
        self.next_id += 1;

        Ok(())
    }

    fn close(&mut self) {
        // 송신 채널을 닫으면 연결 태스크가 close 프레임을 보내고 끝납니다.
        self.outgoing = None;
        if let Some(task) = self.task.take() {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                return;
            };
            if task.is_finished() {
                return;
            }
            handle.spawn(async move {
                if tokio::time::timeout(std::time::Duration::from_secs(5), task)
                    .await
                    .is_err()
                {
                    debug!("chat websocket did not close in time");
                }
            });
        }
    }
}

async fn run_connection(
    endpoint: &Url,
    mut outgoing: mpsc::UnboundedReceiver<PushRequest>,
    sink: &BatchSink,
) -> Result<(), NetworkError> {
    let (mut ws_stream, _) = connect_async(endpoint.as_str()).await?;
    info!("Opened! chat websocket {}", endpoint);

    loop {
        tokio::select! {
            request = outgoing.recv() => {
                match request {
                    Some(request) => {
                        debug!("fetching from {} to {} (id={})", request.start, request.end, request.id);
                        ws_stream
                            .send(Message::Text(serde_json::to_string(&request)?))
                            .await?;
                    }
                    None => {
                        ws_stream.close(None).await.ok();
                        break;
                    }
                }
            }

            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_ws_message(&text, sink);
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite가 자동으로 pong 처리
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(NetworkError::Closed);
                    }
                    Some(Err(e)) => {
                        return Err(e.into());
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Closed! chat websocket {}", endpoint);
    Ok(())
}

/// 서버 배치 하나를 해석해 sink로 넘깁니다. 빈 배치는 무시합니다.
fn handle_ws_message(text: &str, sink: &BatchSink) {
    let outcome = match serde_json::from_str::<PushResponse>(text) {
        Ok(resp) if resp.res.is_empty() => return,
        Ok(resp) => Ok(FetchBatch {
            range: None,
            records: resp.res,
        }),
        Err(e) => Err(NetworkError::from(e)),
    };

    let _ = sink.send(outcome);
}
