/// 채팅 백엔드와의 통신 실패
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// 연결 실패, 타임아웃, 소켓 오류 등
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error {status} from chat backend")]
    Status { status: u16 },

    #[error("Malformed chat response: {0}")]
    Decode(String),

    #[error("Chat session closed")]
    Closed,
}

impl NetworkError {
    /// 다시 시도해볼 만한 실패인지 여부 (5xx, 429, 전송 오류)
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Transport(_) => true,
            NetworkError::Status { status } => *status >= 500 || *status == 429,
            NetworkError::Decode(_) | NetworkError::Closed => false,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            NetworkError::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            NetworkError::Decode(err.to_string())
        } else {
            NetworkError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => NetworkError::Closed,
            WsError::Http(response) => NetworkError::Status {
                status: response.status().as_u16(),
            },
            other => NetworkError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Decode(err.to_string())
    }
}
