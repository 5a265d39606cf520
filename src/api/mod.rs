pub mod client;
pub mod models;
pub mod session;
pub mod websocket;

// Re-export commonly used items
pub use client::{chat_endpoint, fetch_video, PullSession};
pub use session::{BatchSink, ChatSource, FetchBatch, FetchOutcome, FetchRange};
pub use websocket::PushSession;
