pub mod cache;
pub mod models;
pub mod tags;
pub mod timeline;
pub mod view;

// Re-export commonly used items
pub use cache::{CacheConfig, ChatWindowCache, FetchedRange, FETCH_MARGIN, FETCH_REGION, MAX_CACHE};
pub use models::{ChatMessage, MessageKind, Video};
pub use timeline::Timeline;
pub use view::{ChatFrame, ChatView, PlaybackState, RenderGate};
