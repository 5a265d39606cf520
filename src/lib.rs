pub mod api;
pub mod data;
pub mod error;
pub mod utils;

pub use api::session::{ChatSource, FetchRange};
pub use data::cache::ChatWindowCache;
pub use data::timeline::Timeline;
pub use data::view::{ChatView, PlaybackState};
pub use error::NetworkError;
