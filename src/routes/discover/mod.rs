mod handler;
mod model;

pub use handler::{discover, refresh, send_vibe};
pub use model::{DiscoverView, UserCard, VibeRequest};
