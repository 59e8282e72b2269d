mod message;
pub mod user;
mod vibe;

pub use message::{ChatMessage, ConversationSummary, MessageKind, NewMessage};
pub use user::{NearbyUser, Presence, Profile, VIBE_STATUSES, validate_name, validate_status};
pub use vibe::VibeSignal;
