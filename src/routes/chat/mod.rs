mod handler;
mod model;

pub use handler::{close_chat, list_chats, list_messages, send_image, send_message, set_typing};
pub use model::{ChatView, SendMessageRequest, TypingRequest};
