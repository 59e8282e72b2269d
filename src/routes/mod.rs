pub mod chat;
pub mod discover;
pub mod health;
pub mod profile;
