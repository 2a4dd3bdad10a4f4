pub mod chat;
pub mod events;
pub mod history;
pub mod mode;
pub mod request;
pub mod stream;
pub mod transcript;
