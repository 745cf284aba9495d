pub mod analysis;
pub mod chat;
pub mod errors;
pub mod events;
pub mod models;
pub mod session;
pub mod ui;
pub mod upload;
