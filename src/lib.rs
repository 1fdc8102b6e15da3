pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod render;
pub mod reveal;
pub mod session;
pub mod storage;
pub mod store;
