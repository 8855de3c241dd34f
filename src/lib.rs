pub mod chat;
pub mod chord;
pub mod config;
pub mod error;
pub mod network;
