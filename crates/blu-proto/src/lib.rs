pub mod config;
pub mod library;
pub mod platform;
pub mod protocol;
