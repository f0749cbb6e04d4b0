pub mod config;
pub mod lrc;
pub mod platform;
pub mod protocol;
pub mod state;
