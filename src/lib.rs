pub mod buffer;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod file;
pub mod input;
pub mod message;
