pub mod config;
pub mod logging;

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod platform;
pub mod source;
pub mod transport;
