pub mod config;
pub mod error;
pub mod gateway;
pub mod pattern;
pub mod pixel_buffer;
pub mod protocol;
pub mod refresh;
pub mod server;
pub mod session;
pub mod worker;

pub use error::{Error, Result};
