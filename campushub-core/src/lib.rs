pub mod channel;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
