#![forbid(unsafe_code)]

pub mod agent;
pub mod config;
pub mod errors;
pub mod identity;
pub mod media;
pub mod models;
pub mod persistence;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
