//! Local conversation persistence.

pub mod chat_repo;
pub mod db;

pub use chat_repo::{ChatChange, ChatRepo};
pub use db::Database;
