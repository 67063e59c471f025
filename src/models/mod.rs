//! Domain model module declarations.

pub mod chat;
pub mod message;
pub mod verify;
