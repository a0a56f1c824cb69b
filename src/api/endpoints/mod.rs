//! Endpoint handlers.

pub mod frontend;
pub mod health;
pub mod predict;
