pub mod api;
pub mod bot;
pub mod config;
pub mod core;
pub mod infrastructure;

pub use crate::core::errors::GateError;
pub use crate::core::services::GateService;
pub use crate::infrastructure::storage::{in_memory::InMemoryStorage, sqlite::SqliteStorage};

#[cfg(test)]
mod tests; // Include integration tests
