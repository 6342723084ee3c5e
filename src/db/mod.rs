//! Database layer - the store seam, the MongoDB driver backend and the
//! in-memory backend

pub mod client;
pub mod memory;
pub mod store;

pub use client::{ConnectArgs, ConnectArgsBuilder, MongoStore};
pub use memory::MemoryStore;
pub use store::{BookStore, DeleteSummary, UpdateSummary};
