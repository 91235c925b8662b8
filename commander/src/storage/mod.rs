//! Storage: layout, settings and the server/log store

pub mod json;
pub mod layout;
pub mod memory;
pub mod settings;
pub mod store;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use store::Store;
