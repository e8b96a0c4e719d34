pub mod folders;
pub mod host;
pub mod memory_host;
pub mod models;
pub mod settings;
pub mod store;
pub mod title;
