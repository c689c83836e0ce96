//! Storage layer: atomic files and the key-value tiers built on them.

mod atomic_toml;
mod memory_store;
mod toml_store;

pub use atomic_toml::AtomicTomlFile;
pub use memory_store::InMemoryKeyValueStore;
pub use toml_store::TomlKeyValueStore;
