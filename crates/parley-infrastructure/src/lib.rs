//! Infrastructure layer for Parley: storage tiers, paths, configuration
//! loading and the replay backend.

pub mod config_service;
pub mod paths;
pub mod replay_backend;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::paths::{ParleyPaths, ServiceType};
pub use crate::replay_backend::ReplayBackend;
pub use crate::storage::{InMemoryKeyValueStore, TomlKeyValueStore};
