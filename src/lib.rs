pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{TxConfig, Workspace};
pub use core::{Direction, SyncConfig, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
pub use storage::{create_storage, ObjectStore};
