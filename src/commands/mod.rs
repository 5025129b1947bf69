//! `tx` 子命令的实现，输出面向用户的中文提示

pub mod config;
pub mod init;
pub mod sync;

pub use config::{list_config, set_config};
pub use init::init_workspace;
pub use sync::{sync, SyncOptions};
