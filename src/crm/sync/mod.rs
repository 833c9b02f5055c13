//! 邮件同步模块
//!
//! 轮询后台同步状态，并与用户/登录触发的手动同步协调同一份状态

pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use listener::{EmptySyncView, SyncView};
pub use models::{ManualSync, SyncOrigin, SyncPhase, SyncResult, SyncState};
pub use service::BackgroundSyncMonitor;
