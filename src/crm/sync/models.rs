//! 同步状态模型

use chrono::{DateTime, Utc};

/// 状态栏文案
pub const SYNCING_TEXT: &str = "Syncing emails...";
pub const SYNC_COMPLETE_TEXT: &str = "Email sync complete";

/// 当前这次同步由谁发起
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOrigin {
    Manual,
    Background,
}

/// 同步阶段：`Idle -> Running{manual|background} -> Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Running(SyncOrigin),
}

/// 最近一次手动同步的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    Success { message: Option<String> },
    Failure { message: String },
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// 轮询带回的服务端最近一次运行信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerRunSummary {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub timestamp: Option<String>,
}

/// 同步状态（本客户端视角）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub phase: SyncPhase,
    pub last_result: Option<SyncResult>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub server_last_run: Option<ServerRunSummary>,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        matches!(self.phase, SyncPhase::Running(_))
    }

    pub fn origin(&self) -> Option<SyncOrigin> {
        match self.phase {
            SyncPhase::Idle => None,
            SyncPhase::Running(origin) => Some(origin),
        }
    }
}

/// `trigger_manual` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualSync {
    /// 已有手动同步在运行，本次调用被忽略
    AlreadyRunning,
    Completed(SyncResult),
}
