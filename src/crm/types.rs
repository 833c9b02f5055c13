//! 后端接口的请求/响应结构体

use serde::{Deserialize, Serialize};

/// 查询同步状态所需的凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCredentials {
    pub identity_token: String,
    pub user_id: String,
}

/// 手动触发邮件同步所需的凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCredentials {
    pub identity_token: String,
    pub delegated_token: String,
    pub user_id: String,
}

/// `sync-status` 响应
///
/// 出错时服务端只返回 `success` 和 `message`，其余字段都可能缺失
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusResp {
    #[serde(default)]
    pub success: bool,
    /// 后台同步任务是否在运行
    #[serde(default)]
    pub sync_in_progress: bool,
    /// 手动同步是否在运行
    #[serde(default)]
    pub manual_sync_in_progress: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub last_run_success: Option<bool>,
    #[serde(default)]
    pub last_run_message: Option<String>,
    #[serde(default)]
    pub last_run_timestamp: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `force-sync-emails` 响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceSyncResp {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub synced_count: Option<u64>,
}

/// `store-token` 请求体
#[derive(Debug, Clone, Serialize)]
pub struct StoreTokenReq<'a> {
    pub token: &'a str,
}

/// `store-token` 响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoreTokenResp {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
