//! 客户端配置与固定常量
//!
//! 时间窗口、接口路径都是固定值，不随单次调用变化。

use std::time::Duration;

/// 初始加载窗口：进程启动后 2 秒内不展示认证错误
pub const INITIAL_LOAD_WINDOW: Duration = Duration::from_secs(2);
/// 错误横幅展示时长
pub const ERROR_DISPLAY_WINDOW: Duration = Duration::from_secs(5);
/// 同步完成/失败提示的展示时长
pub const SYNC_DISPLAY_WINDOW: Duration = Duration::from_secs(3);
/// 后台同步状态轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// 身份 token 的同源 cookie 名
pub const TOKEN_COOKIE_NAME: &str = "firebase_token";

/// 后端接口路径
pub mod endpoints {
    pub const SYNC_STATUS: &str = "/api/gmail/sync-status";
    pub const FORCE_SYNC_EMAILS: &str = "/api/gmail/force-sync-emails";
    pub const STORE_TOKEN: &str = "/google/store-token";
    pub const CONTACTS_LIST: &str = "/api/contacts/list";
    pub const CONTACTS_SYNC: &str = "/api/contacts/sync";
    pub const CONTACTS_IMPORT: &str = "/api/contacts/import";
    /// 后接 URL 编码后的联系人资源名
    pub const CONTACTS_CHECK_IMPORT: &str = "/api/contacts/check-import";
}

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 后端 HTTP 基础地址，例如 `http://localhost:5000`
    pub api_base_url: String,
    /// 公共入口页（登录成功后只有从这些页面出发才跳转）
    pub public_entry_paths: Vec<String>,
    /// 登录后的落地页
    pub landing_path: String,
    /// 登出后跳转的页面
    pub sign_out_path: String,
    /// 身份 cookie 名
    pub cookie_name: String,
    /// 向身份提供方申请的 OAuth scope
    pub oauth_scopes: Vec<String>,
    /// 身份提供方的自定义参数（prompt、access_type 等）
    pub oauth_parameters: Vec<(String, String)>,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            public_entry_paths: vec!["/".to_string(), "/landing".to_string()],
            landing_path: "/dashboard".to_string(),
            sign_out_path: "/".to_string(),
            cookie_name: TOKEN_COOKIE_NAME.to_string(),
            oauth_scopes: vec![
                "profile".to_string(),
                "email".to_string(),
                "https://www.googleapis.com/auth/contacts.readonly".to_string(),
                "https://www.googleapis.com/auth/contacts.other.readonly".to_string(),
            ],
            oauth_parameters: vec![
                // 每次都展示授权页，保证拿到新的委托 token
                ("prompt".to_string(), "consent".to_string()),
                ("access_type".to_string(), "offline".to_string()),
            ],
        }
    }

    /// 当前路径是否为公共入口页
    pub fn is_public_entry(&self, path: &str) -> bool {
        self.public_entry_paths.iter().any(|p| p == path)
    }

    /// 拼接完整接口地址
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}
