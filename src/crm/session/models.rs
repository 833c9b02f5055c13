//! 会话数据模型

use crate::crm::classifier::SuppressionContext;
use crate::crm::config::INITIAL_LOAD_WINDOW;
use crate::crm::provider::Identity;
use tokio::time::Instant;

/// 未登录时的状态文案
pub const SIGNED_OUT_TEXT: &str = "Please sign in";

/// 已登录时的状态文案
pub fn welcome_text(identity: &Identity) -> String {
    let name = identity
        .display_name
        .as_deref()
        .or(identity.email.as_deref())
        .unwrap_or(identity.uid.as_str());
    format!("Welcome, {}", name)
}

/// 当前身份绑定
///
/// `signed_in == true` 时 `user_id` 与 `identity_token` 必定存在；
/// 委托 token 缺失只影响委托功能，不影响登录状态。
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub identity_token: Option<String>,
    pub delegated_access_token: Option<String>,
    pub signed_in: bool,
    /// 用户主动登录后置为 false；窗口到期也视为结束
    pub initial_load: bool,
    pub initial_load_until: Instant,
    /// 用户是否主动发起过登录（整个页面会话内保持）
    pub auth_attempted: bool,
    /// 本次登录是否已启动委托功能（上传委托 token、首次手动同步）
    pub delegated_started: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            user_id: None,
            display_name: None,
            identity_token: None,
            delegated_access_token: None,
            signed_in: false,
            initial_load: true,
            initial_load_until: Instant::now() + INITIAL_LOAD_WINDOW,
            auth_attempted: false,
            delegated_started: false,
        }
    }

    /// 是否仍处于初始加载窗口
    pub fn is_initial_load(&self) -> bool {
        self.initial_load && Instant::now() < self.initial_load_until
    }

    /// 清除身份绑定，保留初始加载与登录尝试标记
    pub fn clear_identity(&mut self) {
        self.user_id = None;
        self.display_name = None;
        self.identity_token = None;
        self.delegated_access_token = None;
        self.signed_in = false;
        self.delegated_started = false;
    }

    pub fn suppression(&self) -> SuppressionContext {
        SuppressionContext {
            initial_load: self.is_initial_load(),
            auth_attempted: self.auth_attempted,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// 就绪后的登录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    SignedOut,
    SignedIn,
}

/// 协调器状态：`Uninitialized -> Initializing -> Ready{SignedOut|SignedIn}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordinatorState {
    #[default]
    Uninitialized,
    Initializing,
    Ready(ReadyState),
}
