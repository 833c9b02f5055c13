//! 身份提供方接口
//!
//! 弹窗登录、token 签发、登录态持久化都由外部 SDK 完成，这里只定义调用边界。
//! [`StaticIdentityProvider`] 用预先签发好的 token 模拟一次交互式登录，
//! 供 CLI 联调和单元测试使用。

use crate::crm::config::ClientConfig;
use crate::crm::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 已认证的用户身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// 交互式登录的结果
#[derive(Debug, Clone)]
pub struct SignInResult {
    pub identity: Identity,
    /// 委托 token（OAuth access token），授权失败时缺失
    pub access_token: Option<String>,
}

/// 登录态持久化级别，按顺序尝试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Durable,
    InMemory,
    None,
}

/// 初始化身份提供方时传入的设置
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub scopes: Vec<String>,
    pub custom_parameters: Vec<(String, String)>,
}

impl From<&ClientConfig> for ProviderSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            scopes: config.oauth_scopes.clone(),
            custom_parameters: config.oauth_parameters.clone(),
        }
    }
}

/// 身份状态变化的接收端，按提供方发出的顺序投递
pub type IdentityReceiver = mpsc::UnboundedReceiver<Option<Identity>>;

/// 身份提供方 SDK 的调用边界
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 初始化 SDK
    async fn initialize(&self, settings: &ProviderSettings) -> Result<(), ProviderError>;

    /// 设置登录态持久化级别
    async fn set_persistence(&self, persistence: Persistence) -> Result<(), ProviderError>;

    /// 订阅身份状态变化，订阅后立即收到一次当前状态
    fn subscribe(&self) -> IdentityReceiver;

    /// 提供方当前认定的身份
    fn current_identity(&self) -> Option<Identity>;

    /// 弹窗登录
    async fn sign_in_with_popup(&self) -> Result<SignInResult, ProviderError>;

    /// 登出
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// 获取身份 token
    async fn id_token(&self, identity: &Identity, force_refresh: bool)
        -> Result<String, ProviderError>;
}

struct StaticState {
    account: Identity,
    id_token: String,
    access_token: Option<String>,
    current: Option<Identity>,
    persistence: Option<Persistence>,
    init_error: Option<ProviderError>,
    rejected_persistence: Vec<Persistence>,
    popup_error: Option<ProviderError>,
    sign_out_error: Option<ProviderError>,
    id_token_error: Option<ProviderError>,
}

/// 使用预签发 token 的身份提供方
pub struct StaticIdentityProvider {
    state: Mutex<StaticState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
    popup_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl StaticIdentityProvider {
    /// `account` 为弹窗登录后得到的身份
    pub fn new(account: Identity, id_token: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            state: Mutex::new(StaticState {
                account,
                id_token: id_token.into(),
                access_token,
                current: None,
                persistence: None,
                init_error: None,
                rejected_persistence: Vec::new(),
                popup_error: None,
                sign_out_error: None,
                id_token_error: None,
            }),
            subscribers: Mutex::new(Vec::new()),
            popup_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// 以已登录状态启动（模拟持久化恢复的会话）
    pub fn signed_in(self) -> Self {
        {
            let mut state = self.lock();
            state.current = Some(state.account.clone());
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, StaticState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_initialize(&self, error: Option<ProviderError>) {
        self.lock().init_error = error;
    }

    pub fn reject_persistence(&self, persistence: Persistence) {
        self.lock().rejected_persistence.push(persistence);
    }

    pub fn fail_popup(&self, error: Option<ProviderError>) {
        self.lock().popup_error = error;
    }

    pub fn fail_sign_out(&self, error: Option<ProviderError>) {
        self.lock().sign_out_error = error;
    }

    pub fn fail_id_token(&self, error: Option<ProviderError>) {
        self.lock().id_token_error = error;
    }

    pub fn set_id_token(&self, token: impl Into<String>) {
        self.lock().id_token = token.into();
    }

    pub fn set_access_token(&self, token: Option<String>) {
        self.lock().access_token = token;
    }

    pub fn persistence(&self) -> Option<Persistence> {
        self.lock().persistence
    }

    pub fn popup_calls(&self) -> usize {
        self.popup_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// 推送一次状态变化（模拟其他标签页登出、token 失效等）
    pub fn emit(&self, identity: Option<Identity>) {
        self.lock().current = identity.clone();
        self.notify(identity);
    }

    fn notify(&self, identity: Option<Identity>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(identity.clone()).is_ok());
        debug!(
            "[Provider] 推送身份状态: {}（订阅者: {}）",
            identity.as_ref().map(|i| i.uid.as_str()).unwrap_or("未登录"),
            subscribers.len()
        );
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn initialize(&self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        if let Some(e) = self.lock().init_error.clone() {
            return Err(e);
        }
        info!(
            "[Provider] 身份提供方已初始化，scopes: {}",
            settings.scopes.join(" ")
        );
        Ok(())
    }

    async fn set_persistence(&self, persistence: Persistence) -> Result<(), ProviderError> {
        let mut state = self.lock();
        if state.rejected_persistence.contains(&persistence) {
            return Err(ProviderError::FailedPersistence(format!(
                "{:?} persistence unavailable",
                persistence
            )));
        }
        state.persistence = Some(persistence);
        Ok(())
    }

    fn subscribe(&self) -> IdentityReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.lock().current.clone();
        // 订阅即推送当前状态；接收端已在手里，发送不会失败
        let _ = tx.send(current);
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    fn current_identity(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    async fn sign_in_with_popup(&self) -> Result<SignInResult, ProviderError> {
        self.popup_calls.fetch_add(1, Ordering::SeqCst);
        let result = {
            let mut state = self.lock();
            if let Some(e) = state.popup_error.clone() {
                return Err(e);
            }
            state.current = Some(state.account.clone());
            SignInResult {
                identity: state.account.clone(),
                access_token: state.access_token.clone(),
            }
        };
        self.notify(Some(result.identity.clone()));
        Ok(result)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let was_signed_in = {
            let mut state = self.lock();
            if let Some(e) = state.sign_out_error.clone() {
                return Err(e);
            }
            state.current.take().is_some()
        };
        if was_signed_in {
            self.notify(None);
        }
        Ok(())
    }

    async fn id_token(
        &self,
        identity: &Identity,
        _force_refresh: bool,
    ) -> Result<String, ProviderError> {
        let state = self.lock();
        if let Some(e) = state.id_token_error.clone() {
            return Err(e);
        }
        if state.current.as_ref().map(|c| c.uid.as_str()) != Some(identity.uid.as_str()) {
            return Err(ProviderError::Internal {
                code: "auth/user-token-expired".to_string(),
                message: format!("no active session for {}", identity.uid),
            });
        }
        Ok(state.id_token.clone())
    }
}
