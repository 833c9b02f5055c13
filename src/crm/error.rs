//! 各组件的错误类型
//!
//! 每个组件一个封闭枚举，由 [`crate::crm::classifier::ErrorClassifier`] 穷举匹配。

/// 身份提供方 SDK 返回的错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// 用户关闭了登录弹窗
    #[error("popup closed by user")]
    PopupClosedByUser,
    /// 浏览器拦截了登录弹窗
    #[error("popup blocked by the browser")]
    PopupBlocked,
    /// 当前域名未在身份提供方处授权
    #[error("domain not authorized for OAuth operations")]
    UnauthorizedDomain,
    /// 无法持久化登录状态
    #[error("failed to persist auth state: {0}")]
    FailedPersistence(String),
    /// 存储受限（隐私模式、第三方上下文等）
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// 网络错误
    #[error("network error: {0}")]
    Network(String),
    /// 其他提供方内部错误
    #[error("provider error ({code}): {message}")]
    Internal { code: String, message: String },
}

/// 会话协调器对外暴露的错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// 身份提供方初始化失败（不自动重试）
    #[error("identity provider initialization failed: {0}")]
    ProviderInit(ProviderError),
    #[error("sign-in was cancelled")]
    PopupCancelled,
    #[error("sign-in popup was blocked")]
    PopupBlocked,
    #[error("domain is not authorized for OAuth operations")]
    UnauthorizedDomain,
    /// 交互式登录完成，但没有拿到委托 token
    #[error("no access token received from Google authentication")]
    NoAccessToken,
    /// 登录状态无法持久化
    #[error("unable to persist login state: {0}")]
    PersistenceFailed(String),
    /// 存储受限，降级为仅会话级持久化
    #[error("storage access is restricted: {0}")]
    StorageRestricted(String),
    /// 刷新身份 token 失败
    #[error("identity token refresh failed: {0}")]
    TokenRefresh(ProviderError),
    /// 其他身份提供方错误
    #[error("provider failure: {0}")]
    Provider(ProviderError),
    /// 联系人等委托功能失败
    #[error("{0}")]
    Contacts(String),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<ProviderError> for AuthError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::PopupClosedByUser => Self::PopupCancelled,
            ProviderError::PopupBlocked => Self::PopupBlocked,
            ProviderError::UnauthorizedDomain => Self::UnauthorizedDomain,
            ProviderError::FailedPersistence(detail) => Self::PersistenceFailed(detail),
            ProviderError::StorageUnavailable(detail) => Self::StorageRestricted(detail),
            other => Self::Provider(other),
        }
    }
}

impl AuthError {
    /// 是否属于身份提供方内部错误（未主动登录前这类错误不展示）
    pub fn is_provider_related(&self) -> bool {
        matches!(
            self,
            Self::ProviderInit(_) | Self::Provider(_) | Self::TokenRefresh(_)
        )
    }
}

/// 邮件同步相关错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// 本地缺少手动同步所需的凭据（调用前检查，不是网络错误）
    #[error("missing credentials for email sync: {missing}")]
    MissingCredentials { missing: &'static str },
    /// 同步接口返回错误或响应格式不正确
    #[error("{0}")]
    Endpoint(String),
}

/// 联系人接口错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactsError {
    #[error("Please sign in to access contacts")]
    Unauthenticated,
    #[error("Google authentication required")]
    MissingAccessToken,
    #[error("Please grant access to your Google contacts")]
    PermissionDenied,
    #[error("Error: {status} - {message}")]
    Http { status: u16, message: String },
    #[error("Failed to access contacts: {0}")]
    Request(String),
}

impl From<ContactsError> for AuthError {
    fn from(e: ContactsError) -> Self {
        Self::Contacts(e.to_string())
    }
}
