//! 错误分类：把内部错误映射为用户可读的提示，并决定是否压制展示

use crate::crm::error::{AuthError, ProviderError, SyncError};

/// 无法归类时的通用提示
pub const GENERIC_AUTH_MESSAGE: &str = "An error occurred during authentication.";

/// 决定是否压制错误所需的会话状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressionContext {
    /// 是否仍处于初始加载窗口
    pub initial_load: bool,
    /// 用户是否已经主动发起过登录
    pub auth_attempted: bool,
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub message: String,
    pub suppress: bool,
}

/// 错误分类器（纯函数，无状态）
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 分类并给出压制决定
    pub fn classify(&self, error: &AuthError, ctx: SuppressionContext) -> Classification {
        let suppress =
            ctx.initial_load || (error.is_provider_related() && !ctx.auth_attempted);
        Classification {
            message: self.message(error),
            suppress,
        }
    }

    /// 错误对应的用户提示
    pub fn message(&self, error: &AuthError) -> String {
        match error {
            AuthError::PopupCancelled => "Sign-in was cancelled".to_string(),
            AuthError::PopupBlocked => {
                "Sign-in popup was blocked. Please allow popups for this site.".to_string()
            }
            AuthError::UnauthorizedDomain => {
                "This domain is not authorized for OAuth operations".to_string()
            }
            AuthError::NoAccessToken => {
                "No access token received from Google authentication".to_string()
            }
            AuthError::PersistenceFailed(_) => {
                "Unable to persist login state. You may need to sign in again after refreshing."
                    .to_string()
            }
            AuthError::StorageRestricted(_) => {
                "Storage access is limited in this context. Some features may be unavailable."
                    .to_string()
            }
            AuthError::Contacts(message) => message.clone(),
            AuthError::ProviderInit(_) | AuthError::TokenRefresh(_) => {
                "Google authentication failed. Please try again.".to_string()
            }
            AuthError::Provider(ProviderError::Internal { .. }) => GENERIC_AUTH_MESSAGE.to_string(),
            AuthError::Provider(_) => "Google authentication failed. Please try again.".to_string(),
            AuthError::Sync(e) => self.sync_failure_message(e),
        }
    }

    /// 同步状态栏使用的失败提示
    pub fn sync_failure_message(&self, error: &SyncError) -> String {
        match error {
            SyncError::Endpoint(detail) => sync_failed_text(detail),
            SyncError::MissingCredentials { .. } => sync_failed_text(&error.to_string()),
        }
    }
}

/// `Email sync failed: <detail>`，detail 为空时使用 `Unknown error`
pub fn sync_failed_text(detail: &str) -> String {
    let detail = if detail.trim().is_empty() {
        "Unknown error"
    } else {
        detail
    };
    format!("Email sync failed: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTEMPTED: SuppressionContext = SuppressionContext {
        initial_load: false,
        auth_attempted: true,
    };

    #[test]
    fn interactive_failures_have_specific_messages() {
        let c = ErrorClassifier::new();
        assert_eq!(c.message(&AuthError::PopupCancelled), "Sign-in was cancelled");
        assert_eq!(
            c.message(&AuthError::PopupBlocked),
            "Sign-in popup was blocked. Please allow popups for this site."
        );
        assert_eq!(
            c.message(&AuthError::UnauthorizedDomain),
            "This domain is not authorized for OAuth operations"
        );
        assert_eq!(
            c.message(&AuthError::StorageRestricted("iframe".into())),
            "Storage access is limited in this context. Some features may be unavailable."
        );
        assert_eq!(
            c.message(&AuthError::Contacts("Please sign in to access contacts".into())),
            "Please sign in to access contacts"
        );
        assert_eq!(
            c.message(&AuthError::Provider(ProviderError::Network("offline".into()))),
            "Google authentication failed. Please try again."
        );
    }

    #[test]
    fn unknown_provider_failure_falls_back_to_generic() {
        let err = AuthError::Provider(ProviderError::Internal {
            code: "auth/internal-error".into(),
            message: "boom".into(),
        });
        assert_eq!(ErrorClassifier::new().message(&err), GENERIC_AUTH_MESSAGE);
    }

    #[test]
    fn everything_is_suppressed_during_initial_load() {
        let ctx = SuppressionContext {
            initial_load: true,
            auth_attempted: true,
        };
        let c = ErrorClassifier::new().classify(&AuthError::PopupBlocked, ctx);
        assert!(c.suppress);
    }

    #[test]
    fn provider_failures_are_suppressed_until_an_attempt() {
        let err = AuthError::ProviderInit(ProviderError::Network("offline".into()));
        let before = ErrorClassifier::new().classify(&err, SuppressionContext::default());
        assert!(before.suppress);

        let after = ErrorClassifier::new().classify(&err, ATTEMPTED);
        assert!(!after.suppress);
    }

    #[test]
    fn non_provider_failures_show_without_an_attempt() {
        let c = ErrorClassifier::new()
            .classify(&AuthError::Contacts("x".into()), SuppressionContext::default());
        assert!(!c.suppress);
    }

    #[test]
    fn sync_failure_text_defaults_to_unknown_error() {
        assert_eq!(sync_failed_text(""), "Email sync failed: Unknown error");
        assert_eq!(
            ErrorClassifier::new().sync_failure_message(&SyncError::Endpoint("quota exceeded".into())),
            "Email sync failed: quota exceeded"
        );
    }
}
