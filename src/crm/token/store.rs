//! 进程内 token 存储
//!
//! 保存身份 token、委托 token 与用户 ID，并同步写入两条通道：
//! - 跨请求通道：共享的内存状态，拦截器在发请求时读取
//! - 同源 cookie：整页刷新时服务端也能拿到身份 token
//!
//! 两条通道在同一把锁内更新，并发开始的请求不会看到只更新了一半的状态。

use crate::crm::config::TOKEN_COOKIE_NAME;
use cookie::{Cookie, SameSite};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::{debug, info};

/// 当前 token 的只读副本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub identity_token: Option<String>,
    pub delegated_token: Option<String>,
    pub user_id: Option<String>,
}

/// cookie 通道的状态
#[derive(Debug, Clone, Default)]
enum CookieChannel {
    #[default]
    Unset,
    Active(Cookie<'static>),
    /// 登出后写入的立即过期 cookie
    Expired(Cookie<'static>),
}

#[derive(Debug, Default)]
struct TokenState {
    identity: Option<String>,
    delegated: Option<String>,
    user_id: Option<String>,
    cookie: CookieChannel,
}

/// token 存储（可廉价克隆，克隆体共享同一份状态）
#[derive(Clone, Debug)]
pub struct TokenStore {
    cookie_name: Arc<str>,
    state: Arc<Mutex<TokenState>>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self::with_cookie_name(TOKEN_COOKIE_NAME)
    }

    pub fn with_cookie_name(cookie_name: &str) -> Self {
        Self {
            cookie_name: Arc::from(cookie_name),
            state: Arc::new(Mutex::new(TokenState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 写入身份 token，同时刷新 cookie
    pub fn set_identity_token(&self, token: impl Into<String>) {
        let token = token.into();
        let cookie = Cookie::build((self.cookie_name.to_string(), token.clone()))
            .path("/")
            .same_site(SameSite::Strict)
            .build();

        let mut state = self.lock();
        state.identity = Some(token);
        state.cookie = CookieChannel::Active(cookie);
        debug!(
            "[Token] 身份 token 已更新（长度: {}），cookie 已同步",
            state.identity.as_ref().map(String::len).unwrap_or(0)
        );
    }

    /// 写入委托 token（第三方 API 使用）
    pub fn set_delegated_token(&self, token: impl Into<String>) {
        let mut state = self.lock();
        state.delegated = Some(token.into());
        debug!("[Token] 委托 token 已更新");
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.lock().user_id = Some(user_id.into());
    }

    /// 清空所有 token，并写入立即过期的 cookie
    pub fn clear(&self) {
        let expired = Cookie::build((self.cookie_name.to_string(), ""))
            .path("/")
            .expires(OffsetDateTime::UNIX_EPOCH)
            .build();

        let mut state = self.lock();
        state.identity = None;
        state.delegated = None;
        state.user_id = None;
        state.cookie = CookieChannel::Expired(expired);
        info!("[Token] 🧹 已清空身份 token、委托 token 和 cookie");
    }

    /// 当前 token 的副本（每个字段原子读取）
    pub fn current(&self) -> TokenSnapshot {
        let state = self.lock();
        TokenSnapshot {
            identity_token: state.identity.clone(),
            delegated_token: state.delegated.clone(),
            user_id: state.user_id.clone(),
        }
    }

    /// 用快照恢复（例如从本地持久化加载）
    pub fn restore(&self, snapshot: TokenSnapshot) {
        if let Some(token) = snapshot.identity_token {
            self.set_identity_token(token);
        }
        if let Some(token) = snapshot.delegated_token {
            self.set_delegated_token(token);
        }
        if let Some(user_id) = snapshot.user_id {
            self.set_user_id(user_id);
        }
    }

    pub fn identity_token(&self) -> Option<String> {
        self.lock().identity.clone()
    }

    pub fn delegated_token(&self) -> Option<String> {
        self.lock().delegated.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.lock().user_id.clone()
    }

    /// 当前有效的身份 cookie（未设置或已过期时为 None）
    pub fn cookie(&self) -> Option<Cookie<'static>> {
        match &self.lock().cookie {
            CookieChannel::Active(cookie) => Some(cookie.clone()),
            CookieChannel::Unset | CookieChannel::Expired(_) => None,
        }
    }

    /// 最近一次写入的 `Set-Cookie` 字符串（包括过期 cookie）
    pub fn set_cookie_header(&self) -> Option<String> {
        match &self.lock().cookie {
            CookieChannel::Active(cookie) | CookieChannel::Expired(cookie) => {
                Some(cookie.to_string())
            }
            CookieChannel::Unset => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_token_and_cookie_move_together() {
        let store = TokenStore::new();
        store.set_identity_token("idtok1");

        assert_eq!(store.identity_token().as_deref(), Some("idtok1"));
        let cookie = store.cookie().expect("cookie should be set");
        assert_eq!(cookie.name(), "firebase_token");
        assert_eq!(cookie.value(), "idtok1");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));

        store.set_identity_token("idtok2");
        assert_eq!(store.cookie().map(|c| c.value().to_string()).as_deref(), Some("idtok2"));
    }

    #[test]
    fn clear_expires_cookie_and_drops_tokens() {
        let store = TokenStore::new();
        store.set_identity_token("idtok1");
        store.set_delegated_token("ya29.token");
        store.set_user_id("u1");

        store.clear();

        assert_eq!(store.current(), TokenSnapshot::default());
        assert!(store.cookie().is_none());
        let header = store.set_cookie_header().expect("expired cookie is written");
        assert!(header.starts_with("firebase_token="));
        assert!(header.contains("1970"));
    }

    #[test]
    fn clones_share_state() {
        let store = TokenStore::new();
        let reader = store.clone();
        store.set_delegated_token("ya29.token");
        assert_eq!(reader.delegated_token().as_deref(), Some("ya29.token"));
    }

    #[test]
    fn restore_repopulates_every_channel() {
        let store = TokenStore::new();
        store.restore(TokenSnapshot {
            identity_token: Some("idtok1".into()),
            delegated_token: Some("ya29.token".into()),
            user_id: Some("u1".into()),
        });
        assert_eq!(store.user_id().as_deref(), Some("u1"));
        assert_eq!(store.cookie().map(|c| c.value().to_string()).as_deref(), Some("idtok1"));
    }
}
