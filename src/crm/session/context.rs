//! 会话上下文
//!
//! 每个进程只构造一次协调器，之后的获取都复用同一个实例。
//! 协作模块通过显式传入的上下文拿到协调器，而不是读取全局变量。

use crate::crm::session::service::SessionCoordinator;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// 协调器的持有者（构造一次，之后复用）
#[derive(Default)]
pub struct SessionContext {
    coordinator: OnceLock<Arc<SessionCoordinator>>,
}

static GLOBAL_CONTEXT: SessionContext = SessionContext::new();

impl SessionContext {
    pub const fn new() -> Self {
        Self {
            coordinator: OnceLock::new(),
        }
    }

    /// 进程级上下文
    pub fn global() -> &'static SessionContext {
        &GLOBAL_CONTEXT
    }

    /// 获取协调器，不存在时用 `build` 构造
    ///
    /// `build` 只会在第一次获取时调用。
    pub fn acquire<F>(&self, build: F) -> Arc<SessionCoordinator>
    where
        F: FnOnce() -> SessionCoordinator,
    {
        Arc::clone(self.coordinator.get_or_init(|| Arc::new(build())))
    }

    /// 可失败的构造；构造失败时上下文保持为空，下次获取会重新构造
    pub fn try_acquire<F, E>(&self, build: F) -> Result<Arc<SessionCoordinator>, E>
    where
        F: FnOnce() -> Result<SessionCoordinator, E>,
    {
        if let Some(existing) = self.coordinator.get() {
            return Ok(Arc::clone(existing));
        }
        let built = Arc::new(build()?);
        // 并发构造时以先写入的为准
        if self.coordinator.set(Arc::clone(&built)).is_err() {
            debug!("[Auth] 协调器已由其他调用方创建，丢弃本次构造");
        }
        Ok(self.get().unwrap_or(built))
    }

    pub fn get(&self) -> Option<Arc<SessionCoordinator>> {
        self.coordinator.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::config::ClientConfig;
    use crate::crm::provider::{Identity, StaticIdentityProvider};
    use crate::crm::session::EmptySessionView;
    use crate::crm::sync::EmptySyncView;
    use crate::crm::testing::FakeBackend;

    fn build() -> SessionCoordinator {
        SessionCoordinator::with_backend(
            ClientConfig::default(),
            Arc::new(StaticIdentityProvider::new(Identity::new("u1"), "idtok1", None)),
            Arc::new(EmptySessionView),
            Arc::new(EmptySyncView),
            Arc::new(FakeBackend::new()),
        )
    }

    #[tokio::test]
    async fn acquire_builds_once_and_reuses() {
        let context = SessionContext::new();
        assert!(context.get().is_none());

        let first = context.acquire(build);
        let second = context.acquire(|| panic!("must not build twice"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_build_leaves_context_empty() {
        let context = SessionContext::new();
        let err = context
            .try_acquire(|| Err::<SessionCoordinator, _>("boom"))
            .err();
        assert_eq!(err, Some("boom"));
        assert!(context.get().is_none());

        let built = context.try_acquire(|| Ok::<_, &str>(build())).unwrap();
        assert!(Arc::ptr_eq(&built, &context.get().unwrap()));
    }
}
