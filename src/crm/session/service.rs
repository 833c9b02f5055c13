//! 会话协调器
//!
//! 登录/登出的唯一入口，同时响应身份提供方推送的状态变化：
//! 更新 token 存储与 cookie、安装认证拦截器、启动同步轮询，
//! 并把所有失败交给错误分类器决定是否展示。

use crate::crm::backend::{CrmBackend, HttpBackend};
use crate::crm::classifier::{Classification, ErrorClassifier};
use crate::crm::config::{ClientConfig, ERROR_DISPLAY_WINDOW};
use crate::crm::error::{AuthError, SyncError};
use crate::crm::provider::{Identity, IdentityProvider, IdentityReceiver, Persistence, ProviderSettings};
use crate::crm::session::listener::{AuthEvent, SessionView};
use crate::crm::session::models::{CoordinatorState, ReadyState, Session};
use crate::crm::sync::{BackgroundSyncMonitor, ManualSync, SyncView};
use crate::crm::token::{RequestInterceptor, TokenStore};
use anyhow::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 加载指示器守卫：创建时显示，离开作用域时隐藏（包括出错返回）
struct LoadingGuard {
    view: Arc<dyn SessionView>,
}

impl LoadingGuard {
    fn show(view: &Arc<dyn SessionView>) -> Self {
        view.set_loading(true);
        Self {
            view: Arc::clone(view),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.view.set_loading(false);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 会话协调器
pub struct SessionCoordinator {
    config: ClientConfig,
    provider: Arc<dyn IdentityProvider>,
    view: Arc<dyn SessionView>,
    classifier: ErrorClassifier,
    tokens: TokenStore,
    interceptor: Arc<RequestInterceptor>,
    backend: Arc<dyn CrmBackend>,
    sync: Arc<BackgroundSyncMonitor>,
    session: Mutex<Session>,
    state: Mutex<CoordinatorState>,
    persistence: Mutex<Option<Persistence>>,
    events: broadcast::Sender<AuthEvent>,
    /// 错误横幅代数，新的横幅会让旧的自动隐藏失效
    error_generation: Arc<AtomicU64>,
    /// 登录、登出和身份通知处理互斥执行
    transition: tokio::sync::Mutex<()>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCoordinator {
    /// 创建协调器，后端请求走真实 HTTP 客户端
    pub fn new(
        config: ClientConfig,
        provider: Arc<dyn IdentityProvider>,
        view: Arc<dyn SessionView>,
        sync_view: Arc<dyn SyncView>,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建 HTTP 客户端失败")?;
        let tokens = TokenStore::with_cookie_name(&config.cookie_name);
        let interceptor = Arc::new(RequestInterceptor::new(http_client, tokens.clone()));
        let backend: Arc<dyn CrmBackend> =
            Arc::new(HttpBackend::new(config.clone(), Arc::clone(&interceptor)));

        info!("[Auth] 创建会话协调器，后端地址: {}", config.api_base_url);
        Ok(Self::assemble(
            config,
            provider,
            view,
            sync_view,
            tokens,
            interceptor,
            backend,
        ))
    }

    /// 使用自定义后端创建协调器
    pub fn with_backend(
        config: ClientConfig,
        provider: Arc<dyn IdentityProvider>,
        view: Arc<dyn SessionView>,
        sync_view: Arc<dyn SyncView>,
        backend: Arc<dyn CrmBackend>,
    ) -> Self {
        let tokens = TokenStore::with_cookie_name(&config.cookie_name);
        let interceptor = Arc::new(RequestInterceptor::new(reqwest::Client::new(), tokens.clone()));
        Self::assemble(
            config,
            provider,
            view,
            sync_view,
            tokens,
            interceptor,
            backend,
        )
    }

    fn assemble(
        config: ClientConfig,
        provider: Arc<dyn IdentityProvider>,
        view: Arc<dyn SessionView>,
        sync_view: Arc<dyn SyncView>,
        tokens: TokenStore,
        interceptor: Arc<RequestInterceptor>,
        backend: Arc<dyn CrmBackend>,
    ) -> Self {
        let classifier = ErrorClassifier::new();
        let sync = Arc::new(BackgroundSyncMonitor::new(
            Arc::clone(&backend),
            tokens.clone(),
            sync_view,
            classifier,
        ));
        let (events, _) = broadcast::channel(16);
        Self {
            config,
            provider,
            view,
            classifier,
            tokens,
            interceptor,
            backend,
            sync,
            session: Mutex::new(Session::new()),
            state: Mutex::new(CoordinatorState::Uninitialized),
            persistence: Mutex::new(None),
            events,
            error_generation: Arc::new(AtomicU64::new(0)),
            transition: tokio::sync::Mutex::new(()),
            listener_task: Mutex::new(None),
        }
    }

    /// 初始化身份提供方并注册状态监听
    ///
    /// 初始化失败时回到 `Uninitialized` 并返回错误，不会自动重试。
    /// 持久化按 durable -> in-memory -> none 依次尝试，全部失败也不影响初始化。
    pub async fn initialize(self: &Arc<Self>) -> Result<(), AuthError> {
        {
            let mut state = lock(&self.state);
            if *state != CoordinatorState::Uninitialized {
                debug!("[Auth] 已初始化（当前状态 {:?}），跳过", *state);
                return Ok(());
            }
            *state = CoordinatorState::Initializing;
        }
        let _loading = LoadingGuard::show(&self.view);
        info!("[Auth] 🚀 初始化身份提供方...");

        let settings = ProviderSettings::from(&self.config);
        if let Err(e) = self.provider.initialize(&settings).await {
            *lock(&self.state) = CoordinatorState::Uninitialized;
            let err = AuthError::ProviderInit(e);
            error!("[Auth] ❌ 身份提供方初始化失败: {}", err);
            self.handle_error(&err);
            return Err(err);
        }

        let persistence = self.establish_persistence().await;
        *lock(&self.persistence) = Some(persistence);

        let receiver = self.provider.subscribe();
        *lock(&self.state) = CoordinatorState::Ready(ReadyState::SignedOut);
        self.spawn_listener(receiver);

        let _ = self.events.send(AuthEvent::Ready);
        info!("[Auth] ✅ 身份提供方已就绪，持久化级别: {:?}", persistence);
        Ok(())
    }

    async fn establish_persistence(&self) -> Persistence {
        let mut last_error = None;
        for level in [Persistence::Durable, Persistence::InMemory] {
            match self.provider.set_persistence(level).await {
                Ok(()) => return level,
                Err(e) => {
                    warn!("[Auth] ⚠️ {:?} 持久化不可用，尝试降级: {}", level, e);
                    last_error = Some(e);
                }
            }
        }

        if let Err(e) = self.provider.set_persistence(Persistence::None).await {
            warn!("[Auth] ⚠️ 无法关闭持久化: {}", e);
        }
        let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!("[Auth] ⚠️ 登录状态无法持久化，刷新页面后需要重新登录");
        self.handle_error(&AuthError::StorageRestricted(detail));
        Persistence::None
    }

    /// 按提供方推送顺序逐个处理身份状态变化
    fn spawn_listener(self: &Arc<Self>, mut receiver: IdentityReceiver) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(identity) = receiver.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                // 判断和处理在同一次互斥内完成，登录流程不会插在中间
                let _transition = coordinator.transition.lock().await;
                // 已被更新的状态覆盖的通知直接跳过（例如登录前强制登出产生的 None）
                let current = coordinator.provider.current_identity();
                let stale = match (&identity, &current) {
                    (None, Some(_)) => true,
                    (Some(_), None) => true,
                    (Some(pushed), Some(current)) => pushed.uid != current.uid,
                    (None, None) => false,
                };
                if stale {
                    debug!("[Auth] 跳过过期的身份状态通知");
                    continue;
                }
                coordinator.on_identity_state_change(identity).await;
            }
            debug!("[Auth] 身份状态监听结束");
        });

        if let Some(previous) = lock(&self.listener_task).replace(handle) {
            previous.abort();
        }
    }

    /// 交互式登录
    ///
    /// 成功后如果当前在公共入口页则跳转到登录后的落地页。
    /// 失败会经过 [`Self::handle_error`] 展示，并原样返回。
    pub async fn sign_in(self: &Arc<Self>) -> Result<Identity, AuthError> {
        {
            let mut session = lock(&self.session);
            session.initial_load = false;
            session.auth_attempted = true;
        }
        let _loading = LoadingGuard::show(&self.view);
        let _transition = self.transition.lock().await;

        match self.run_sign_in().await {
            Ok(identity) => {
                info!("[Auth] ✅ 登录成功，用户ID: {}", identity.uid);
                self.start_delegated_services();
                let path = self.view.current_path();
                if self.config.is_public_entry(&path) {
                    self.view.navigate(&self.config.landing_path);
                }
                Ok(identity)
            }
            Err(e) => {
                error!("[Auth] ❌ 登录失败: {}", e);
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    async fn run_sign_in(&self) -> Result<Identity, AuthError> {
        info!("[Auth] 🔐 开始交互式登录");

        // 先登出，保证每次都走完整的授权流程，不复用上一个账号的会话
        let was_signed_in = lock(&self.session).signed_in;
        if let Err(e) = self.provider.sign_out().await {
            warn!("[Auth] ⚠️ 登录前强制登出失败，继续登录: {}", e);
        }
        if was_signed_in {
            self.clear_local_session();
        }

        let result = self.provider.sign_in_with_popup().await?;
        let Some(access_token) = result.access_token.filter(|t| !t.is_empty()) else {
            return Err(AuthError::NoAccessToken);
        };

        self.tokens.set_delegated_token(access_token.clone());
        lock(&self.session).delegated_access_token = Some(access_token);

        let identity = result.identity;
        let id_token = self.provider.id_token(&identity, false).await?;
        self.tokens.set_identity_token(id_token.clone());
        self.tokens.set_user_id(identity.uid.clone());
        {
            let mut session = lock(&self.session);
            session.user_id = Some(identity.uid.clone());
            session.display_name = identity.display_name.clone();
            session.identity_token = Some(id_token);
        }
        Ok(identity)
    }

    /// 登出
    ///
    /// 先清空本地 token 和 cookie，再调用提供方登出；提供方登出失败时本地也
    /// 不会保留任何认证状态。无论成功与否都跳转到登出页。
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _loading = LoadingGuard::show(&self.view);
        let _transition = self.transition.lock().await;
        info!("[Auth] 🚪 用户登出");

        self.clear_local_session();
        let result = self.provider.sign_out().await.map_err(AuthError::from);
        self.view.navigate(&self.config.sign_out_path);

        if let Err(e) = &result {
            error!("[Auth] ❌ 提供方登出失败（本地状态已清除）: {}", e);
            self.handle_error(e);
        }
        result
    }

    /// 清除会话、token、cookie 和同步状态
    fn clear_local_session(&self) {
        lock(&self.session).clear_identity();
        self.tokens.clear();
        self.sync.stop_polling();
        self.sync.reset();
        {
            let mut state = lock(&self.state);
            if let CoordinatorState::Ready(_) = *state {
                *state = CoordinatorState::Ready(ReadyState::SignedOut);
            }
        }
        self.view.show_signed_out();
        self.view.reset_navigation();
    }

    /// 身份状态变化处理（初始加载、跨标签页变化、token 失效都会触发）
    pub async fn on_identity_state_change(self: &Arc<Self>, identity: Option<Identity>) {
        match identity {
            Some(identity) => self.on_signed_in(identity).await,
            None => {
                info!("[Auth] 身份状态变化: 未登录");
                self.clear_local_session();
            }
        }
    }

    async fn on_signed_in(self: &Arc<Self>, identity: Identity) {
        info!("[Auth] 身份状态变化: 已登录，用户ID: {}", identity.uid);
        let switched = lock(&self.session)
            .user_id
            .as_deref()
            .is_some_and(|uid| uid != identity.uid);
        if switched {
            // 换了账号：上一个账号的委托 token 和同步状态都不能沿用
            info!("[Auth] 🔄 检测到账号切换，先清除上一个账号的本地会话");
            self.clear_local_session();
        }
        self.tokens.set_user_id(identity.uid.clone());
        {
            let mut session = lock(&self.session);
            session.user_id = Some(identity.uid.clone());
            session.display_name = identity.display_name.clone();
        }
        self.view.show_signed_in(&identity);

        let id_token = match self.provider.id_token(&identity, true).await {
            Ok(token) => token,
            Err(e) => {
                // 刷新失败不登出用户，保留已有 token
                let err = AuthError::TokenRefresh(e);
                warn!("[Auth] ⚠️ 刷新身份 token 失败: {}", err);
                self.handle_error(&err);
                return;
            }
        };
        self.tokens.set_identity_token(id_token.clone());
        debug!("[Auth] 身份 token 已刷新（长度: {}）", id_token.len());
        {
            let mut session = lock(&self.session);
            session.identity_token = Some(id_token);
            session.signed_in = true;
        }
        *lock(&self.state) = CoordinatorState::Ready(ReadyState::SignedIn);

        self.interceptor.install();
        self.sync.start_polling();
        self.start_delegated_services();
    }

    /// 委托 token 可用时上传给服务端并触发一次手动同步（每次登录只执行一次）
    fn start_delegated_services(self: &Arc<Self>) {
        let (identity_token, delegated_token) = {
            let mut session = lock(&self.session);
            if !session.signed_in || session.delegated_started {
                return;
            }
            let Some(identity_token) = session.identity_token.clone() else {
                return;
            };
            let Some(delegated_token) = self.tokens.delegated_token() else {
                debug!("[Auth] 没有委托 token，跳过邮件同步");
                return;
            };
            session.delegated_access_token = Some(delegated_token.clone());
            session.delegated_started = true;
            (identity_token, delegated_token)
        };

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            match backend.store_token(&identity_token, &delegated_token).await {
                Ok(resp) if resp.success => info!("[Auth] ✅ 委托 token 已上传"),
                Ok(resp) => warn!(
                    "[Auth] ⚠️ 委托 token 上传被拒绝: {}",
                    resp.message.as_deref().unwrap_or("-")
                ),
                Err(e) => warn!("[Auth] ⚠️ 委托 token 上传失败: {:?}", e),
            }
        });

        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            match sync.trigger_manual().await {
                Ok(ManualSync::Completed(result)) if result.is_success() => {
                    info!("[Auth] ✅ 登录后手动同步完成")
                }
                Ok(ManualSync::Completed(result)) => {
                    warn!("[Auth] ⚠️ 登录后手动同步失败: {:?}", result)
                }
                Ok(ManualSync::AlreadyRunning) => debug!("[Auth] 手动同步已在运行"),
                Err(e @ SyncError::MissingCredentials { .. }) => {
                    warn!("[Auth] ⚠️ 无法触发手动同步: {}", e)
                }
                Err(e) => warn!("[Auth] ⚠️ 手动同步失败: {}", e),
            }
        });
    }

    /// 错误处理：分类、决定是否压制、展示并广播
    ///
    /// 横幅在展示窗口结束后自动隐藏，前提是期间没有新的横幅。
    pub fn handle_error(&self, error: &AuthError) -> Classification {
        let ctx = lock(&self.session).suppression();
        let classification = self.classifier.classify(error, ctx);
        if classification.suppress {
            debug!(
                "[Auth] 压制错误（初始加载: {}, 已尝试登录: {}）: {}",
                ctx.initial_load, ctx.auth_attempted, error
            );
            return classification;
        }

        self.view.show_error(&classification.message);
        let _ = self.events.send(AuthEvent::Error {
            message: classification.message.clone(),
        });

        let generation = self.error_generation.fetch_add(1, Ordering::SeqCst) + 1;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let view = Arc::clone(&self.view);
                let current = Arc::clone(&self.error_generation);
                runtime.spawn(async move {
                    tokio::time::sleep(ERROR_DISPLAY_WINDOW).await;
                    if current.load(Ordering::SeqCst) == generation {
                        view.hide_error();
                    }
                });
            }
            Err(_) => warn!("[Auth] 没有运行中的 tokio runtime，错误横幅不会自动隐藏"),
        }
        classification
    }

    /// 订阅认证事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 身份提供方接受的持久化级别（初始化前为 None）
    pub fn persistence(&self) -> Option<Persistence> {
        *lock(&self.persistence)
    }

    /// 当前会话的副本
    pub fn session(&self) -> Session {
        lock(&self.session).clone()
    }

    pub fn state(&self) -> CoordinatorState {
        *lock(&self.state)
    }

    pub fn is_signed_in(&self) -> bool {
        lock(&self.session).signed_in
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn interceptor(&self) -> &Arc<RequestInterceptor> {
        &self.interceptor
    }

    pub fn sync(&self) -> &Arc<BackgroundSyncMonitor> {
        &self.sync
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.listener_task).take() {
            task.abort();
        }
    }
}
