//! 单元测试共用的假实现与记录型视图

use crate::crm::backend::CrmBackend;
use crate::crm::error::SyncError;
use crate::crm::provider::Identity;
use crate::crm::session::SessionView;
use crate::crm::sync::SyncView;
use crate::crm::types::{
    ForceSyncResp, StatusCredentials, StoreTokenResp, SyncCredentials, SyncStatusResp,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use tokio::sync::Notify;

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,mobilize_session_core=debug,hyper_util::client=info,reqwest=info");

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

/// 可控的后端
pub struct FakeBackend {
    statuses: Mutex<VecDeque<Result<SyncStatusResp, SyncError>>>,
    force_response: Mutex<Result<ForceSyncResp, SyncError>>,
    status_calls: AtomicUsize,
    force_calls: AtomicUsize,
    hold_force: AtomicBool,
    /// 每次收到手动同步请求时通知
    pub force_started: Notify,
    release_force: Notify,
    stored_tokens: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            force_response: Mutex::new(Ok(ForceSyncResp {
                success: true,
                message: Some("Synced 2 emails".to_string()),
                synced_count: Some(2),
            })),
            status_calls: AtomicUsize::new(0),
            force_calls: AtomicUsize::new(0),
            hold_force: AtomicBool::new(false),
            force_started: Notify::new(),
            release_force: Notify::new(),
            stored_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn push_status(&self, status: Result<SyncStatusResp, SyncError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn set_force_response(&self, response: Result<ForceSyncResp, SyncError>) {
        *self.force_response.lock().unwrap() = response;
    }

    /// 让下一次手动同步请求挂起，直到 `release_force_sync`
    pub fn hold_force_sync(&self) {
        self.hold_force.store(true, Ordering::SeqCst);
    }

    pub fn release_force_sync(&self) {
        self.hold_force.store(false, Ordering::SeqCst);
        self.release_force.notify_one();
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn force_calls(&self) -> usize {
        self.force_calls.load(Ordering::SeqCst)
    }

    pub fn stored_tokens(&self) -> Vec<(String, String)> {
        self.stored_tokens.lock().unwrap().clone()
    }
}

pub fn status(sync_in_progress: bool, manual_sync_in_progress: bool) -> SyncStatusResp {
    SyncStatusResp {
        success: true,
        sync_in_progress,
        manual_sync_in_progress,
        ..Default::default()
    }
}

#[async_trait]
impl CrmBackend for FakeBackend {
    async fn sync_status(&self, _creds: &StatusCredentials) -> Result<SyncStatusResp, SyncError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(status(false, false)))
    }

    async fn force_sync_emails(&self, _creds: &SyncCredentials) -> Result<ForceSyncResp, SyncError> {
        self.force_calls.fetch_add(1, Ordering::SeqCst);
        self.force_started.notify_one();
        if self.hold_force.load(Ordering::SeqCst) {
            self.release_force.notified().await;
        }
        let response = self.force_response.lock().unwrap().clone();
        response
    }

    async fn store_token(
        &self,
        identity_token: &str,
        delegated_token: &str,
    ) -> anyhow::Result<StoreTokenResp> {
        self.stored_tokens
            .lock()
            .unwrap()
            .push((identity_token.to_string(), delegated_token.to_string()));
        Ok(StoreTokenResp {
            success: true,
            message: None,
        })
    }
}

/// 记录同步指示器变化
#[derive(Default)]
pub struct RecordingSyncView {
    indicator: AtomicBool,
    status: Mutex<Option<String>>,
    history: Mutex<Vec<String>>,
}

impl RecordingSyncView {
    pub fn indicator_visible(&self) -> bool {
        self.indicator.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().unwrap().clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl SyncView for RecordingSyncView {
    fn show_indicator(&self) {
        self.indicator.store(true, Ordering::SeqCst);
    }

    fn hide_indicator(&self) {
        self.indicator.store(false, Ordering::SeqCst);
    }

    fn show_status(&self, text: &str) {
        *self.status.lock().unwrap() = Some(text.to_string());
        self.history.lock().unwrap().push(text.to_string());
    }

    fn hide_status(&self) {
        *self.status.lock().unwrap() = None;
    }
}

/// 记录会话视图变化
pub struct RecordingSessionView {
    path: Mutex<String>,
    loading: Mutex<Vec<bool>>,
    error: Mutex<Option<String>>,
    errors_shown: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    signed_in_as: Mutex<Option<Identity>>,
    signed_out_renders: AtomicUsize,
}

impl RecordingSessionView {
    pub fn at(path: &str) -> Self {
        Self {
            path: Mutex::new(path.to_string()),
            loading: Mutex::new(Vec::new()),
            error: Mutex::new(None),
            errors_shown: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            signed_in_as: Mutex::new(None),
            signed_out_renders: AtomicUsize::new(0),
        }
    }

    pub fn loading_history(&self) -> Vec<bool> {
        self.loading.lock().unwrap().clone()
    }

    pub fn loading_visible(&self) -> bool {
        self.loading.lock().unwrap().last().copied().unwrap_or(false)
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    pub fn errors_shown(&self) -> Vec<String> {
        self.errors_shown.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn signed_in_as(&self) -> Option<Identity> {
        self.signed_in_as.lock().unwrap().clone()
    }

    pub fn signed_out_renders(&self) -> usize {
        self.signed_out_renders.load(Ordering::SeqCst)
    }
}

impl SessionView for RecordingSessionView {
    fn set_loading(&self, visible: bool) {
        self.loading.lock().unwrap().push(visible);
    }

    fn show_signed_in(&self, identity: &Identity) {
        *self.signed_in_as.lock().unwrap() = Some(identity.clone());
    }

    fn show_signed_out(&self) {
        *self.signed_in_as.lock().unwrap() = None;
        self.signed_out_renders.fetch_add(1, Ordering::SeqCst);
    }

    fn show_error(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
        self.errors_shown.lock().unwrap().push(message.to_string());
    }

    fn hide_error(&self) {
        *self.error.lock().unwrap() = None;
    }

    fn current_path(&self) -> String {
        self.path.lock().unwrap().clone()
    }

    fn navigate(&self, path: &str) {
        *self.path.lock().unwrap() = path.to_string();
        self.navigations.lock().unwrap().push(path.to_string());
    }
}
