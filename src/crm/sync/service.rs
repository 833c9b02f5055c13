//! 后台同步监视器
//!
//! 周期轮询服务端同步状态，并和用户/登录触发的手动同步对账。
//! 手动同步的 `Running{manual}` 只能由手动同步任务自己清除，轮询永远不会覆盖它。

use crate::crm::backend::CrmBackend;
use crate::crm::classifier::ErrorClassifier;
use crate::crm::config::{POLL_INTERVAL, SYNC_DISPLAY_WINDOW};
use crate::crm::error::SyncError;
use crate::crm::sync::listener::SyncView;
use crate::crm::sync::models::{
    ManualSync, ServerRunSummary, SyncOrigin, SyncPhase, SyncResult, SyncState, SYNCING_TEXT,
    SYNC_COMPLETE_TEXT,
};
use crate::crm::token::TokenStore;
use crate::crm::types::{StatusCredentials, SyncCredentials, SyncStatusResp};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 根据轮询结果推进同步阶段
///
/// - `Idle` 且服务端有任务在跑：进入 `Running{background}`
/// - `Running{background}` 且服务端两个标志都已清除：回到 `Idle`
/// - `Running{manual}` 不受轮询影响
fn reconcile(phase: SyncPhase, status: &SyncStatusResp) -> SyncPhase {
    let server_busy = status.sync_in_progress || status.manual_sync_in_progress;
    match phase {
        SyncPhase::Idle if server_busy => SyncPhase::Running(SyncOrigin::Background),
        SyncPhase::Running(SyncOrigin::Background) if !server_busy => SyncPhase::Idle,
        other => other,
    }
}

fn lock_state(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_task(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
}

/// 后台同步监视器
pub struct BackgroundSyncMonitor {
    backend: Arc<dyn CrmBackend>,
    tokens: TokenStore,
    view: Arc<dyn SyncView>,
    classifier: ErrorClassifier,
    state: Arc<Mutex<SyncState>>,
    /// 状态栏展示代数，新的展示会让旧的延迟隐藏失效
    display_generation: Arc<AtomicU64>,
    /// 会话代数，登出后在途请求的结果被丢弃
    session_epoch: AtomicU64,
    /// 轮询是否处于连续失败中，只在进入失败时提示一次
    poll_failing: AtomicBool,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    settle_task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundSyncMonitor {
    pub fn new(
        backend: Arc<dyn CrmBackend>,
        tokens: TokenStore,
        view: Arc<dyn SyncView>,
        classifier: ErrorClassifier,
    ) -> Self {
        Self {
            backend,
            tokens,
            view,
            classifier,
            state: Arc::new(Mutex::new(SyncState::default())),
            display_generation: Arc::new(AtomicU64::new(0)),
            session_epoch: AtomicU64::new(0),
            poll_failing: AtomicBool::new(false),
            poll_task: Mutex::new(None),
            settle_task: Mutex::new(None),
        }
    }

    /// 当前同步状态的副本
    pub fn state(&self) -> SyncState {
        lock_state(&self.state).clone()
    }

    /// 轮询一次服务端同步状态
    ///
    /// 接口失败不改动同步阶段，只在状态栏提示一次（连续失败不重复提示），
    /// 正在进行的手动同步占用状态栏时不提示。
    pub async fn poll(&self) -> Result<SyncPhase, SyncError> {
        let snapshot = self.tokens.current();
        let creds = match (snapshot.identity_token, snapshot.user_id) {
            (Some(identity_token), Some(user_id)) => StatusCredentials {
                identity_token,
                user_id,
            },
            (None, _) => {
                return Err(SyncError::MissingCredentials {
                    missing: "identity token",
                })
            }
            (_, None) => return Err(SyncError::MissingCredentials { missing: "user id" }),
        };

        let epoch = self.session_epoch.load(Ordering::SeqCst);
        let result = self.backend.sync_status(&creds).await;
        if self.session_epoch.load(Ordering::SeqCst) != epoch {
            debug!("[Sync] 会话已重置，丢弃过期的轮询结果");
            return result.map(|_| self.state().phase);
        }
        let status = match result {
            Ok(status) => {
                self.poll_failing.store(false, Ordering::SeqCst);
                status
            }
            Err(e) => {
                self.report_poll_failure(&e);
                return Err(e);
            }
        };

        let (before, after) = {
            let mut state = lock_state(&self.state);
            state.last_polled_at = Some(chrono::Utc::now());
            state.server_last_run = Some(ServerRunSummary {
                success: status.last_run_success,
                message: status.last_run_message.clone(),
                timestamp: status.last_run_timestamp.clone(),
            });
            let before = state.phase;
            state.phase = reconcile(before, &status);
            (before, state.phase)
        };

        debug!(
            "[Sync] 轮询结果 sync_in_progress={}, manual_sync_in_progress={}, 本地阶段 {:?} -> {:?}",
            status.sync_in_progress, status.manual_sync_in_progress, before, after
        );
        match (before, after) {
            (SyncPhase::Idle, SyncPhase::Running(_)) => {
                info!("[Sync] 🔄 检测到后台同步正在运行");
                self.view.show_indicator();
            }
            (SyncPhase::Running(_), SyncPhase::Idle) => {
                info!("[Sync] ✅ 后台同步已结束");
                self.view.hide_indicator();
            }
            _ => {}
        }
        Ok(after)
    }

    fn report_poll_failure(&self, error: &SyncError) {
        if self.poll_failing.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.state().phase == SyncPhase::Running(SyncOrigin::Manual) {
            debug!("[Sync] 手动同步占用状态栏，轮询失败只记录日志");
            return;
        }
        let generation = self.display_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.view
            .show_status(&self.classifier.sync_failure_message(error));
        self.schedule_settle(generation);
    }

    /// 手动触发一次邮件同步
    ///
    /// 凭据在请求前检查；已有手动同步在运行（包括结果展示窗口内）时直接返回
    /// [`ManualSync::AlreadyRunning`]，不会发出第二个请求。
    pub async fn trigger_manual(&self) -> Result<ManualSync, SyncError> {
        let snapshot = self.tokens.current();
        let Some(identity_token) = snapshot.identity_token else {
            warn!("[Sync] ⚠️ 缺少身份 token，无法手动同步");
            return Err(SyncError::MissingCredentials {
                missing: "identity token",
            });
        };
        let Some(delegated_token) = snapshot.delegated_token else {
            warn!("[Sync] ⚠️ 缺少委托 token，无法手动同步");
            return Err(SyncError::MissingCredentials {
                missing: "delegated access token",
            });
        };
        let Some(user_id) = snapshot.user_id else {
            warn!("[Sync] ⚠️ 缺少用户ID，无法手动同步");
            return Err(SyncError::MissingCredentials { missing: "user id" });
        };

        {
            let mut state = lock_state(&self.state);
            if state.phase == SyncPhase::Running(SyncOrigin::Manual) {
                debug!("[Sync] 手动同步已在运行，忽略本次触发");
                return Ok(ManualSync::AlreadyRunning);
            }
            state.phase = SyncPhase::Running(SyncOrigin::Manual);
        }

        let epoch = self.session_epoch.load(Ordering::SeqCst);
        let generation = self.display_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(settle) = take_task(&self.settle_task) {
            settle.abort();
        }

        info!("[Sync] 🚀 开始手动邮件同步，用户ID: {}", user_id);
        self.view.show_indicator();
        self.view.show_status(SYNCING_TEXT);

        let creds = SyncCredentials {
            identity_token,
            delegated_token,
            user_id,
        };
        let result = match self.backend.force_sync_emails(&creds).await {
            Ok(resp) if resp.success => SyncResult::Success {
                message: resp.message,
            },
            Ok(resp) => SyncResult::Failure {
                message: resp.message.unwrap_or_default(),
            },
            Err(e) => SyncResult::Failure {
                message: e.to_string(),
            },
        };

        if self.session_epoch.load(Ordering::SeqCst) != epoch {
            debug!("[Sync] 会话已重置，丢弃手动同步结果");
            return Ok(ManualSync::Completed(result));
        }

        let text = match &result {
            SyncResult::Success { message } => {
                info!(
                    "[Sync] ✅ 手动同步完成: {}",
                    message.as_deref().unwrap_or("-")
                );
                SYNC_COMPLETE_TEXT.to_string()
            }
            SyncResult::Failure { message } => {
                error!("[Sync] ❌ 手动同步失败: {}", message);
                self.classifier
                    .sync_failure_message(&SyncError::Endpoint(message.clone()))
            }
        };
        lock_state(&self.state).last_result = Some(result.clone());
        self.view.show_status(&text);
        self.schedule_settle(generation);

        Ok(ManualSync::Completed(result))
    }

    /// 展示窗口结束后隐藏状态栏，并结束这次手动同步
    fn schedule_settle(&self, generation: u64) {
        let state = Arc::clone(&self.state);
        let view = Arc::clone(&self.view);
        let current_generation = Arc::clone(&self.display_generation);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(SYNC_DISPLAY_WINDOW).await;
            if current_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            view.hide_status();
            let settled = {
                let mut state = lock_state(&state);
                if state.phase == SyncPhase::Running(SyncOrigin::Manual) {
                    state.phase = SyncPhase::Idle;
                    true
                } else {
                    false
                }
            };
            if settled {
                view.hide_indicator();
                debug!("[Sync] 手动同步展示窗口结束，回到 Idle");
            }
        });

        let previous = self
            .settle_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// 启动周期轮询（已启动时不重复启动）
    ///
    /// 轮询任务只持有弱引用，监视器被释放后任务自行退出。
    pub fn start_polling(self: &Arc<Self>) {
        let mut slot = self
            .poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("[Sync] 轮询已在运行");
            return;
        }

        let monitor = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                if let Err(e) = monitor.poll().await {
                    warn!("[Sync] 轮询同步状态失败: {}", e);
                }
            }
        }));
        info!(
            "[Sync] ⏱️ 已启动同步状态轮询，间隔 {}s",
            POLL_INTERVAL.as_secs()
        );
    }

    /// 停止周期轮询
    pub fn stop_polling(&self) {
        if let Some(task) = take_task(&self.poll_task) {
            task.abort();
            info!("[Sync] ⏹️ 已停止同步状态轮询");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// 登出时重置为 `Idle`，丢弃所有在途结果和待执行的隐藏任务
    pub fn reset(&self) {
        self.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.display_generation.fetch_add(1, Ordering::SeqCst);
        self.poll_failing.store(false, Ordering::SeqCst);
        if let Some(settle) = take_task(&self.settle_task) {
            settle.abort();
        }
        *lock_state(&self.state) = SyncState::default();
        self.view.hide_status();
        self.view.hide_indicator();
        debug!("[Sync] 同步状态已重置");
    }
}

impl Drop for BackgroundSyncMonitor {
    fn drop(&mut self) {
        if let Some(task) = take_task(&self.poll_task) {
            task.abort();
        }
        if let Some(task) = take_task(&self.settle_task) {
            task.abort();
        }
    }
}
