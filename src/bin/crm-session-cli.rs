//! CRM 会话 CLI 客户端（联调版）
//!
//! 非交互式 CLI，用命令行给出的 token 模拟一次 Google 登录，
//! 运行会话协调器（上传委托 token、手动同步、周期轮询），只展示界面变化。
//! 会话快照保存在 SQLite 中，下次启动时直接恢复。

use anyhow::{Context, Result};
use clap::Parser;
use mobilize_session_core::crm::contacts::ContactsApi;
use mobilize_session_core::crm::provider::{Identity, StaticIdentityProvider};
use mobilize_session_core::crm::session::{
    welcome_text, AuthEvent, SessionContext, SessionCoordinator, SessionView, SIGNED_OUT_TEXT,
};
use mobilize_session_core::crm::sync::SyncView;
use mobilize_session_core::crm::token::SqliteSessionStorage;
use mobilize_session_core::ClientConfig;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// CRM 会话 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "crm-session-cli")]
#[command(about = "CRM 会话 CLI 客户端 - 用于联调登录与邮件同步", long_about = None)]
struct Args {
    /// 后端地址
    #[arg(long, default_value = "http://localhost:5000")]
    api_base_url: String,

    /// 用户ID（身份提供方的 uid）
    #[arg(short, long)]
    user_id: String,

    /// 显示名
    #[arg(long)]
    display_name: Option<String>,

    /// 身份 token
    #[arg(long)]
    id_token: String,

    /// 委托 token（Google OAuth access token），缺失时无法同步邮件
    #[arg(long)]
    access_token: Option<String>,

    /// 启动时所在页面
    #[arg(long, default_value = "/")]
    path: String,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,mobilize_session_core=debug）
    #[arg(long, default_value = "info,mobilize_session_core=debug")]
    log_level: String,

    /// 会话快照数据库
    #[arg(long, default_value = "sqlite://crm_session.db?mode=rwc")]
    db: String,

    /// 启动后列出 Google 联系人
    #[arg(long)]
    list_contacts: bool,

    /// 退出前登出并清空会话快照
    #[arg(long)]
    sign_out: bool,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

/// 把界面变化打印到日志
struct CliSessionView {
    path: Mutex<String>,
}

impl SessionView for CliSessionView {
    fn set_loading(&self, visible: bool) {
        info!("[CLI/View] ⏳ 加载中: {}", visible);
    }

    fn show_signed_in(&self, identity: &Identity) {
        info!("[CLI/View] 👤 {}", welcome_text(identity));
    }

    fn show_signed_out(&self) {
        info!("[CLI/View] 👤 {}", SIGNED_OUT_TEXT);
    }

    fn show_error(&self, message: &str) {
        error!("[CLI/View] ❌ 错误横幅: {}", message);
    }

    fn hide_error(&self) {
        info!("[CLI/View] 错误横幅已隐藏");
    }

    fn current_path(&self) -> String {
        self.path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn navigate(&self, path: &str) {
        info!("[CLI/View] 🧭 跳转: {}", path);
        *self
            .path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = path.to_string();
    }
}

struct CliSyncView;

impl SyncView for CliSyncView {
    fn show_indicator(&self) {
        info!("[CLI/Sync] 🔄 同步指示器: 显示");
    }

    fn hide_indicator(&self) {
        info!("[CLI/Sync] 同步指示器: 隐藏");
    }

    fn show_status(&self, text: &str) {
        info!("[CLI/Sync] 📬 {}", text);
    }

    fn hide_status(&self) {
        info!("[CLI/Sync] 状态栏已隐藏");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    info!("[CLI] 🚀 CRM 会话 CLI 客户端");
    info!("[CLI] 👤 用户ID: {}", args.user_id);
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let storage = SqliteSessionStorage::open(&args.db).await?;
    let snapshot = storage.load_snapshot().await?;
    let restored = snapshot.identity_token.is_some()
        && snapshot.user_id.as_deref() == Some(args.user_id.as_str());

    let mut account = Identity::new(args.user_id.clone());
    account.display_name = args.display_name.clone();
    let provider = StaticIdentityProvider::new(account, args.id_token.clone(), args.access_token.clone());
    // 有快照时模拟持久化恢复：提供方启动即为已登录
    let provider = Arc::new(if restored { provider.signed_in() } else { provider });

    let view = Arc::new(CliSessionView {
        path: Mutex::new(args.path.clone()),
    });
    let config = ClientConfig::new(args.api_base_url.clone());
    let coordinator = SessionContext::global().try_acquire(|| {
        SessionCoordinator::new(config, provider, view, Arc::new(CliSyncView))
    })?;

    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AuthEvent::Ready => info!("[CLI] 📣 auth ready"),
                AuthEvent::Error { message } => warn!("[CLI] 📣 auth error: {}", message),
            }
        }
    });

    if restored {
        info!("[CLI] 📦 从本地快照恢复会话");
        coordinator.tokens().restore(snapshot);
    }

    coordinator
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("初始化失败: {}", e))?;

    if !restored {
        info!("[CLI] 🔐 正在登录...");
        coordinator
            .sign_in()
            .await
            .map_err(|e| anyhow::anyhow!("登录失败: {}", e))?;
    }
    storage.save_snapshot(&coordinator.tokens().current()).await?;

    if args.list_contacts {
        match ContactsApi::from_coordinator(&coordinator).list_contacts().await {
            Ok(resp) => {
                info!("[CLI] 📇 联系人（共 {} 个）:", resp.contacts.len());
                for contact in resp.contacts.iter().take(5) {
                    info!(
                        "[CLI]   - {} | {}",
                        contact.names,
                        contact.email_addresses.first().map(String::as_str).unwrap_or("-")
                    );
                }
            }
            Err(e) => error!("[CLI] ❌ 获取联系人失败: {}", e),
        }
    }

    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        tokio::signal::ctrl_c().await.context("监听 Ctrl+C 失败")?;
    }

    if args.sign_out {
        if let Err(e) = coordinator.sign_out().await {
            warn!("[CLI] ⚠️ 登出时提供方返回错误: {}", e);
        }
        storage.clear().await?;
    } else {
        storage.save_snapshot(&coordinator.tokens().current()).await?;
    }

    info!("[CLI] 👋 程序退出");
    Ok(())
}
