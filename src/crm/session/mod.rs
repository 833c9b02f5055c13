//! 会话模块
//!
//! 登录态的唯一来源：协调器、会话模型、界面回调和进程级上下文

pub mod context;
pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use context::SessionContext;
pub use listener::{AuthEvent, EmptySessionView, SessionView};
pub use models::{welcome_text, CoordinatorState, ReadyState, Session, SIGNED_OUT_TEXT};
pub use service::SessionCoordinator;
