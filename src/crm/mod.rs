//! CRM 客户端会话核心
//!
//! 身份会话、token 传播、后台邮件同步以及错误展示策略

pub mod backend;
pub mod classifier;
pub mod config;
pub mod contacts;
pub mod db;
pub mod error;
pub mod provider;
pub mod session;
pub mod sync;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型
pub use backend::{CrmBackend, HttpBackend};
pub use classifier::{Classification, ErrorClassifier, SuppressionContext};
pub use config::ClientConfig;
pub use error::{AuthError, ContactsError, ProviderError, SyncError};
pub use provider::{Identity, IdentityProvider, Persistence, StaticIdentityProvider};
pub use session::{AuthEvent, SessionContext, SessionCoordinator, SessionView};
pub use sync::{BackgroundSyncMonitor, SyncView};
pub use token::{AuthClient, RequestInterceptor, SqliteSessionStorage, TokenStore};
