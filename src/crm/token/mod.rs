//! token 模块
//!
//! 身份 token / 委托 token 的存储、出站请求的认证注入，以及本地持久化

pub mod interceptor;
pub mod persist;
pub mod store;

// 重新导出主要类型
pub use interceptor::{AuthClient, AuthRequestBuilder, RequestInterceptor};
pub use persist::SqliteSessionStorage;
pub use store::{TokenSnapshot, TokenStore};
