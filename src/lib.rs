pub mod crm;

// 重新导出常用类型，方便外部使用
pub use crm::{
    config::ClientConfig,
    contacts::ContactsApi,
    provider::{Identity, IdentityProvider, StaticIdentityProvider},
    session::{SessionContext, SessionCoordinator},
};
