//! 联系人模块
//!
//! Google 联系人的列出、同步、导入和导入状态查询

pub mod api;
pub mod types;

// 重新导出主要类型
pub use api::ContactsApi;
pub use types::{
    ContactGroup, ContactsListResp, GoogleContact, ImportContactResp, ImportStatus, ImportedPerson,
};
