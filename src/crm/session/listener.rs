//! 会话视图回调接口与广播事件

use crate::crm::provider::Identity;

/// 会话相关的界面操作
///
/// 回调在协调器内部同步调用，实现方不应阻塞。
pub trait SessionView: Send + Sync {
    /// 显示/隐藏加载指示器
    fn set_loading(&self, visible: bool);

    /// 切换为已登录界面（显示需要登录的导航，状态文案 `Welcome, <name>`）
    fn show_signed_in(&self, identity: &Identity);

    /// 切换为未登录界面（隐藏需要登录的导航，状态文案 `Please sign in`）
    fn show_signed_out(&self);

    /// 收起移动端菜单等导航状态
    fn reset_navigation(&self) {}

    /// 显示错误横幅
    fn show_error(&self, message: &str);

    /// 隐藏错误横幅
    fn hide_error(&self);

    /// 当前页面路径
    fn current_path(&self) -> String;

    /// 跳转页面
    fn navigate(&self, path: &str);
}

/// 空实现（默认）
pub struct EmptySessionView;

impl SessionView for EmptySessionView {
    fn set_loading(&self, _visible: bool) {}
    fn show_signed_in(&self, _identity: &Identity) {}
    fn show_signed_out(&self) {}
    fn show_error(&self, _message: &str) {}
    fn hide_error(&self) {}

    fn current_path(&self) -> String {
        "/".to_string()
    }

    fn navigate(&self, _path: &str) {}
}

/// 广播给其他模块的认证事件（发出即忘，不等待确认）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// 身份提供方已就绪，状态监听已注册
    Ready,
    /// 已展示给用户的错误（分类后的提示）
    Error { message: String },
}
