//! 同步指示器回调接口

/// 同步指示器与状态栏（与认证错误横幅分开展示）
pub trait SyncView: Send + Sync {
    /// 显示同步进行中的指示器
    fn show_indicator(&self);

    /// 隐藏指示器
    fn hide_indicator(&self);

    /// 在状态栏显示文案
    fn show_status(&self, text: &str);

    /// 隐藏状态栏
    fn hide_status(&self);
}

/// 空实现（默认）
pub struct EmptySyncView;

impl SyncView for EmptySyncView {
    fn show_indicator(&self) {}
    fn hide_indicator(&self) {}
    fn show_status(&self, _text: &str) {}
    fn hide_status(&self) {}
}
