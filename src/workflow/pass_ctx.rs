//! 轮次上下文
//!
//! 封装"我正在跑哪个会话的哪个选项"这一信息

use std::fmt::Display;

use crate::models::OptionSet;

/// 轮次上下文
#[derive(Debug, Clone)]
pub struct PassCtx {
    pub session_id: String,

    /// 本轮统一选择的选项索引
    pub option_index: usize,

    /// 选项标签（仅用于日志显示）
    pub option_label: String,
}

impl PassCtx {
    pub fn new(session_id: impl Into<String>, option_index: usize, options: &OptionSet) -> Self {
        Self {
            session_id: session_id.into(),
            option_index,
            option_label: options.label(option_index),
        }
    }
}

impl Display for PassCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 {} 选项 {}]", self.session_id, self.option_label)
    }
}
