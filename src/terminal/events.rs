//! 终端事件定义
//!
//! 终端子系统通过共享的 [`EventPublisher`](crate::events::EventPublisher)
//! 广播的状态事件。字节流本身走会话的 WebSocket 通道，不经过事件发布器。
//!
//! ## 事件列表
//! - 会话退出（进程结束，条目即将被移除）
//! - 会话异常（读取错误）

use serde::{Deserialize, Serialize};

/// 会话终态
///
/// 只覆盖会发布到事件通道的状态。运行中/已分离不走事件通道，
/// 由 `LIST resumable` 查询得到。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 进程已退出
    Exited,
    /// 错误
    Error,
}

/// 终端状态事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalStatusEvent {
    /// 会话 ID
    pub session_id: String,
    /// 会话状态
    pub status: SessionStatus,
    /// 错误信息（仅当状态为 Error 时有效）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TerminalStatusEvent {
    /// 进程退出事件
    pub fn exited(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Exited,
            error: None,
        }
    }

    /// 读取错误事件
    pub fn error(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Error,
            error: Some(message.into()),
        }
    }
}
