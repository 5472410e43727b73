//! 终端模块错误类型
//!
//! 定义终端核心能力相关的错误类型。
//!
//! ## 功能
//! - 会话管理错误
//! - Shell 进程创建与读写错误
//! - 序列化支持

use thiserror::Error;

/// 终端错误类型
#[derive(Debug, Error)]
pub enum TerminalError {
    /// 会话不存在
    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    /// Shell 进程创建失败
    #[error("Shell 进程创建失败: {0}")]
    SpawnFailed(String),

    /// 写入失败
    #[error("写入失败: {0}")]
    WriteFailed(String),

    /// 调整大小失败
    #[error("调整大小失败: {0}")]
    ResizeFailed(String),

    /// 会话已被其他连接占用
    #[error("会话已被其他连接占用: {0}")]
    AlreadyAttached(String),

    /// 会话已结束
    #[error("会话已结束: {0}")]
    SessionExited(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<TerminalError> for String {
    fn from(err: TerminalError) -> Self {
        err.to_string()
    }
}

impl serde::Serialize for TerminalError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
