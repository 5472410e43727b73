//! 文件操作模块错误类型

use thiserror::Error;

/// 文件操作错误类型
#[derive(Debug, Error)]
pub enum FileOpError {
    /// 操作不存在
    #[error("找不到指定任务: {0}")]
    OperationNotFound(String),

    /// 操作 ID 已存在
    #[error("操作 ID 已存在: {0}")]
    OperationConflict(String),

    /// 复制/剪切缺少目标路径
    #[error("{0} 操作缺少目标路径")]
    MissingDestination(String),

    /// 不支持的操作类型
    #[error("不支持的操作类型: {0}")]
    UnsupportedOperation(String),

    /// 协作式取消信号（非失败，运行以 cancelled 终态结束）
    #[error("操作已取消")]
    Cancelled,

    /// 文件系统错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileOpError> for String {
    fn from(err: FileOpError) -> Self {
        err.to_string()
    }
}
