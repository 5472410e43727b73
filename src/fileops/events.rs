//! 文件操作事件定义
//!
//! 订阅方在一次运行中按顺序收到零或多个 `progress`，
//! 最后恰好一个终态事件（`completed` / `cancelled` / `error`）。

use serde::{Deserialize, Serialize};

/// 文件操作事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FileOpEvent {
    /// 进度更新
    #[serde(rename_all = "camelCase")]
    Progress {
        operation_id: String,
        /// 累计进度百分比 [0,100]，单调非降
        progress: f64,
        /// 当前处理的文件名
        current_file: String,
    },
    /// 全部完成
    #[serde(rename_all = "camelCase")]
    Completed { operation_id: String },
    /// 已取消
    #[serde(rename_all = "camelCase")]
    Cancelled { operation_id: String },
    /// 运行失败
    #[serde(rename_all = "camelCase")]
    Error {
        operation_id: String,
        /// 错误信息
        message: String,
        /// 出错的文件路径
        file: String,
    },
}

impl FileOpEvent {
    /// 事件所属的操作 ID
    pub fn operation_id(&self) -> &str {
        match self {
            FileOpEvent::Progress { operation_id, .. }
            | FileOpEvent::Completed { operation_id }
            | FileOpEvent::Cancelled { operation_id }
            | FileOpEvent::Error { operation_id, .. } => operation_id,
        }
    }

    /// 是否为终态事件
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileOpEvent::Progress { .. })
    }
}
