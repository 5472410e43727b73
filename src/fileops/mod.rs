//! 文件操作核心模块
//!
//! 提供批量 copy / cut / delete 的执行、进度广播与取消能力。
//!
//! ## 模块结构
//! - `error` - 错误类型定义
//! - `events` - 进度/终态事件定义
//! - `engine` - 批量执行引擎
//! - `registry` - 任务注册表
//!
//! ## 使用示例
//! ```ignore
//! use vwindow::fileops::{FileOperationRegistry, FileOperationRequest};
//!
//! let registry = FileOperationRegistry::new(publisher);
//! let operation_id = registry.try_start(request)?;
//! // ... 稍后
//! registry.cancel(&operation_id);
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod registry;

#[cfg(test)]
mod tests;

// 重新导出常用类型
pub use engine::FileOperationRequest;
pub use error::FileOpError;
pub use events::FileOpEvent;
pub use registry::FileOperationRegistry;
