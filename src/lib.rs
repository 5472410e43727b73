//! VWindow - Web 远程桌面后端
//!
//! 浏览器客户端通过本服务打开交互式终端会话并执行批量文件操作。
//! 两个子系统共享同一套骨架：以不透明 ID 为键的并发注册表、
//! 每条目一个取消句柄、每条目若干后台泵、与泵逻辑解耦的事件发布。

// 核心模块
pub mod config;
pub mod events;
pub mod fileops;
pub mod middleware;
pub mod server;
pub mod terminal;

// 重新导出核心类型
pub use config::Config;
pub use events::EventPublisher;
pub use fileops::{FileOpEvent, FileOperationRegistry, FileOperationRequest};
pub use server::{build_router, build_state, serve, AppState};
pub use terminal::{ShellOptions, TerminalSessionRegistry};
