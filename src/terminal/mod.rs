//! 终端核心模块
//!
//! 提供 shell 进程管理和会话管理能力，通过 HTTP/WebSocket 边界暴露给前端。
//!
//! ## 模块结构
//! - `error` - 错误类型定义
//! - `events` - 状态事件定义
//! - `ring_buffer` - 输出回放缓冲区
//! - `shell` - shell 进程适配器（原生 PTY / 包装子进程）
//! - `session` - 会话与双向泵
//! - `registry` - 会话注册表
//!
//! ## 使用示例
//! ```ignore
//! use vwindow::terminal::{ShellOptions, TerminalSessionRegistry};
//!
//! let registry = TerminalSessionRegistry::new(publisher);
//! let session_id = registry.create(&ShellOptions::default())?;
//! let session = registry.get(&session_id).unwrap();
//! session.attach(web_socket).await?;
//! ```

pub mod error;
pub mod events;
pub mod registry;
pub mod ring_buffer;
pub mod session;
pub mod shell;


// 重新导出常用类型
pub use error::TerminalError;
pub use events::{SessionStatus, TerminalStatusEvent};
pub use registry::TerminalSessionRegistry;
pub use ring_buffer::RingBuffer;
pub use session::TerminalSession;
pub use shell::{ShellOptions, ShellProcess, DEFAULT_COLS, DEFAULT_ROWS};
