//! Shell 进程适配器
//!
//! 跨平台封装"一个运行中的交互式 shell"：优先使用原生 PTY；
//! PTY 不可用时退回到经 `script` 包装的普通子进程（标准流重定向）。
//! 策略在构造时一次性选定，调用方只依赖双向字节流 + 存活契约，
//! 不感知平台分支。

use std::io::{Read, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};

use super::error::TerminalError;

/// 默认终端行数
pub const DEFAULT_ROWS: u16 = 24;
/// 默认终端列数
pub const DEFAULT_COLS: u16 = 80;

/// Shell 创建选项
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// shell 可执行文件路径，缺省取 `$SHELL`（Windows 上为 powershell.exe）
    pub app: Option<String>,
    /// 工作目录，缺省为用户主目录
    pub cwd: Option<PathBuf>,
    /// 终端列数
    pub cols: u16,
    /// 终端行数
    pub rows: u16,
    /// 强制使用包装子进程策略（测试与无 PTY 环境用）
    pub force_wrapper: bool,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            app: None,
            cwd: None,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            force_wrapper: false,
        }
    }
}

impl ShellOptions {
    fn resolve_app(&self) -> String {
        if let Some(app) = &self.app {
            return app.clone();
        }
        if cfg!(windows) {
            "powershell.exe".to_string()
        } else {
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
        }
    }

    fn resolve_cwd(&self) -> Option<PathBuf> {
        self.cwd.clone().or_else(dirs::home_dir)
    }
}

/// 控制句柄（kill / resize 所需的平台侧资源）
enum ShellControl {
    /// 原生 PTY 策略
    NativePty {
        master: Box<dyn portable_pty::MasterPty + Send>,
        child: Box<dyn portable_pty::Child + Send + Sync>,
    },
    /// 包装子进程策略
    Wrapped { child: std::process::Child },
}

/// 运行中的 shell 进程
///
/// 暴露：可读输出流（[`take_reader`](Self::take_reader)，仅可取走一次）、
/// 可写输入（[`write`](Self::write)）、强制终止（[`kill`](Self::kill)）。
/// 进程退出通过读端 EOF 观察，由会话的读取线程上报。
pub struct ShellProcess {
    writer: Mutex<Box<dyn Write + Send>>,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    control: Mutex<ShellControl>,
}

impl ShellProcess {
    /// 创建 shell 进程，构造时一次性选定平台策略
    pub fn spawn(options: &ShellOptions) -> Result<Self, TerminalError> {
        if options.force_wrapper {
            return Self::spawn_wrapped(options);
        }
        match Self::spawn_native(options) {
            Ok(shell) => Ok(shell),
            Err(e) if cfg!(unix) => {
                tracing::warn!("[终端] 原生 PTY 不可用，退回包装子进程: {}", e);
                Self::spawn_wrapped(options)
            }
            Err(e) => Err(e),
        }
    }

    /// 原生 PTY 策略
    fn spawn_native(options: &ShellOptions) -> Result<Self, TerminalError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;

        let app = options.resolve_app();
        tracing::info!("[终端] 使用 shell: {}", app);

        let mut cmd = CommandBuilder::new(&app);
        cmd.env("TERM", "xterm-256color");
        if let Some(cwd) = options.resolve_cwd() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            control: Mutex::new(ShellControl::NativePty {
                master: pair.master,
                child,
            }),
        })
    }

    /// 包装子进程策略
    ///
    /// 经 `script -qfc <shell> /dev/null` 让无 PTY 环境下的 shell
    /// 仍以交互模式运行，标准流重定向作为双向字节流。
    fn spawn_wrapped(options: &ShellOptions) -> Result<Self, TerminalError> {
        use std::process::{Command, Stdio};

        let app = options.resolve_app();
        tracing::info!("[终端] 包装子进程启动 shell: {}", app);

        let mut cmd = Command::new("script");
        cmd.arg("-qfc")
            .arg(&app)
            .arg("/dev/null")
            .env("TERM", "xterm-256color")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(cwd) = options.resolve_cwd() {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TerminalError::SpawnFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TerminalError::SpawnFailed("无法获取子进程 stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TerminalError::SpawnFailed("无法获取子进程 stdout".to_string()))?;

        Ok(Self {
            writer: Mutex::new(Box::new(stdin)),
            reader: Mutex::new(Some(Box::new(stdout))),
            control: Mutex::new(ShellControl::Wrapped { child }),
        })
    }

    /// 取走输出读取端（仅第一次调用返回 Some）
    pub fn take_reader(&self) -> Option<Box<dyn Read + Send>> {
        self.reader.lock().take()
    }

    /// 写入数据到 shell 输入
    pub fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        let mut writer = self.writer.lock();
        writer
            .write_all(data)
            .map_err(|e| TerminalError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TerminalError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// 调整终端大小（包装子进程无几何概念，视为成功）
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), TerminalError> {
        match &*self.control.lock() {
            ShellControl::NativePty { master, .. } => master
                .resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|e| TerminalError::ResizeFailed(e.to_string())),
            ShellControl::Wrapped { .. } => Ok(()),
        }
    }

    /// 强制终止进程
    pub fn kill(&self) {
        match &mut *self.control.lock() {
            ShellControl::NativePty { child, .. } => {
                let _ = child.kill();
            }
            ShellControl::Wrapped { child } => {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }

    /// 当前是否使用原生 PTY 策略
    pub fn uses_native_pty(&self) -> bool {
        matches!(&*self.control.lock(), ShellControl::NativePty { .. })
    }
}
