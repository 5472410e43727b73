//! 配置管理模块
//!
//! 提供 YAML 配置文件的加载，文件不存在时回退到默认配置。
//! 配置在进程启动时加载一次，经 AppState 注入各处，不做热重载。

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::terminal::{DEFAULT_COLS, DEFAULT_ROWS};

/// 配置错误类型
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("配置读取错误: {0}")]
    ReadError(String),
    /// YAML 解析错误
    #[error("YAML 解析错误: {0}")]
    ParseError(String),
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 静态资源目录（前端 SPA），缺省不提供静态服务
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6080,
            static_dir: None,
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 管理密钥；为空时特权接口整体禁用（404）
    pub admin_key: Option<String>,
    /// 普通用户密钥；可通过认证但对特权接口返回 403
    pub user_key: Option<String>,
}

/// 终端默认配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// shell 可执行文件路径，缺省取环境变量
    pub shell: Option<String>,
    /// 新会话工作目录，缺省为用户主目录
    pub cwd: Option<String>,
    /// 默认终端列数
    pub cols: u16,
    /// 默认终端行数
    pub rows: u16,
    /// 强制使用包装子进程策略
    pub force_wrapper: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            cwd: None,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            force_wrapper: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 服务器配置
    pub server: ServerConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 终端默认配置
    pub terminal: TerminalConfig,
}

/// 从文件加载配置
///
/// 文件不存在时返回默认配置。
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("[配置] {} 不存在，使用默认配置", path.display());
        return Ok(Config::default());
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
    let config: Config =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    tracing::info!("[配置] 已加载 {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 6080);
        assert!(config.auth.admin_key.is_none());
        assert_eq!(config.terminal.cols, DEFAULT_COLS);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.server.port, 6080);
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 9000\nauth:\n  admin_key: top-secret\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.auth.admin_key.as_deref(), Some("top-secret"));
        // 未出现的段落取默认值
        assert_eq!(config.terminal.rows, DEFAULT_ROWS);
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "server: [not a map").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
