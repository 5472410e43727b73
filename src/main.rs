//! 服务入口
//!
//! 初始化日志、加载配置、构建共享状态并启动 HTTP/WebSocket 服务。

use std::path::Path;

use tracing_subscriber::EnvFilter;

use vwindow::{build_state, config, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = config::load_config(Path::new(&config_path))?;

    if config.auth.admin_key.as_deref().unwrap_or("").is_empty() {
        tracing::warn!("[服务器] 未配置 admin_key，特权接口已禁用");
    }

    let state = build_state(config);
    serve(state).await
}
