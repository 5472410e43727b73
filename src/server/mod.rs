//! HTTP API 服务器
//!
//! 组装路由、注入共享状态并启动 axum 服务。
//! 注册表在进程启动时构造一次，经 [`AppState`] 注入各边界处理器。

pub mod handlers;


use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use crate::config::Config;
use crate::events::EventPublisher;
use crate::fileops::FileOperationRegistry;
use crate::middleware::AdminAuthLayer;
use crate::terminal::TerminalSessionRegistry;

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<Config>,
    /// 终端会话注册表
    pub terminals: Arc<TerminalSessionRegistry>,
    /// 文件操作注册表
    pub fileops: Arc<FileOperationRegistry>,
}

/// 构建应用状态
pub fn build_state(config: Config) -> AppState {
    let terminal_publisher = Arc::new(EventPublisher::new());
    let fileop_publisher = Arc::new(EventPublisher::new());
    AppState {
        config: Arc::new(config),
        terminals: Arc::new(TerminalSessionRegistry::new(terminal_publisher)),
        fileops: Arc::new(FileOperationRegistry::new(fileop_publisher)),
    }
}

/// 组装路由
pub fn build_router(state: AppState) -> Router {
    // 特权 REST 路由：密钥走请求头，由认证层统一检查
    let admin_routes = Router::new()
        .route("/api/v1/terminal", post(handlers::terminal::create_terminal))
        .route(
            "/api/v1/resume/terminals",
            get(handlers::terminal::list_resumable),
        )
        .route("/api/fileops/start", post(handlers::fileops::start_operation))
        .route(
            "/api/fileops/cancel",
            post(handlers::fileops::cancel_operation),
        )
        .layer(AdminAuthLayer::new(state.config.auth.clone()));

    let mut app = Router::new()
        .route("/health", get(health))
        // WebSocket 升级与同路径的 DELETE 认证方式不同（查询参数 / 请求头），
        // 在处理器内各自检查，不挂整路径的认证层
        .route(
            "/api/v1/terminal/:id",
            get(handlers::terminal::attach_terminal).delete(handlers::terminal::close_terminal),
        )
        .route("/api/fileops/ws", get(handlers::fileops::events_ws))
        .merge(admin_routes);

    // 前端 SPA 静态服务，未命中的路径回退到 index.html
    if let Some(static_dir) = &state.config.server.static_dir {
        let index = std::path::Path::new(static_dir).join("index.html");
        let serve = ServeDir::new(static_dir).not_found_service(ServeFile::new(index));
        app = app.fallback_service(serve);
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .with_state(state)
}

/// 启动服务器直到收到退出信号
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[服务器] 监听 {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("[服务器] 收到退出信号");
        })
        .await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
