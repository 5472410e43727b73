//! 终端边界处理器
//!
//! 创建/关闭/可恢复列表走 REST，挂载走 WebSocket 升级。
//! 升级请求的密钥通过 URL 查询参数传递（浏览器 WebSocket 无法自定义
//! 请求头），同路径的 DELETE 仍走请求头，认证在各处理器内完成。

use std::path::PathBuf;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::middleware::{authenticate, CallerRole};
use crate::server::AppState;
use crate::terminal::{ShellOptions, TerminalError};

/// 创建终端请求
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TerminalCreateOptions {
    /// shell 可执行文件路径
    pub app: Option<String>,
    /// 工作目录
    pub cwd: Option<String>,
    /// 终端列数
    pub cols: Option<u16>,
    /// 终端行数
    pub rows: Option<u16>,
}

/// WebSocket 查询参数
#[derive(Debug, Default, Deserialize)]
pub struct WsQueryParams {
    /// 密钥（通过 URL 参数传递）
    pub token: Option<String>,
}

fn shell_options(state: &AppState, options: &TerminalCreateOptions) -> ShellOptions {
    let defaults = &state.config.terminal;
    ShellOptions {
        app: options.app.clone().or_else(|| defaults.shell.clone()),
        cwd: options
            .cwd
            .clone()
            .or_else(|| defaults.cwd.clone())
            .map(PathBuf::from),
        cols: options.cols.unwrap_or(defaults.cols),
        rows: options.rows.unwrap_or(defaults.rows),
        force_wrapper: defaults.force_wrapper,
    }
}

/// 从请求头提取密钥并要求管理员角色
fn require_admin_header(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()));
    match authenticate(&state.config.auth, provided) {
        Ok(CallerRole::Admin) => Ok(()),
        Ok(CallerRole::User) => Err(StatusCode::FORBIDDEN),
        Err(status) => Err(status),
    }
}

/// POST /api/v1/terminal
pub async fn create_terminal(
    State(state): State<AppState>,
    Json(options): Json<TerminalCreateOptions>,
) -> Response {
    match state.terminals.create(&shell_options(&state, &options)) {
        Ok(id) => Json(serde_json::json!({ "id": id })).into_response(),
        Err(e) => {
            tracing::error!("[终端] 创建会话失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// DELETE /api/v1/terminal/:id（幂等）
pub async fn close_terminal(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(status) = require_admin_header(&state, &headers) {
        return status.into_response();
    }
    state.terminals.close(&session_id);
    StatusCode::OK.into_response()
}

/// GET /api/v1/resume/terminals
pub async fn list_resumable(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "terminals": state.terminals.list_resumable() }))
}

/// GET /api/v1/terminal/:id — WebSocket 挂载
///
/// 挂载后原始字节双向透传：二进制帧为终端输入/输出，
/// 文本帧可携带 resize 控制。
pub async fn attach_terminal(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<WsQueryParams>,
) -> Response {
    match authenticate(&state.config.auth, params.token.as_deref()) {
        Ok(CallerRole::Admin) => {}
        Ok(CallerRole::User) => return StatusCode::FORBIDDEN.into_response(),
        Err(status) => return status.into_response(),
    }

    let session = match state.terminals.attachable(&session_id) {
        Ok(session) => session,
        Err(e) => {
            let status = match &e {
                TerminalError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                TerminalError::AlreadyAttached(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = session.attach(socket).await {
            tracing::warn!("[终端] 会话 {} 挂载失败: {}", session.id(), e);
        }
    })
}
