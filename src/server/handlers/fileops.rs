//! 文件操作边界处理器
//!
//! 启动/取消走 REST；进度通过 WebSocket 订阅通道推送，
//! 客户端按操作 ID（或 `all`）订阅/退订。

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::events::TOPIC_ALL;
use crate::fileops::{FileOpError, FileOperationRequest};
use crate::middleware::{authenticate, CallerRole};
use crate::server::AppState;

use super::terminal::WsQueryParams;

/// 取消请求查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelParams {
    pub operation_id: String,
}

/// 订阅控制帧
///
/// `{"action":"subscribe","operationId":"..."}`，`operationId` 为
/// `all` 时订阅全部操作。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionFrame {
    action: String,
    operation_id: String,
}

/// POST /api/fileops/start
pub async fn start_operation(
    State(state): State<AppState>,
    Json(request): Json<FileOperationRequest>,
) -> Response {
    match state.fileops.try_start(request) {
        Ok(operation_id) => {
            Json(serde_json::json!({ "operationId": operation_id })).into_response()
        }
        Err(FileOpError::OperationConflict(id)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "操作 ID 已存在", "operationId": id })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// POST /api/fileops/cancel?operationId=
pub async fn cancel_operation(
    State(state): State<AppState>,
    Query(params): Query<CancelParams>,
) -> Response {
    if state.fileops.cancel(&params.operation_id) {
        StatusCode::OK.into_response()
    } else {
        let err = FileOpError::OperationNotFound(params.operation_id);
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response()
    }
}

/// GET /api/fileops/ws — 事件订阅通道
pub async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Response {
    match authenticate(&state.config.auth, params.token.as_deref()) {
        Ok(CallerRole::Admin) => {}
        Ok(CallerRole::User) => return StatusCode::FORBIDDEN.into_response(),
        Err(status) => return status.into_response(),
    }
    ws.on_upgrade(move |socket| handle_events_socket(socket, state))
}

/// 处理一条订阅连接
///
/// 一个转发任务订阅全部事件流，按连接当前的订阅集过滤下发；
/// 消息循环只负责维护订阅集。
async fn handle_events_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    // 当前连接订阅的操作 ID 集合（"all" 为通配）
    let subscriptions: Arc<parking_lot::RwLock<HashSet<String>>> =
        Arc::new(parking_lot::RwLock::new(HashSet::new()));

    let forward_sender = sender.clone();
    let forward_subs = subscriptions.clone();
    let mut events = state.fileops.publisher().subscribe_all();
    let forward_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    {
                        let subs = forward_subs.read();
                        if !subs.contains(TOPIC_ALL) && !subs.contains(event.operation_id()) {
                            continue;
                        }
                    }
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    let mut guard = forward_sender.lock().await;
                    if guard.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("[文件操作] 订阅连接落后 {} 条事件", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<SubscriptionFrame>(&text) {
                Ok(frame) => {
                    let mut subs = subscriptions.write();
                    match frame.action.as_str() {
                        "subscribe" => {
                            subs.insert(frame.operation_id);
                        }
                        "unsubscribe" => {
                            subs.remove(&frame.operation_id);
                        }
                        other => {
                            tracing::debug!("[文件操作] 未知订阅动作: {}", other);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("[文件操作] 无法解析订阅帧: {}", e);
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    forward_task.abort();
}
