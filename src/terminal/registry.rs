//! 终端会话注册表
//!
//! 管理所有终端会话的生命周期，提供会话的创建、查询、销毁功能。
//!
//! ## 功能
//! - 维护活跃会话的并发映射表
//! - 生成唯一的会话 ID
//! - 进程退出 → 自动移除的接线
//! - 可恢复会话（存活但无连接）列表

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::events::EventPublisher;

use super::error::TerminalError;
use super::events::TerminalStatusEvent;
use super::session::TerminalSession;
use super::shell::ShellOptions;

/// 终端会话注册表
///
/// 进程启动时构造一次，经 AppState 注入各边界处理器，
/// 不通过任何全局静态访问。
pub struct TerminalSessionRegistry {
    /// 会话映射表（与退出监听任务共享）
    sessions: Arc<DashMap<String, Arc<TerminalSession>>>,
    /// 终端状态事件发布器（与订阅方共享）
    publisher: Arc<EventPublisher<TerminalStatusEvent>>,
}

impl TerminalSessionRegistry {
    /// 创建新的注册表
    pub fn new(publisher: Arc<EventPublisher<TerminalStatusEvent>>) -> Self {
        tracing::info!("[终端] 会话注册表已初始化");
        Self {
            sessions: Arc::new(DashMap::new()),
            publisher,
        }
    }

    /// 创建新的终端会话
    ///
    /// 分配 ID、启动 shell 进程、注册条目，并订阅进程退出通知完成
    /// 自动移除。进程启动失败时注册表保持不变。
    pub fn create(&self, options: &ShellOptions) -> Result<String, TerminalError> {
        let session_id = Uuid::new_v4().to_string();

        let (session, exit_rx) = TerminalSession::new(session_id.clone(), options)?;
        self.sessions.insert(session_id.clone(), session);

        // 进程退出 → 单次原子移除。手动 close 先行移除时这里是空操作。
        let sessions = self.sessions.clone();
        let publisher = self.publisher.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            let failure = exit_rx.await.unwrap_or(None);
            sessions.remove(&id);
            let event = match failure {
                Some(message) => TerminalStatusEvent::error(&id, message),
                None => TerminalStatusEvent::exited(&id),
            };
            publisher.publish(&id, event);
            publisher.remove_topic(&id);
            tracing::info!("[终端] 会话 {} 已自动移除", id);
        });

        tracing::info!("[终端] 创建会话: {}", session_id);
        Ok(session_id)
    }

    /// 查询会话
    pub fn get(&self, session_id: &str) -> Option<Arc<TerminalSession>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// 查询可挂载的会话
    ///
    /// 未知 ID 返回 [`TerminalError::SessionNotFound`]，已有连接占用
    /// 返回 [`TerminalError::AlreadyAttached`]。这里只做升级前的边界
    /// 拒绝，挂载本身的原子交换兜底并发竞争。
    pub fn attachable(&self, session_id: &str) -> Result<Arc<TerminalSession>, TerminalError> {
        let session = self
            .get(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;
        if session.is_connected() {
            return Err(TerminalError::AlreadyAttached(session_id.to_string()));
        }
        Ok(session)
    }

    /// 关闭会话（幂等）
    ///
    /// 移除条目并强制终止底层进程，返回条目是否存在。
    pub fn close(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.kill();
                tracing::info!("[终端] 关闭会话: {}", session_id);
                true
            }
            None => false,
        }
    }

    /// 可恢复会话列表（进程存活但无连接挂载）
    ///
    /// 顺带清理已退出但尚未被自动移除的条目，兜底错过的退出通知。
    pub fn list_resumable(&self) -> Vec<String> {
        let mut stale = Vec::new();
        let mut resumable = Vec::new();
        for entry in self.sessions.iter() {
            let session = entry.value();
            if session.has_exited() {
                stale.push(entry.key().clone());
            } else if !session.is_connected() {
                resumable.push(entry.key().clone());
            }
        }
        for id in stale {
            self.sessions.remove(&id);
            tracing::warn!("[终端] 清理已退出的残留会话: {}", id);
        }
        resumable
    }

    /// 活跃会话数量
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
