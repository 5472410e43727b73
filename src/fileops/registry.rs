//! 文件操作注册表
//!
//! 以操作 ID 为键的并发任务表，保证同一 ID 至多一个运行中的任务。
//! 任务创建即启动（fire and forget），订阅与否不影响执行；
//! 运行结束（完成/取消/出错）后条目自动移除。

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::EventPublisher;

use super::engine::{self, FileOperationRequest};
use super::error::FileOpError;
use super::events::FileOpEvent;

/// 运行中的任务条目
struct FileOperationTask {
    /// 协作式取消句柄，任务独占所有权，外部仅能触发
    cancel: CancellationToken,
}

/// 文件操作注册表
pub struct FileOperationRegistry {
    /// 任务映射表（与运行任务共享）
    tasks: Arc<DashMap<String, FileOperationTask>>,
    /// 事件发布器（与订阅方共享）
    publisher: Arc<EventPublisher<FileOpEvent>>,
}

impl FileOperationRegistry {
    /// 创建新的注册表
    pub fn new(publisher: Arc<EventPublisher<FileOpEvent>>) -> Self {
        tracing::info!("[文件操作] 注册表已初始化");
        Self {
            tasks: Arc::new(DashMap::new()),
            publisher,
        }
    }

    /// 原子性创建并启动一次运行
    ///
    /// 缺省操作 ID 由服务端生成。返回操作 ID；同 ID 任务仍在运行时
    /// 返回 [`FileOpError::OperationConflict`]，不启动第二次运行。
    /// 调用立即返回，运行在后台任务中推进。
    pub fn try_start(&self, mut request: FileOperationRequest) -> Result<String, FileOpError> {
        let operation_id = request
            .operation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        request.operation_id = Some(operation_id.clone());

        let cancel = CancellationToken::new();
        match self.tasks.entry(operation_id.clone()) {
            Entry::Occupied(_) => {
                return Err(FileOpError::OperationConflict(operation_id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(FileOperationTask {
                    cancel: cancel.clone(),
                });
            }
        }

        tracing::info!(
            "[文件操作] 启动 {} ({}, {} 个源)",
            operation_id,
            request.operation_type,
            request.source_paths.len()
        );

        let tasks = self.tasks.clone();
        let publisher = self.publisher.clone();
        let id = operation_id.clone();
        tokio::spawn(async move {
            // 引擎保证终态事件在返回前发布完毕，移除发生在其后
            engine::run(id.clone(), request, publisher.clone(), cancel).await;
            tasks.remove(&id);
            publisher.remove_topic(&id);
        });

        Ok(operation_id)
    }

    /// 触发协作式取消
    ///
    /// 返回是否找到该操作。取消在下一个检查点（文件边界或复制块边界）
    /// 被观察到，不是抢占式的。
    pub fn cancel(&self, operation_id: &str) -> bool {
        match self.tasks.get(operation_id) {
            Some(task) => {
                task.cancel.cancel();
                tracing::info!("[文件操作] 请求取消 {}", operation_id);
                true
            }
            None => false,
        }
    }

    /// 运行中任务数量
    pub fn running_count(&self) -> usize {
        self.tasks.len()
    }

    /// 事件发布器（边界层订阅用）
    pub fn publisher(&self) -> &Arc<EventPublisher<FileOpEvent>> {
        &self.publisher
    }
}
