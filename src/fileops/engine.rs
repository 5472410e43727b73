//! 文件操作执行引擎
//!
//! 按源路径顺序执行一批 copy / cut / delete，复制按固定块流式进行，
//! 每块发布一次进度事件；取消在文件边界和块边界协作式检查。
//! 一次运行恰好发布一个终态事件（completed / cancelled / error），
//! 失败后不回滚已完成的文件。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::events::EventPublisher;

use super::error::FileOpError;
use super::events::FileOpEvent;

/// 复制块大小 (80 KB)
const COPY_CHUNK_SIZE: usize = 80 * 1024;

/// 文件操作批量请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationRequest {
    /// 客户端可指定操作 ID；缺省由服务端生成
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// 源路径序列（绝对路径，按序处理）
    pub source_paths: Vec<String>,
    /// 目标目录，copy / cut 必填
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,
    /// 操作类型：copy / cut / delete
    ///
    /// 保持字符串而非枚举：未知类型在运行期以 error 事件上报，
    /// 而不是在反序列化时拒绝整个请求。
    pub operation_type: String,
}

/// 执行一次批量运行
///
/// `operation_id` 由注册表保证已填充且唯一。
pub async fn run(
    operation_id: String,
    request: FileOperationRequest,
    publisher: Arc<EventPublisher<FileOpEvent>>,
    cancel: CancellationToken,
) {
    let total_files = request.source_paths.len();
    if total_files == 0 {
        publisher.publish(
            &operation_id,
            FileOpEvent::Completed {
                operation_id: operation_id.clone(),
            },
        );
        return;
    }

    let progress_per_file = 100.0 / total_files as f64;
    let mut cumulative = 0.0_f64;

    for (index, src) in request.source_paths.iter().enumerate() {
        let file_name = Path::new(src)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| src.clone());

        let step = process_one(
            &operation_id,
            &request,
            src,
            &file_name,
            index,
            cumulative,
            progress_per_file,
            &publisher,
            &cancel,
        )
        .await;

        match step {
            Ok(()) => cumulative += progress_per_file,
            Err(FileOpError::Cancelled) => {
                tracing::info!("[文件操作] {} 已取消", operation_id);
                publisher.publish(
                    &operation_id,
                    FileOpEvent::Cancelled {
                        operation_id: operation_id.clone(),
                    },
                );
                return;
            }
            Err(e) => {
                tracing::error!("[文件操作] {} 处理 {} 失败: {}", operation_id, src, e);
                publisher.publish(
                    &operation_id,
                    FileOpEvent::Error {
                        operation_id: operation_id.clone(),
                        message: e.to_string(),
                        file: src.clone(),
                    },
                );
                return;
            }
        }
    }

    tracing::info!("[文件操作] {} 全部完成", operation_id);
    publisher.publish(
        &operation_id,
        FileOpEvent::Completed {
            operation_id: operation_id.clone(),
        },
    );
}

/// 处理单个源路径
#[allow(clippy::too_many_arguments)]
async fn process_one(
    operation_id: &str,
    request: &FileOperationRequest,
    src: &str,
    file_name: &str,
    index: usize,
    cumulative: f64,
    progress_per_file: f64,
    publisher: &Arc<EventPublisher<FileOpEvent>>,
    cancel: &CancellationToken,
) -> Result<(), FileOpError> {
    if cancel.is_cancelled() {
        return Err(FileOpError::Cancelled);
    }

    match request.operation_type.as_str() {
        "copy" => {
            let dest = destination_for(request, file_name)?;
            copy_with_progress(
                operation_id,
                src,
                &dest,
                file_name,
                cumulative,
                progress_per_file,
                publisher,
                cancel,
            )
            .await
        }
        "cut" => {
            let dest = destination_for(request, file_name)?;
            copy_with_progress(
                operation_id,
                src,
                &dest,
                file_name,
                cumulative,
                progress_per_file,
                publisher,
                cancel,
            )
            .await?;
            tokio::fs::remove_file(src).await?;
            Ok(())
        }
        "delete" => {
            tokio::fs::remove_file(src).await?;
            // 删除无子文件粒度，每完成一个文件发布一次进度
            publisher.publish(
                operation_id,
                FileOpEvent::Progress {
                    operation_id: operation_id.to_string(),
                    progress: (index + 1) as f64 * progress_per_file,
                    current_file: file_name.to_string(),
                },
            );
            Ok(())
        }
        other => Err(FileOpError::UnsupportedOperation(other.to_string())),
    }
}

fn destination_for(request: &FileOperationRequest, file_name: &str) -> Result<PathBuf, FileOpError> {
    let dest_dir = request
        .destination_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| FileOpError::MissingDestination(request.operation_type.clone()))?;
    Ok(Path::new(dest_dir).join(file_name))
}

/// 流式复制并按块发布进度
///
/// 已存在的目标文件被截断覆盖。复制完成后把源文件的访问/修改时间
/// 复制到目标文件。
#[allow(clippy::too_many_arguments)]
async fn copy_with_progress(
    operation_id: &str,
    src: &str,
    dest: &Path,
    file_name: &str,
    cumulative: f64,
    progress_per_file: f64,
    publisher: &Arc<EventPublisher<FileOpEvent>>,
    cancel: &CancellationToken,
) -> Result<(), FileOpError> {
    let mut source = tokio::fs::File::open(src).await?;
    let total_bytes = source.metadata().await?.len();
    let mut dest_file = tokio::fs::File::create(dest).await?;

    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut total_read = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(FileOpError::Cancelled);
        }
        let read = source.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        dest_file.write_all(&buffer[..read]).await?;
        total_read += read as u64;

        let file_fraction = if total_bytes == 0 {
            1.0
        } else {
            total_read as f64 / total_bytes as f64
        };
        publisher.publish(
            operation_id,
            FileOpEvent::Progress {
                operation_id: operation_id.to_string(),
                progress: cumulative + file_fraction * progress_per_file,
                current_file: file_name.to_string(),
            },
        );
    }
    dest_file.flush().await?;
    drop(dest_file);

    replicate_times(src, dest)?;
    Ok(())
}

/// 把源文件的访问/修改时间复制到目标文件
///
/// 创建时间无法跨平台设置，只复制可移植的两项。
fn replicate_times(src: &str, dest: &Path) -> Result<(), FileOpError> {
    let metadata = std::fs::metadata(src)?;
    let mut times = std::fs::FileTimes::new();
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    let dest_file = std::fs::OpenOptions::new().write(true).open(dest)?;
    dest_file.set_times(times)?;
    Ok(())
}
