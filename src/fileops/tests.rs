//! 文件操作模块单元测试
//!
//! ## 测试覆盖
//! - 端到端删除场景（进度顺序 + 文件系统副作用）
//! - 进度单调性
//! - 同 ID 至多一个运行
//! - 复制中途取消（终态唯一、不回滚）
//! - 未知 ID 取消 / 未知操作类型
//! - 覆盖写策略与时间戳复制

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use crate::events::EventPublisher;
    use crate::fileops::engine::FileOperationRequest;
    use crate::fileops::error::FileOpError;
    use crate::fileops::events::FileOpEvent;
    use crate::fileops::registry::FileOperationRegistry;

    fn new_registry() -> FileOperationRegistry {
        FileOperationRegistry::new(Arc::new(EventPublisher::new()))
    }

    fn request<P: AsRef<std::path::Path>>(
        operation_id: &str,
        operation_type: &str,
        sources: &[P],
        destination: Option<&std::path::Path>,
    ) -> FileOperationRequest {
        FileOperationRequest {
            operation_id: Some(operation_id.to_string()),
            source_paths: sources
                .iter()
                .map(|p| p.as_ref().to_string_lossy().into_owned())
                .collect(),
            destination_path: destination.map(|p| p.to_string_lossy().into_owned()),
            operation_type: operation_type.to_string(),
        }
    }

    /// 收集事件直到终态事件（含）
    async fn collect_until_terminal(
        rx: &mut broadcast::Receiver<FileOpEvent>,
    ) -> Vec<FileOpEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("等待事件超时")
                .expect("事件通道意外关闭");
            let done = event.is_terminal();
            events.push(event);
            if done {
                return events;
            }
        }
    }

    // ========================================================================
    // 端到端场景
    // ========================================================================

    #[tokio::test]
    async fn test_delete_two_files_progress_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "aaa").unwrap();
        std::fs::write(&b, "bbb").unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-delete");
        registry
            .try_start(request("op-delete", "delete", &[&a, &b], None))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(events.len(), 3);
        match &events[0] {
            FileOpEvent::Progress {
                progress,
                current_file,
                ..
            } => {
                assert!((progress - 50.0).abs() < 1e-9);
                assert_eq!(current_file, "a.txt");
            }
            other => panic!("第一个事件应为进度: {:?}", other),
        }
        match &events[1] {
            FileOpEvent::Progress {
                progress,
                current_file,
                ..
            } => {
                assert!((progress - 100.0).abs() < 1e-9);
                assert_eq!(current_file, "b.txt");
            }
            other => panic!("第二个事件应为进度: {:?}", other),
        }
        assert!(matches!(&events[2], FileOpEvent::Completed { .. }));
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn test_empty_source_list_completes_immediately() {
        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-empty");
        registry
            .try_start(request::<&std::path::Path>("op-empty", "copy", &[], None))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FileOpEvent::Completed { .. }));
    }

    // ========================================================================
    // 进度单调性
    // ========================================================================

    #[tokio::test]
    async fn test_copy_progress_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let mut sources = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("f{}.bin", i));
            // 超过一个块，保证每个文件有多次进度
            std::fs::write(&path, vec![i as u8; 200 * 1024]).unwrap();
            sources.push(path);
        }
        let source_refs: Vec<&std::path::Path> = sources.iter().map(|p| p.as_path()).collect();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-mono");
        registry
            .try_start(request("op-mono", "copy", &source_refs, Some(dest.path())))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        let values: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                FileOpEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();

        assert!(!values.is_empty());
        for pair in values.windows(2) {
            assert!(pair[1] >= pair[0], "进度出现回退: {:?}", pair);
        }
        assert!((values.last().unwrap() - 100.0).abs() < 1e-9);
        assert!(matches!(events.last().unwrap(), FileOpEvent::Completed { .. }));

        for (i, src) in sources.iter().enumerate() {
            let copied = dest.path().join(src.file_name().unwrap());
            assert_eq!(
                std::fs::read(&copied).unwrap(),
                vec![i as u8; 200 * 1024],
                "复制内容不一致"
            );
        }
    }

    // ========================================================================
    // 同 ID 至多一个运行
    // ========================================================================

    #[tokio::test]
    async fn test_duplicate_operation_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        std::fs::write(&big, vec![7u8; 2 * 1024 * 1024]).unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-dup");
        registry
            .try_start(request("op-dup", "copy", &[&big], Some(dest.path())))
            .unwrap();

        // 第一次运行仍在任务表中，同 ID 再次启动被拒绝
        let second = registry.try_start(request("op-dup", "copy", &[&big], Some(dest.path())));
        assert!(matches!(second, Err(FileOpError::OperationConflict(_))));
        assert_eq!(registry.running_count(), 1);

        // 只观察到一次 completed
        let events = collect_until_terminal(&mut rx).await;
        let completed = events
            .iter()
            .filter(|e| matches!(e, FileOpEvent::Completed { .. }))
            .count();
        assert_eq!(completed, 1);

        // 运行结束后条目被移除，同 ID 可以再次使用
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.running_count(), 0);
    }

    // ========================================================================
    // 取消
    // ========================================================================

    #[tokio::test]
    async fn test_cancel_mid_copy_leaves_partial_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        // 100+ 个复制块，留足取消窗口
        std::fs::write(&big, vec![3u8; 8 * 1024 * 1024]).unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-cancel");
        registry
            .try_start(request("op-cancel", "copy", &[&big], Some(dest.path())))
            .unwrap();

        // 观察到第一块进度后触发取消
        let first = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, FileOpEvent::Progress { .. }));
        assert!(registry.cancel("op-cancel"));

        let events = collect_until_terminal(&mut rx).await;
        let cancelled = events
            .iter()
            .filter(|e| matches!(e, FileOpEvent::Cancelled { .. }))
            .count();
        assert_eq!(cancelled, 1, "应恰好一个 cancelled 终态");
        // 终态即最后一个事件，其后无进度
        assert!(matches!(events.last().unwrap(), FileOpEvent::Cancelled { .. }));
        assert!(rx.try_recv().is_err(), "终态之后不应再有事件");

        // 不回滚：部分写入的目标文件保留
        let partial = dest.path().join("big.bin");
        assert!(partial.exists());
        assert!(std::fs::metadata(&partial).unwrap().len() < 8 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_cancel_before_first_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("victim.txt");
        std::fs::write(&target, "keep me").unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-precancel");
        registry
            .try_start(request("op-precancel", "delete", &[&target], None))
            .unwrap();
        // 单线程测试运行时下引擎尚未被轮询，取消先于第一个检查点
        assert!(registry.cancel("op-precancel"));

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FileOpEvent::Cancelled { .. }));
        assert!(target.exists(), "取消后文件不应被删除");
    }

    #[tokio::test]
    async fn test_cancel_unknown_id() {
        let registry = new_registry();
        let mut rx = registry.publisher().subscribe_all();

        assert!(!registry.cancel("no-such-id"));
        assert!(rx.try_recv().is_err(), "未知 ID 取消不应发布任何事件");
    }

    // ========================================================================
    // 错误路径
    // ========================================================================

    #[tokio::test]
    async fn test_unsupported_operation_type() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("x.txt");
        std::fs::write(&f, "x").unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-bad-type");
        registry
            .try_start(request("op-bad-type", "serverTransfer", &[&f], None))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            FileOpEvent::Error { message, .. } => {
                assert!(message.contains("不支持的操作类型"));
                assert!(message.contains("serverTransfer"));
            }
            other => panic!("应为 error 终态: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_stops_batch_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let missing = dir.path().join("missing.txt");
        let third = dir.path().join("third.txt");
        std::fs::write(&first, "1").unwrap();
        std::fs::write(&third, "3").unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-err");
        registry
            .try_start(request("op-err", "delete", &[&first, &missing, &third], None))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        match events.last().unwrap() {
            FileOpEvent::Error { file, .. } => {
                assert!(file.ends_with("missing.txt"));
            }
            other => panic!("应为 error 终态: {:?}", other),
        }
        // 出错前完成的文件不回滚，后续文件不再处理
        assert!(!first.exists());
        assert!(third.exists());
    }

    #[tokio::test]
    async fn test_copy_missing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("x.txt");
        std::fs::write(&f, "x").unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-nodest");
        registry
            .try_start(request("op-nodest", "copy", &[&f], None))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        match events.last().unwrap() {
            FileOpEvent::Error { message, .. } => {
                assert!(message.contains("缺少目标路径"));
            }
            other => panic!("应为 error 终态: {:?}", other),
        }
    }

    // ========================================================================
    // 覆盖写策略与剪切
    // ========================================================================

    #[tokio::test]
    async fn test_copy_overwrites_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.txt");
        std::fs::write(&src, "short").unwrap();
        // 预先存在的更长目标文件应被完整截断覆盖
        let existing = dest.path().join("doc.txt");
        std::fs::write(&existing, "previous much longer content").unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-overwrite");
        registry
            .try_start(request("op-overwrite", "copy", &[&src], Some(dest.path())))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        assert!(matches!(events.last().unwrap(), FileOpEvent::Completed { .. }));
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "short");
    }

    #[tokio::test]
    async fn test_cut_moves_file_and_replicates_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let src = dir.path().join("move-me.txt");
        std::fs::write(&src, "payload").unwrap();
        let src_modified = std::fs::metadata(&src).unwrap().modified().unwrap();

        let registry = new_registry();
        let mut rx = registry.publisher().subscribe("op-cut");
        registry
            .try_start(request("op-cut", "cut", &[&src], Some(dest.path())))
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        assert!(matches!(events.last().unwrap(), FileOpEvent::Completed { .. }));

        let moved = dest.path().join("move-me.txt");
        assert!(!src.exists(), "剪切后源文件应被删除");
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "payload");

        // 修改时间复制到目标（允许文件系统精度误差）
        let moved_modified = std::fs::metadata(&moved).unwrap().modified().unwrap();
        let delta = moved_modified
            .duration_since(src_modified)
            .unwrap_or_else(|e| e.duration());
        assert!(delta < Duration::from_secs(2), "修改时间未被复制");
    }
}
