//! 终端会话
//!
//! 封装单个 shell 进程：拥有它的输出环形缓冲区与连接状态，
//! 提供把一条 WebSocket 连接挂载到进程上的双向泵。
//!
//! ## 架构说明
//! 进程输出由一个专用读取线程持续拉取：写入环形缓冲区并广播给当前
//! 挂载的连接（若有）。连接断开不影响读取线程，缓冲区继续积累输出，
//! 重连时先回放快照再接续实时流。`connected` 与 `exited` 相互独立：
//! 会话可以存活但无连接（可恢复），也可以短暂地有连接但进程已退出
//! （随即被移除）。

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use super::error::TerminalError;
use super::ring_buffer::RingBuffer;
use super::shell::{ShellOptions, ShellProcess};

/// 输出历史缓冲区大小 (1MB)
const OUTPUT_BUFFER_CAPACITY: usize = 1024 * 1024;
/// 读取线程单次读取的块大小
const READ_CHUNK_SIZE: usize = 4096;
/// 输出广播通道容量（块数）
const OUTPUT_CHANNEL_CAPACITY: usize = 512;

/// 挂载连接上的文本控制帧
///
/// 匹配失败的文本帧按原始字节转发给 shell，二进制帧永远是原始输入。
#[derive(Debug, Deserialize)]
struct ControlFrame {
    resize: ResizeRequest,
}

/// 调整终端大小请求
#[derive(Debug, Deserialize)]
struct ResizeRequest {
    cols: u16,
    rows: u16,
}

/// 终端会话
pub struct TerminalSession {
    /// 会话 ID
    id: String,
    /// shell 进程
    shell: ShellProcess,
    /// 输出历史缓冲区
    buffer: Arc<Mutex<RingBuffer>>,
    /// 是否有连接挂载中
    connected: AtomicBool,
    /// 进程是否已退出
    exited: Arc<AtomicBool>,
    /// 输出广播发送端（进程退出后置空，订阅方据此观察到流关闭）
    output_tx: Arc<Mutex<Option<broadcast::Sender<Vec<u8>>>>>,
}

impl TerminalSession {
    /// 创建会话并启动输出读取线程
    ///
    /// 返回会话本体和一次性退出通知：进程结束时携带可选错误信息触发，
    /// 注册表订阅它完成自动移除。创建失败不留下任何后台资源。
    pub fn new(
        id: String,
        options: &ShellOptions,
    ) -> Result<(Arc<Self>, oneshot::Receiver<Option<String>>), TerminalError> {
        let shell = ShellProcess::spawn(options)?;
        let reader = shell
            .take_reader()
            .ok_or_else(|| TerminalError::Internal("输出读取端已被取走".to_string()))?;

        let buffer = Arc::new(Mutex::new(RingBuffer::new(OUTPUT_BUFFER_CAPACITY)));
        let exited = Arc::new(AtomicBool::new(false));
        let (output_sender, _) = broadcast::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
        let output_tx = Arc::new(Mutex::new(Some(output_sender.clone())));
        let (exit_tx, exit_rx) = oneshot::channel();

        Self::spawn_reader_thread(
            id.clone(),
            reader,
            buffer.clone(),
            exited.clone(),
            output_tx.clone(),
            output_sender,
            exit_tx,
        );

        let session = Arc::new(Self {
            id,
            shell,
            buffer,
            connected: AtomicBool::new(false),
            exited,
            output_tx,
        });

        Ok((session, exit_rx))
    }

    /// 启动输出读取线程
    ///
    /// PTY 读取是阻塞调用，放在独立线程而非 tokio 任务上。
    fn spawn_reader_thread(
        id: String,
        mut reader: Box<dyn Read + Send>,
        buffer: Arc<Mutex<RingBuffer>>,
        exited: Arc<AtomicBool>,
        shared_tx: Arc<Mutex<Option<broadcast::Sender<Vec<u8>>>>>,
        sender: broadcast::Sender<Vec<u8>>,
        exit_tx: oneshot::Sender<Option<String>>,
    ) {
        std::thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let failure = loop {
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        tracing::info!("[终端] 会话 {} 进程已退出", id);
                        break None;
                    }
                    Ok(n) => {
                        // 持有缓冲区锁发送，保证快照顺序与实时流顺序一致
                        let mut guard = buffer.lock();
                        guard.append(&chunk[..n]);
                        let _ = sender.send(chunk[..n].to_vec());
                    }
                    Err(e) => {
                        // kill 之后的读取错误等同于正常退出
                        if exited.load(Ordering::SeqCst) {
                            break None;
                        }
                        tracing::error!("[终端] 会话 {} 读取错误: {}", id, e);
                        break Some(e.to_string());
                    }
                }
            };

            exited.store(true, Ordering::SeqCst);
            // 清空共享发送端并连同本地克隆一起丢弃，关闭广播通道
            shared_tx.lock().take();
            drop(sender);
            let _ = exit_tx.send(failure);
        });
    }

    /// 会话 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 是否有连接挂载中
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 进程是否已退出
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// 强制终止底层进程（读取线程随后观察到 EOF 并触发退出通知）
    pub fn kill(&self) {
        self.exited.store(true, Ordering::SeqCst);
        self.shell.kill();
    }

    /// 挂载一条 WebSocket 连接并运行双向泵直到任一侧关闭
    ///
    /// 同一会话同时只允许一条连接；竞争到的第二次挂载返回
    /// [`TerminalError::AlreadyAttached`]。挂载后先回放缓冲区快照，
    /// 再启动输出泵（进程 → 连接）与输入泵（连接 → 进程），二者共享
    /// 一个取消信号，任一侧终止即联动拆除另一侧。
    pub async fn attach(&self, socket: WebSocket) -> Result<(), TerminalError> {
        self.claim_connection()?;

        tracing::info!("[终端] 会话 {} 连接挂载", self.id);
        let result = self.run_pumps(socket).await;
        self.release_connection();
        tracing::info!("[终端] 会话 {} 连接分离", self.id);
        result
    }

    /// 原子占用连接位
    ///
    /// 已退出的会话返回 [`TerminalError::SessionExited`]；
    /// 竞争失败返回 [`TerminalError::AlreadyAttached`]。
    pub(crate) fn claim_connection(&self) -> Result<(), TerminalError> {
        if self.has_exited() {
            return Err(TerminalError::SessionExited(self.id.clone()));
        }
        self.connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TerminalError::AlreadyAttached(self.id.clone()))?;
        Ok(())
    }

    /// 释放连接位，会话回到可恢复状态
    pub(crate) fn release_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// 在缓冲区锁内同时取快照和订阅
    ///
    /// 快照与订阅点之间不可能有输出写入，回放流与实时流正好衔接，
    /// 无漏块也无重复块。
    pub(crate) fn snapshot_and_subscribe(
        &self,
    ) -> Result<(Vec<u8>, broadcast::Receiver<Vec<u8>>), TerminalError> {
        let buffer = self.buffer.lock();
        let tx_guard = self.output_tx.lock();
        let sender = tx_guard
            .as_ref()
            .ok_or_else(|| TerminalError::SessionExited(self.id.clone()))?;
        Ok((buffer.snapshot(), sender.subscribe()))
    }

    async fn run_pumps(&self, socket: WebSocket) -> Result<(), TerminalError> {
        let (snapshot, output_rx) = self.snapshot_and_subscribe()?;

        let (mut ws_tx, mut ws_rx) = socket.split();

        if !snapshot.is_empty() && ws_tx.send(Message::Binary(snapshot)).await.is_err() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let output_pump = tokio::spawn(run_output_pump(
            output_rx,
            ws_tx,
            cancel.clone(),
            self.id.clone(),
        ));

        // 输入泵：连接 → 进程输入，在当前任务内运行
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if self.shell.write(&data).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_text_frame(&text) {
                            tracing::warn!("[终端] 会话 {} 输入处理失败: {}", self.id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong 由 axum 处理
                    Some(Err(e)) => {
                        tracing::debug!("[终端] 会话 {} 连接错误: {}", self.id, e);
                        break;
                    }
                },
            }
        }
        cancel.cancel();
        let _ = output_pump.await;

        Ok(())
    }

    /// 文本帧：resize 控制帧或普通输入
    fn handle_text_frame(&self, text: &str) -> Result<(), TerminalError> {
        if let Ok(frame) = serde_json::from_str::<ControlFrame>(text) {
            tracing::debug!(
                "[终端] 会话 {} 调整大小为 {}x{}",
                self.id,
                frame.resize.cols,
                frame.resize.rows
            );
            return self.shell.resize(frame.resize.rows, frame.resize.cols);
        }
        self.shell.write(text.as_bytes())
    }

    /// 当前缓冲的输出快照（诊断用）
    pub fn buffered_output(&self) -> Vec<u8> {
        self.buffer.lock().snapshot()
    }

    /// 直接向 shell 写入输入，不经过挂载的连接
    pub fn write_input(&self, data: &[u8]) -> Result<(), TerminalError> {
        self.shell.write(data)
    }
}

/// 输出泵：进程输出 → 连接
///
/// 慢连接不排队：发送失败直接拆泵；接收端落后（广播通道已丢弃最旧的块）
/// 同样拆泵，绝不转发带空洞的字节流。客户端重连后由环形缓冲区快照
/// 回放出完整的输出。
pub(crate) async fn run_output_pump<S>(
    mut rx: broadcast::Receiver<Vec<u8>>,
    mut ws_tx: S,
    cancel: CancellationToken,
    session_id: String,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(data) => {
                    if ws_tx.send(Message::Binary(data)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        "[终端] 会话 {} 输出泵落后 {} 块，拆除连接等待重连回放",
                        session_id,
                        n
                    );
                    break;
                }
                // 进程退出，广播通道关闭
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    cancel.cancel();
    let _ = ws_tx.send(Message::Close(None)).await;
}
