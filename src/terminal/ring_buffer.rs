//! 终端输出环形缓冲区
//!
//! 固定容量的循环字节缓冲区，记录最近 N 字节的终端输出。
//! 客户端断线重连时用快照回放错过的输出。
//!
//! ## 不变式
//! - `len <= capacity` 恒成立
//! - 溢出时先淘汰最旧的字节（FIFO），不阻塞、不扩容
//! - 单次写入超过容量时只保留末尾 `capacity` 字节

/// 环形缓冲区
///
/// 由所属会话通过 `Arc<Mutex<_>>` 在读取线程（唯一写者）和
/// attach 时的快照读者之间共享。
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// 最旧字节在 `data` 中的下标
    start: usize,
    /// 当前有效字节数
    len: usize,
}

impl RingBuffer {
    /// 创建指定容量的缓冲区
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            capacity,
            start: 0,
            len: 0,
        }
    }

    /// 追加一段字节，必要时淘汰最旧的数据
    pub fn append(&mut self, bytes: &[u8]) {
        if self.capacity == 0 || bytes.is_empty() {
            return;
        }

        // 单次写入超过容量：重置为末尾 capacity 字节
        if bytes.len() >= self.capacity {
            let tail = &bytes[bytes.len() - self.capacity..];
            self.data.copy_from_slice(tail);
            self.start = 0;
            self.len = self.capacity;
            return;
        }

        // 先淘汰将被覆盖的最旧字节
        let overflow = (self.len + bytes.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.start = (self.start + overflow) % self.capacity;
            self.len -= overflow;
        }

        // 从逻辑末尾开始写入，处理回绕
        let mut write_pos = (self.start + self.len) % self.capacity;
        for &b in bytes {
            self.data[write_pos] = b;
            write_pos = (write_pos + 1) % self.capacity;
        }
        self.len += bytes.len();
    }

    /// 按时间顺序复制当前有效窗口
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        let first_run = (self.capacity - self.start).min(self.len);
        out.extend_from_slice(&self.data[self.start..self.start + first_run]);
        if first_run < self.len {
            out.extend_from_slice(&self.data[..self.len - first_run]);
        }
        out
    }

    /// 当前有效字节数
    pub fn len(&self) -> usize {
        self.len
    }

    /// 缓冲区是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 缓冲区容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
