//! 事件发布器
//!
//! 与传输层解耦的主题广播原语。终端子系统和文件操作子系统各持有一个实例，
//! 按主题（会话 ID / 操作 ID）向订阅者推送事件，另有一个跨主题的 `all` 通道。
//!
//! ## 语义
//! - 发布时没有订阅者不视为错误（fire and forget）
//! - 订阅者落后过多时按 broadcast 通道语义丢弃最旧的事件

use dashmap::DashMap;
use tokio::sync::broadcast;

/// 单个主题通道的缓冲容量
const TOPIC_CHANNEL_CAPACITY: usize = 256;

/// 全局主题名
pub const TOPIC_ALL: &str = "all";

/// 主题事件发布器
///
/// `T` 为事件载荷类型，按主题克隆分发。
pub struct EventPublisher<T: Clone> {
    /// 主题映射表（主题名 -> 广播发送端）
    topics: DashMap<String, broadcast::Sender<T>>,
    /// 跨主题通道，所有事件都会复制一份到这里
    all: broadcast::Sender<T>,
}

impl<T: Clone> Default for EventPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventPublisher<T> {
    /// 创建新的发布器
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(TOPIC_CHANNEL_CAPACITY);
        Self {
            topics: DashMap::new(),
            all,
        }
    }

    /// 发布事件到指定主题
    ///
    /// 事件同时复制到 `all` 通道。主题不存在或没有订阅者时静默丢弃。
    pub fn publish(&self, topic: &str, event: T) {
        if let Some(sender) = self.topics.get(topic) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event);
    }

    /// 订阅指定主题
    ///
    /// 主题为 [`TOPIC_ALL`] 时等价于 [`subscribe_all`](Self::subscribe_all)。
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<T> {
        if topic == TOPIC_ALL {
            return self.subscribe_all();
        }
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// 订阅所有主题的事件
    pub fn subscribe_all(&self) -> broadcast::Receiver<T> {
        self.all.subscribe()
    }

    /// 移除主题通道
    ///
    /// 在操作/会话结束、终态事件已发布后调用，防止主题表无界增长。
    pub fn remove_topic(&self, topic: &str) {
        self.topics.remove(topic);
    }

    /// 当前主题数量
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
