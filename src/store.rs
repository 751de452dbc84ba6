//! 内存点存储
//!
//! 只追加（除非显式删除/清空），保持追加顺序，不去重。每次变更后向订阅者
//! 发送通知；通知在持有写锁时发出，监听方不会看到追加到一半的状态。

use crate::types::Point;
use async_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// 存储变更通知
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEvent {
    Appended { dataset: String, count: usize, version: u64 },
    Removed { count: usize, version: u64 },
    Cleared { count: usize, version: u64 },
    /// 一批采集结束，可据此重新计算查询结果
    IngestionCompleted { version: u64 },
}

#[derive(Debug, Default)]
struct StoreInner {
    points: Vec<Point>,
    version: u64,
}

#[derive(Debug, Default)]
pub struct PointStore {
    inner: RwLock<StoreInner>,
    listeners: Mutex<Vec<Sender<StoreEvent>>>,
}

impl PointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅变更通知
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = async_channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    fn notify(&self, event: StoreEvent) {
        let mut listeners = self.listeners.lock();
        // 接收端已关闭的直接移除
        listeners.retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    pub fn append(&self, dataset: &str, points: Vec<Point>) -> usize {
        let count = points.len();
        if count == 0 {
            return 0;
        }
        let mut inner = self.inner.write();
        inner.points.extend(points);
        inner.version += 1;
        log::debug!(
            "[store] {} 追加 {} 个点，共 {} 个",
            dataset,
            count,
            inner.points.len()
        );
        self.notify(StoreEvent::Appended {
            dataset: dataset.to_string(),
            count,
            version: inner.version,
        });
        count
    }

    /// 删除满足条件的点，返回删除数量
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Point) -> bool,
    {
        let mut inner = self.inner.write();
        let before = inner.points.len();
        inner.points.retain(|p| !predicate(p));
        let removed = before - inner.points.len();
        if removed > 0 {
            inner.version += 1;
            self.notify(StoreEvent::Removed {
                count: removed,
                version: inner.version,
            });
        }
        removed
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.write();
        let count = inner.points.len();
        inner.points.clear();
        inner.version += 1;
        self.notify(StoreEvent::Cleared {
            count,
            version: inner.version,
        });
        count
    }

    pub fn mark_ingestion_completed(&self) {
        let inner = self.inner.read();
        self.notify(StoreEvent::IngestionCompleted {
            version: inner.version,
        });
    }

    /// 当前所有点的快照
    pub fn all(&self) -> Vec<Point> {
        self.inner.read().points.clone()
    }

    /// 在读锁内访问点集，避免复制
    pub fn with_points<T>(&self, f: impl FnOnce(&[Point]) -> T) -> T {
        f(&self.inner.read().points)
    }

    pub fn len(&self) -> usize {
        self.inner.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 每次变更加一
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }
}
