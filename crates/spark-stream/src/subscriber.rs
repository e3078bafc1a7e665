//! 把数据项转写到数据汇的订阅者，以及它对协议的合规状态机。
//!
//! # 教案级导览
//! - **Why**：消费侧需要镜像发布侧的协议约束：只接受第一条订阅、终态后所有回调静默、
//!   写入失败不得把异常抛回排空线程；
//! - **How**：订阅通过 [`OnceLock`] 至多存储一次；终态标志通过比较交换单调跃迁，
//!   只有赢得跃迁的回调才会记录结果，从而保证并发终止信号只被处理一次；
//! - **What**：订阅建立后立即请求无界需求，完成时刷新并关闭数据汇，结果可通过
//!   [`SinkSubscriber::outcome`] 查询。

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

#[cfg(not(any(loom, spark_loom)))]
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(any(loom, spark_loom))]
use loom::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    demand::DemandCounter,
    error::{ProtocolViolation, StreamError},
    io::ItemSink,
    protocol::{Subscriber, Subscription},
};

/// 订阅者进入终态的原因。
#[derive(Debug)]
pub enum Outcome {
    /// 数据源正常耗尽，数据汇已刷新并关闭。
    Completed,
    /// 收到终止错误，或完成时关闭数据汇失败。
    Failed(StreamError),
    /// 订阅者主动取消了订阅，流被截断。
    Truncated { cause: StreamError },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// 导致非正常结束的错误。
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Outcome::Completed => None,
            Outcome::Failed(error) | Outcome::Truncated { cause: error } => Some(error),
        }
    }
}

/// 以 [`ItemSink`] 为终点的订阅者。
///
/// # 契约说明（What）
/// - **前置条件**：调用方需在流结束前持有 `Arc<SinkSubscriber>`，发布者只保留弱引用；
/// - **后置条件**：进入终态后 `outcome()` 返回 `Some`，此后所有回调均为空操作；
/// - 数据汇仅在完成时释放；出错或截断时由 `Drop` 回收。
pub struct SinkSubscriber<K: ItemSink> {
    sink: Mutex<Option<K>>,
    subscription: OnceLock<Arc<dyn Subscription>>,
    terminal: AtomicBool,
    outcome: OnceLock<Outcome>,
    written: AtomicU64,
}

impl<K: ItemSink> SinkSubscriber<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            subscription: OnceLock::new(),
            terminal: AtomicBool::new(false),
            outcome: OnceLock::new(),
            written: AtomicU64::new(0),
        }
    }

    /// 终态结果；流尚未结束时返回 `None`。
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    /// 已成功写入数据汇的数据项数量。
    pub fn items_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    fn enter_terminal(&self) -> bool {
        self.terminal
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn record(&self, outcome: Outcome) {
        // 只有赢得终态跃迁的一方会走到这里，`set` 不会失败。
        let _ = self.outcome.set(outcome);
    }
}

impl<K: ItemSink> Subscriber<K::Item> for SinkSubscriber<K> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.is_terminal() {
            return;
        }
        match self.subscription.set(subscription) {
            Ok(()) => {
                if let Some(subscription) = self.subscription.get() {
                    subscription.request(DemandCounter::UNBOUNDED);
                }
            }
            Err(redundant) => {
                debug!(
                    violation = %ProtocolViolation::DuplicateSubscription,
                    "cancelling redundant subscription"
                );
                redundant.cancel();
            }
        }
    }

    fn on_next(&self, item: K::Item) {
        if self.is_terminal() {
            return;
        }
        let pushed = match self.sink.lock().as_mut() {
            Some(sink) => sink.push(item),
            None => return,
        };
        match pushed {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::AcqRel);
            }
            Err(cause) => {
                if !self.enter_terminal() {
                    return;
                }
                let cause = StreamError::SinkWrite(cause);
                warn!(
                    code = cause.code(),
                    error = %cause,
                    written = self.items_written(),
                    "sink write failed, cancelling subscription"
                );
                self.record(Outcome::Truncated { cause });
                if let Some(subscription) = self.subscription.get() {
                    subscription.cancel();
                }
            }
        }
    }

    fn on_error(&self, cause: StreamError) {
        if !self.enter_terminal() {
            debug!(error = %cause, "error signal ignored after terminal state");
            return;
        }
        error!(
            code = cause.code(),
            error = %cause,
            written = self.items_written(),
            "stream terminated with error"
        );
        self.record(Outcome::Failed(cause));
    }

    fn on_complete(&self) {
        if !self.enter_terminal() {
            return;
        }
        let released = match self.sink.lock().take() {
            Some(mut sink) => sink.release(),
            None => Ok(()),
        };
        match released {
            Ok(()) => {
                debug!(written = self.items_written(), "stream completed");
                self.record(Outcome::Completed);
            }
            Err(cause) => {
                let cause = StreamError::ResourceRelease(cause);
                warn!(code = cause.code(), error = %cause, "failed to release sink");
                self.record(Outcome::Failed(cause));
            }
        }
    }
}
