//! 基于数据源工厂的发布者，以及承载需求记账与排空循环的订阅实现。
//!
//! # 设计总览（Why）
//! - 每个订阅者独占一个新鲜的数据源实例，发布者本身无共享可变状态；
//! - 订阅内部的跨线程状态只有两个原子量：需求计数器，以及把“已终止”“排空者正在拉取”
//!   “释放失败需上报”合并在一起的状态字。数据源放在槽位里，但谁有权释放它由状态字上的
//!   单次读改写决定，因此 `cancel` 从不等待一次可能无限阻塞的 `pull`；
//! - 向下游发信号时绝不持锁，`on_next` 内部重入 `request`/`cancel` 不会死锁。
//!
//! # 排空算法（How）
//! - `request(n)` 将 `n` 累加进计数器，拿到旧值为零的线程成为唯一排空者；
//! - 有界模式维护私有计数 `emitted`，达到目标后重读实时计数：相等则扣减并在归零时退出，
//!   更大则直接扩展目标继续排空。下游在回调中同步追加的需求只会抬高计数器，
//!   由当前排空者顺带消化，不产生递归，也不会丢失唤醒；
//! - 无界模式从不扣减计数器，一直拉取到取消、耗尽或失败为止；
//! - 任何一次拉取以终止收尾（耗尽、失败、槽位已释放、拉取期间被取消）时，两种模式都立即退出。

use std::{
    io, mem,
    ops::ControlFlow,
    sync::{Arc, Weak, atomic::AtomicU64},
};

use parking_lot::Mutex;
use tracing::{debug, warn};

#[cfg(not(any(loom, spark_loom)))]
use core::sync::atomic::{AtomicU8, Ordering};
#[cfg(any(loom, spark_loom))]
use loom::sync::atomic::{AtomicU8, Ordering};

use crate::{
    demand::DemandCounter,
    error::{StreamError, codes},
    io::ItemSource,
    protocol::{Publisher, Subscriber, Subscription},
};

/// 进程内唯一的订阅编号，仅用于日志关联，不参与协议语义。
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// 订阅已进入终态，单调置位。
const CANCELLED: u8 = 0b001;
/// 排空者正持有数据源执行 `pull`。
const PULLING: u8 = 0b010;
/// 终止来自显式 `cancel`：释放失败需要上报给订阅者。
const REPORT_RELEASE: u8 = 0b100;

/// 为每个订阅者打开独立数据源的发布者。
///
/// # 契约说明（What）
/// - `factory` 每次订阅调用一次；返回 `Err` 视为“源不可用”；
/// - 无论工厂成功与否，`on_subscribe` 都恰好送达一次；工厂失败时随后送达一个
///   [`StreamError::SourceUnavailable`] 终止信号，订阅者永远观测到 `on_subscribe → 终止` 的顺序；
/// - 发布者只保存订阅者的弱引用，订阅者被丢弃后订阅静默终止并释放数据源。
///
/// ```no_run
/// use std::{fs::File, sync::Arc};
/// use spark_stream::{Publisher, ReadSource, SinkSubscriber, SourcePublisher, WriteSink};
///
/// let publisher = SourcePublisher::new(|| File::open("input.bin").map(ReadSource::new));
/// let subscriber = Arc::new(SinkSubscriber::new(WriteSink::new(Vec::new())));
/// publisher.subscribe(subscriber.clone());
/// assert!(subscriber.outcome().is_some_and(|outcome| outcome.is_completed()));
/// ```
pub struct SourcePublisher<F> {
    factory: F,
}

impl<F> SourcePublisher<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, S> Publisher<S::Item> for SourcePublisher<F>
where
    F: Fn() -> io::Result<S> + Send + Sync,
    S: ItemSource + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<S::Item>>) {
        let slot = match (self.factory)() {
            Ok(source) => SourceSlot::Open(source),
            Err(cause) => SourceSlot::Unavailable(Some(cause)),
        };
        let unavailable = matches!(slot, SourceSlot::Unavailable(_));
        let subscription = Arc::new(SourceSubscription::new(slot, Arc::downgrade(&subscriber)));
        debug!(
            subscription = subscription.id,
            unavailable, "subscription created"
        );

        subscriber.on_subscribe(subscription.clone());
        if unavailable {
            subscription.fail_unavailable();
        }
    }
}

enum SourceSlot<S> {
    Open(S),
    /// 工厂失败；原因在第一次终止时被取走。
    Unavailable(Option<io::Error>),
    Released,
}

enum Pulled<T> {
    Item(T),
    Exhausted,
    Failed(StreamError),
    Released,
}

/// 单个订阅者与其独占数据源之间的订阅。
///
/// # 状态字（What）
/// - `CANCELLED` 单调置位，只有通过读改写赢得这一跃迁的一方才有资格发送终止信号，
///   从而保证终止信号至多一个；
/// - `PULLING` 由排空者在每次 `pull` 前后置位、清除。终止者若发现它已置位，就把释放
///   交给排空者，排空者在清除 `PULLING` 时看到 `CANCELLED` 便负责释放；
/// - 两个决定都落在同一原子量的读改写上，全序保证数据源恰好被一方释放，且槽位锁
///   只会在无人拉取时被短暂获取。
struct SourceSubscription<S: ItemSource> {
    id: u64,
    source: Mutex<SourceSlot<S>>,
    subscriber: Weak<dyn Subscriber<S::Item>>,
    requested: DemandCounter,
    state: AtomicU8,
}

impl<S: ItemSource> SourceSubscription<S> {
    fn new(source: SourceSlot<S>, subscriber: Weak<dyn Subscriber<S::Item>>) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            source: Mutex::new(source),
            subscriber,
            requested: DemandCounter::new(),
            state: AtomicU8::new(0),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) & CANCELLED != 0
    }

    /// 尝试进入终态。
    ///
    /// 返回 `None` 表示已有他人终止；`Some(deferred)` 表示赢得跃迁，`deferred` 为真时
    /// 排空者正在拉取，释放由它完成。
    fn terminate(&self, extra: u8) -> Option<bool> {
        let previous = self.state.fetch_or(CANCELLED | extra, Ordering::AcqRel);
        if previous & CANCELLED != 0 {
            return None;
        }
        Some(previous & PULLING != 0)
    }

    fn begin_pull(&self) -> bool {
        self.state
            .compare_exchange(0, PULLING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 结束一次拉取；若拉取期间订阅被终止，返回释放失败是否需要上报。
    fn end_pull(&self) -> Option<bool> {
        let previous = self.state.fetch_and(!PULLING, Ordering::AcqRel);
        (previous & CANCELLED != 0).then_some(previous & REPORT_RELEASE != 0)
    }

    fn drain_unbounded(&self) {
        debug!(subscription = self.id, mode = "unbounded", "drain started");
        while !self.is_cancelled() {
            if self.pull_next().is_break() {
                return;
            }
        }
    }

    fn drain_bounded(&self, n: i64) {
        debug!(
            subscription = self.id,
            mode = "bounded",
            demand = n,
            "drain started"
        );
        let mut emitted = 0i64;
        let mut remaining = n;
        while !self.is_cancelled() {
            while emitted < remaining {
                if self.is_cancelled() || self.pull_next().is_break() {
                    return;
                }
                emitted += 1;
            }

            let current = self.requested.get();
            if emitted == current {
                remaining = self.requested.add_and_get(-emitted);
                if remaining == 0 {
                    return;
                }
                emitted = 0;
            } else {
                // 排空期间又有新需求到达：先扩展目标，稍后一并扣减。
                remaining = current;
            }
        }
    }

    /// 拉取并派发一个数据项；只有成功送达 `on_next` 才允许排空继续。
    fn pull_next(&self) -> ControlFlow<()> {
        if !self.begin_pull() {
            return ControlFlow::Break(());
        }
        let pulled = self.pull_from_slot();
        if let Some(report) = self.end_pull() {
            // 拉取期间被终止，终止者已把释放交给本线程；拉到的数据项丢弃。
            if report {
                self.release_reporting();
            } else {
                self.release_quietly();
            }
            return ControlFlow::Break(());
        }
        match pulled {
            Pulled::Item(item) => match self.subscriber.upgrade() {
                Some(subscriber) => {
                    subscriber.on_next(item);
                    ControlFlow::Continue(())
                }
                None => {
                    self.abandon();
                    ControlFlow::Break(())
                }
            },
            Pulled::Exhausted => {
                self.complete();
                ControlFlow::Break(())
            }
            Pulled::Failed(error) => {
                self.fail(error);
                ControlFlow::Break(())
            }
            Pulled::Released => ControlFlow::Break(()),
        }
    }

    fn pull_from_slot(&self) -> Pulled<S::Item> {
        let mut slot = self.source.lock();
        match &mut *slot {
            SourceSlot::Open(source) => match source.pull() {
                Ok(Some(item)) => Pulled::Item(item),
                Ok(None) => Pulled::Exhausted,
                Err(error) => Pulled::Failed(StreamError::SourceRead(error)),
            },
            SourceSlot::Unavailable(cause) => Pulled::Failed(StreamError::SourceUnavailable {
                cause: cause.take(),
            }),
            SourceSlot::Released => Pulled::Released,
        }
    }

    fn complete(&self) {
        let Some(deferred) = self.terminate(0) else {
            return;
        };
        debug!(subscription = self.id, "source exhausted, completing");
        if let Some(subscriber) = self.subscriber.upgrade() {
            subscriber.on_complete();
        }
        if !deferred {
            self.release_quietly();
        }
    }

    fn fail(&self, error: StreamError) {
        let Some(deferred) = self.terminate(0) else {
            return;
        };
        warn!(
            subscription = self.id,
            code = error.code(),
            %error,
            "subscription terminated with error"
        );
        if let Some(subscriber) = self.subscriber.upgrade() {
            subscriber.on_error(error);
        }
        if !deferred {
            self.release_quietly();
        }
    }

    fn fail_unavailable(&self) {
        let cause = match &mut *self.source.lock() {
            SourceSlot::Unavailable(cause) => cause.take(),
            _ => None,
        };
        self.fail(StreamError::SourceUnavailable { cause });
    }

    /// 订阅者已被丢弃：无人可通知，直接终止并归还数据源。
    fn abandon(&self) {
        let Some(deferred) = self.terminate(0) else {
            return;
        };
        debug!(subscription = self.id, "subscriber dropped, abandoning");
        if !deferred {
            self.release_quietly();
        }
    }

    fn release(&self) -> io::Result<()> {
        let slot = mem::replace(&mut *self.source.lock(), SourceSlot::Released);
        match slot {
            SourceSlot::Open(mut source) => source.release(),
            SourceSlot::Unavailable(_) | SourceSlot::Released => Ok(()),
        }
    }

    /// 终止信号已经送达后的释放：失败只记录日志，不再产生第二个终止信号。
    fn release_quietly(&self) {
        if let Err(error) = self.release() {
            warn!(
                subscription = self.id,
                code = codes::RELEASE_FAILED,
                %error,
                "failed to release item source"
            );
        }
    }

    /// 显式取消后的释放：失败作为 [`StreamError::ResourceRelease`] 送达仍可达的订阅者。
    fn release_reporting(&self) {
        if let Err(error) = self.release() {
            let error = StreamError::ResourceRelease(error);
            warn!(
                subscription = self.id,
                code = error.code(),
                %error,
                "failed to release item source on cancel"
            );
            if let Some(subscriber) = self.subscriber.upgrade() {
                subscriber.on_error(error);
            }
        }
    }
}

impl<S: ItemSource + 'static> Subscription for SourceSubscription<S> {
    fn request(&self, n: i64) {
        if self.is_cancelled() {
            return;
        }
        if n <= 0 {
            self.fail(StreamError::non_positive_demand(n));
            return;
        }
        if self.requested.get_and_add(n) == 0 {
            if n == DemandCounter::UNBOUNDED {
                self.drain_unbounded();
            } else {
                self.drain_bounded(n);
            }
        }
    }

    /// 幂等取消，从不阻塞。
    ///
    /// 若排空者正阻塞在 `pull` 中，释放推迟到该次拉取返回时由排空者完成。
    /// 释放数据源失败时，错误会作为 [`StreamError::ResourceRelease`] 送达仍可达的订阅者。
    /// 这是对“取消后不再发信号”的有意放宽：静默吞掉释放失败会让调用方无从得知资源泄漏。
    fn cancel(&self) {
        match self.terminate(REPORT_RELEASE) {
            None => {}
            Some(true) => {
                debug!(
                    subscription = self.id,
                    "subscription cancelled, release deferred to drainer"
                );
            }
            Some(false) => {
                debug!(subscription = self.id, "subscription cancelled");
                self.release_reporting();
            }
        }
    }
}
