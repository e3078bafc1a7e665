//! 拉取式背压协议的三个能力接口。
//!
//! # 信令契约（What）
//! - `on_subscribe` 至多送达一次，且先于其他任何信号；
//! - `request(n)` 仅接受 `n > 0`，其余取值视为协议违规并以错误信号终止订阅；
//! - `on_next` 的累计次数不超过累计需求；排空者自身不会在终止信号之后再发 `on_next`（跨线程终止见下）；
//! - `on_complete` 与 `on_error` 至多送达其一，并且是最后一个信号；
//! - `cancel` 幂等、不阻塞，可在任意时刻调用；取消后唯一可能送达的信号是释放失败错误。
//!
//! # 线程模型（How）
//! - `request`/`cancel` 可被任意线程并发调用，也可在 `on_next` 回调内部同步重入；
//! - `on_next`、`on_complete` 与拉取失败引起的 `on_error` 只由当前排空者送达，彼此串行；
//! - 其他线程以非正需求触发的协议违规错误、或显式取消时的释放失败，由调用线程（释放被推迟时由拉取返回后的排空者）送达，
//!   可能与一次正在进行的 `on_next` 交错，并且其后至多还会有一次已在途的 `on_next`。
//!   需要严格串行的订阅者应像 `SinkSubscriber` 一样以终态标志过滤迟到的回调。
//!
//! 空订阅者、空订阅与空错误在 Rust 中不可表达：接口统一以 `Arc` 与按值传递约束，
//! 这类违规在编译期即被拒绝。

use std::sync::Arc;

use crate::error::StreamError;

/// 数据生产方。
pub trait Publisher<T>: Send + Sync {
    /// 为订阅者建立一条新的订阅，并通过 [`Subscriber::on_subscribe`] 告知对方。
    ///
    /// 发布者只持有订阅者的弱引用；调用方需要在流结束前保持订阅者存活。
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// 数据消费方。
pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, item: T);

    fn on_error(&self, error: StreamError);

    fn on_complete(&self);
}

/// 发布者与订阅者之间的一条需求通道。
pub trait Subscription: Send + Sync {
    /// 追加 `n` 个单位的需求；[`crate::DemandCounter::UNBOUNDED`] 表示无界需求。
    fn request(&self, n: i64);

    /// 请求停止发射并释放数据源。
    fn cancel(&self);
}
