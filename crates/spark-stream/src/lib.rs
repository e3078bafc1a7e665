//! # spark-stream
//!
//! ## 定位与职责（Why）
//! - 以最小的发布者/订阅者对，在拉取式背压协议下逐项传输字节：订阅者声明能吸收多少，
//!   发布者发射不超过该数量的数据项；
//! - 协议的并发难点（递归重入、丢失唤醒、重复发射）全部集中在订阅的需求记账与排空循环中，
//!   其余部分只是数据源/数据汇的胶水层。
//!
//! ## 模块结构（Where）
//! - [`demand`]：饱和需求计数器，唯一的同步原语；
//! - [`protocol`]：`Publisher`/`Subscriber`/`Subscription` 三个能力接口；
//! - [`publisher`]：基于数据源工厂的发布者与排空算法；
//! - [`subscriber`]：把数据项写入数据汇的订阅者状态机；
//! - [`io`]：`Read`/`Write` 设备到数据源/数据汇的适配；
//! - [`error`]：统一的终止错误与稳定错误码；
//! - `config`（`config` 特性）：`spark-pipe` 工具的 TOML 配置。
//!
//! ## 非目标（Trade-offs）
//! - 不做多项批量发射、不在一个数据源上复用多个订阅者、不提供单一整数需求之外的流控。

pub mod demand;
pub mod error;
pub mod io;
pub mod protocol;
pub mod publisher;
pub mod subscriber;

#[cfg(feature = "config")]
pub mod config;

pub use demand::DemandCounter;
pub use error::{ProtocolViolation, StreamError};
pub use io::{ItemSink, ItemSource, ReadSource, WriteSink};
pub use protocol::{Publisher, Subscriber, Subscription};
pub use publisher::SourcePublisher;
pub use subscriber::{Outcome, SinkSubscriber};
