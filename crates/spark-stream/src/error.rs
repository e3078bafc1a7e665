//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义发布者、订阅与订阅者之间可能传递的全部终止错误；
//! - 每个变体对应一个稳定的点分错误码，便于日志检索与告警聚合。
//!
//! ## 传播策略（What）
//! - 协议违规与源不可用：作为终止错误送达订阅者，订阅随即取消；
//! - 源读取失败：以错误终止订阅；
//! - 汇写入失败：由订阅者本地消化（取消订阅并进入终态），不再向外抛出；
//! - 资源释放失败：若订阅者仍可达则上报，但绝不阻止取消本身生效。

use std::io;

use thiserror::Error;

pub(crate) mod codes {
    pub const PROTOCOL_VIOLATION: &str = "spark.stream.protocol_violation";
    pub const SOURCE_UNAVAILABLE: &str = "spark.stream.source_unavailable";
    pub const SOURCE_READ_FAILED: &str = "spark.stream.source_read_failed";
    pub const SINK_WRITE_FAILED: &str = "spark.stream.sink_write_failed";
    pub const RELEASE_FAILED: &str = "spark.stream.release_failed";
}

/// 调用方破坏信令契约的具体方式。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `request(n)` 的 `n` 必须为正数。
    #[error("non-cancelled subscription request must be positive, got {requested}")]
    NonPositiveDemand { requested: i64 },
    /// 订阅者已持有订阅时再次收到 `on_subscribe`。
    ///
    /// 该违规以静默取消冗余订阅的方式收敛，只出现在诊断日志中，不会作为错误信号送达。
    #[error("subscriber already holds an active subscription")]
    DuplicateSubscription,
}

/// 流终止错误。
///
/// # 教案式说明
/// - **意图 (Why)**：协议只允许一个终止信号，因此所有失败路径都收敛到同一枚举，经由
///   `Subscriber::on_error` 一次性送达；
/// - **契约 (What)**：I/O 相关变体保留底层 [`io::Error`] 作为 `source()`，可被 `anyhow` 等上层框架串联；
/// - **风险 (Trade-offs)**：`io::Error` 不可克隆，因此错误按值移交给订阅者，发布侧不保留副本。
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    /// 源工厂未能产出可用的数据源。
    #[error("item source unavailable")]
    SourceUnavailable {
        #[source]
        cause: Option<io::Error>,
    },

    #[error("item source read failed: {0}")]
    SourceRead(#[source] io::Error),

    #[error("item sink write failed: {0}")]
    SinkWrite(#[source] io::Error),

    /// 关闭源或汇时失败。
    #[error("resource release failed: {0}")]
    ResourceRelease(#[source] io::Error),
}

impl StreamError {
    /// 构造非正需求的协议违规错误。
    pub fn non_positive_demand(requested: i64) -> Self {
        ProtocolViolation::NonPositiveDemand { requested }.into()
    }

    /// 返回面向日志与告警的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::ProtocolViolation(_) => codes::PROTOCOL_VIOLATION,
            StreamError::SourceUnavailable { .. } => codes::SOURCE_UNAVAILABLE,
            StreamError::SourceRead(_) => codes::SOURCE_READ_FAILED,
            StreamError::SinkWrite(_) => codes::SINK_WRITE_FAILED,
            StreamError::ResourceRelease(_) => codes::RELEASE_FAILED,
        }
    }

    /// 若为协议违规，返回其具体类型。
    pub fn protocol_violation(&self) -> Option<ProtocolViolation> {
        match self {
            StreamError::ProtocolViolation(violation) => Some(*violation),
            _ => None,
        }
    }
}
