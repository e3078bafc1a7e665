//! 集成测试共享的测试夹具：记录信号的订阅者、可编排故障的数据源与数据汇。
#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use spark_stream::{ItemSink, ItemSource, StreamError, Subscriber, Subscription};

/// 订阅者观测到的信号。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Subscribe,
    Next(u8),
    /// 终止错误的稳定错误码与描述。
    Error { code: &'static str, message: String },
    Complete,
}

type NextHook = Box<dyn Fn(&dyn Subscription, usize) + Send + Sync>;

/// 按顺序记录全部信号的订阅者。
///
/// - `initial_request`：`on_subscribe` 中同步发出的首个需求；
/// - `on_next` 钩子：在记录第 `seen` 个数据项之后调用，可同步重入 `request`/`cancel`。
pub struct Recording {
    subscription: OnceLock<Arc<dyn Subscription>>,
    signals: Mutex<Vec<Signal>>,
    initial_request: Option<i64>,
    on_next: Option<NextHook>,
    seen: AtomicUsize,
}

impl Recording {
    pub fn new() -> Arc<Self> {
        Self::build(None, None)
    }

    pub fn requesting(n: i64) -> Arc<Self> {
        Self::build(Some(n), None)
    }

    pub fn with_hook(
        initial_request: Option<i64>,
        hook: impl Fn(&dyn Subscription, usize) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(initial_request, Some(Box::new(hook)))
    }

    fn build(initial_request: Option<i64>, on_next: Option<NextHook>) -> Arc<Self> {
        Arc::new(Self {
            subscription: OnceLock::new(),
            signals: Mutex::new(Vec::new()),
            initial_request,
            on_next,
            seen: AtomicUsize::new(0),
        })
    }

    pub fn subscription(&self) -> Arc<dyn Subscription> {
        self.subscription
            .get()
            .cloned()
            .expect("on_subscribe must have been delivered")
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn items(&self) -> Vec<u8> {
        self.signals
            .lock()
            .iter()
            .filter_map(|signal| match signal {
                Signal::Next(item) => Some(*item),
                _ => None,
            })
            .collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|signal| matches!(signal, Signal::Error { .. } | Signal::Complete))
            .count()
    }

    pub fn errors(&self) -> Vec<(&'static str, String)> {
        self.signals
            .lock()
            .iter()
            .filter_map(|signal| match signal {
                Signal::Error { code, message } => Some((*code, message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> bool {
        self.signals.lock().contains(&Signal::Complete)
    }
}

impl Subscriber<u8> for Recording {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.signals.lock().push(Signal::Subscribe);
        if self.subscription.set(subscription.clone()).is_err() {
            subscription.cancel();
            return;
        }
        if let Some(n) = self.initial_request {
            subscription.request(n);
        }
    }

    fn on_next(&self, item: u8) {
        self.signals.lock().push(Signal::Next(item));
        let seen = self.seen.fetch_add(1, Ordering::AcqRel) + 1;
        if let (Some(hook), Some(subscription)) = (&self.on_next, self.subscription.get()) {
            hook(subscription.as_ref(), seen);
        }
    }

    fn on_error(&self, error: StreamError) {
        self.signals.lock().push(Signal::Error {
            code: error.code(),
            message: error.to_string(),
        });
    }

    fn on_complete(&self) {
        self.signals.lock().push(Signal::Complete);
    }
}

/// 释放次数与故障注入的共享视图。
#[derive(Clone, Default)]
pub struct SourceTally {
    pub releases: Arc<AtomicUsize>,
    pub pulls: Arc<AtomicUsize>,
}

impl SourceTally {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::Acquire)
    }
}

/// 由内存数据驱动的数据源，可在指定位置注入读取失败，或让释放失败。
pub struct ScriptedSource {
    items: Vec<u8>,
    position: usize,
    fail_at: Option<usize>,
    fail_release: bool,
    tally: SourceTally,
}

impl ScriptedSource {
    pub fn new(items: impl Into<Vec<u8>>, tally: &SourceTally) -> Self {
        Self {
            items: items.into(),
            position: 0,
            fail_at: None,
            fail_release: false,
            tally: tally.clone(),
        }
    }

    /// 读取第 `index` 个数据项（从零计）时返回 I/O 错误。
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

impl ItemSource for ScriptedSource {
    type Item = u8;

    fn pull(&mut self) -> io::Result<Option<u8>> {
        self.tally.pulls.fetch_add(1, Ordering::AcqRel);
        if self.fail_at == Some(self.position) {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "scripted read failure"));
        }
        let item = self.items.get(self.position).copied();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    fn release(&mut self) -> io::Result<()> {
        self.tally.releases.fetch_add(1, Ordering::AcqRel);
        if self.fail_release {
            return Err(io::Error::other("scripted release failure"));
        }
        Ok(())
    }
}

/// 写入共享缓冲区的数据汇，可在第 `fail_on` 次写入（从一计）时失败。
pub struct SharedSink {
    written: Arc<Mutex<Vec<u8>>>,
    attempts: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    fail_on: Option<usize>,
}

#[derive(Clone, Default)]
pub struct SinkTally {
    pub written: Arc<Mutex<Vec<u8>>>,
    pub attempts: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl SinkTally {
    pub fn sink(&self) -> SharedSink {
        SharedSink {
            written: self.written.clone(),
            attempts: self.attempts.clone(),
            released: self.released.clone(),
            fail_on: None,
        }
    }

    pub fn failing_sink(&self, fail_on: usize) -> SharedSink {
        SharedSink {
            fail_on: Some(fail_on),
            ..self.sink()
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn releases(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }
}

impl ItemSink for SharedSink {
    type Item = u8;

    fn push(&mut self, item: u8) -> io::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if self.fail_on == Some(attempt) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        self.written.lock().push(item);
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        self.released.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
