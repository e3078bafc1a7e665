//! 需求计数器：订阅内部唯一的跨线程同步原语。
//!
//! # 设计总览（Why）
//! - 拉取式背压只需要一个整数就能表达“下游还能吸收多少”，因此用单个原子整数承载全部需求记账；
//! - “是否已有线程在排空”不额外占用标志位，而是由 `get_and_add` 返回的旧值是否为零来推导，
//!   从而避免“先查标志再置位”的丢失唤醒窗口。
//!
//! # 集成说明（How）
//! - 订阅在 `request` 中调用 [`DemandCounter::get_and_add`]，旧值为零的线程成为唯一排空者；
//! - 排空者在有界模式下通过 [`DemandCounter::add_and_get`] 扣减已发射数量。

#[cfg(not(any(loom, spark_loom)))]
use core::sync::atomic::{AtomicI64, Ordering};
#[cfg(any(loom, spark_loom))]
use loom::sync::atomic::{AtomicI64, Ordering};

/// 非负、饱和的需求计数器。
///
/// # 契约说明（What）
/// - 取值范围为 `0..=i64::MAX`；达到 [`DemandCounter::UNBOUNDED`] 后视为“无界需求”，
///   后续任何增减都不再改变其值（吸收态）；
/// - 正向溢出一律钳制为 `UNBOUNDED`；
/// - **前置条件**：负向增量只能由排空者提交，且不超过当前未完成的需求。违反该前置条件属于调用方缺陷，
///   调试构建下触发断言，发布构建下钳制为零，保证计数器永远不可观测为负。
///
/// # 逻辑解析（How）
/// 读取当前值 → 吸收态直接返回 → 计算新值（溢出钳制）→ `compare_exchange` 失败则以实际值重试。
#[derive(Debug)]
pub struct DemandCounter {
    value: AtomicI64,
}

impl DemandCounter {
    /// 饱和上限，同时作为“无界需求”的哨兵值。
    pub const UNBOUNDED: i64 = i64::MAX;

    /// 创建初始需求为零的计数器。
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// 读取当前需求。
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// 当前需求是否已饱和为无界。
    pub fn is_unbounded(&self) -> bool {
        self.get() == Self::UNBOUNDED
    }

    /// 原子地累加 `delta` 并返回累加前的值。
    pub fn get_and_add(&self, delta: i64) -> i64 {
        self.update(delta).0
    }

    /// 原子地累加 `delta` 并返回累加后的值。
    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.update(delta).1
    }

    fn update(&self, delta: i64) -> (i64, i64) {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            if current == Self::UNBOUNDED {
                return (current, current);
            }
            let updated = Self::saturate(current, delta);
            match self.value.compare_exchange(
                current,
                updated,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (current, updated),
                Err(actual) => current = actual,
            }
        }
    }

    fn saturate(current: i64, delta: i64) -> i64 {
        match current.checked_add(delta) {
            Some(sum) if sum >= 0 => sum,
            Some(sum) => {
                debug_assert!(
                    sum >= 0,
                    "demand counter driven below zero: {current} + {delta}"
                );
                0
            }
            // 正向溢出钳制到上限；负向溢出在合法调用下不可能出现。
            None if delta > 0 => Self::UNBOUNDED,
            None => 0,
        }
    }
}

impl Default for DemandCounter {
    fn default() -> Self {
        Self::new()
    }
}
