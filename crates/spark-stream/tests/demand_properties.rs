#![cfg(not(any(loom, spark_loom)))]
//! 需求记账的性质测试。
//!
//! # 教案级导览
//!
//! - **核心目标 (Why)**：需求计数器与排空循环的正确性取决于任意顺序的增量，枚举样例覆盖不到溢出边界与
//!   交替的小批量请求，因此用 Proptest 随机生成输入；
//! - **影子模型 (How)**：以 `i128` 计算“理想”的累计需求，再按 `min(累计, i64::MAX)` 钳制，作为计数器的对照；
//!   对发布者则以 `min(累计需求, 源长度)` 作为应发射数量的对照；
//! - **合同 (What)**：
//!   1. 计数器任意时刻不为负，且等于钳制后的累计值；
//!   2. 任意正需求序列下，订阅者按源顺序收到恰好 `min(Σn, len)` 个数据项；
//!   3. 当且仅当累计需求严格超过源长度时，才观测到完成信号。

mod support;

use std::io;

use proptest::prelude::*;
use spark_stream::{DemandCounter, Publisher, SourcePublisher};
use support::{Recording, ScriptedSource, SourceTally};

fn positive_demand() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => 1i64..=16,
        1 => (i64::MAX / 4)..=i64::MAX,
    ]
}

proptest! {
    #[test]
    fn counter_saturates_at_the_clamped_sum(deltas in prop::collection::vec(positive_demand(), 0..32)) {
        let counter = DemandCounter::new();
        let mut shadow: i128 = 0;
        for delta in deltas {
            let previous = counter.get_and_add(delta);
            prop_assert_eq!(i128::from(previous), shadow);
            shadow = (shadow + i128::from(delta)).min(i128::from(DemandCounter::UNBOUNDED));
            prop_assert!(counter.get() >= 0);
            prop_assert_eq!(i128::from(counter.get()), shadow);
        }
    }

    #[test]
    fn drainer_decrements_never_go_below_zero(
        steps in prop::collection::vec((1i64..=32, 0u8..=100), 1..64),
    ) {
        // 每一步先追加需求，再按比例扣减“已发射”的数量，模拟排空者的合法调用。
        let counter = DemandCounter::new();
        for (add, percent) in steps {
            counter.add_and_get(add);
            let outstanding = counter.get();
            let emitted = outstanding * i64::from(percent) / 100;
            let left = counter.add_and_get(-emitted);
            prop_assert_eq!(left, outstanding - emitted);
            prop_assert!(left >= 0);
        }
    }

    #[test]
    fn requests_deliver_min_of_demand_and_length_in_order(
        items in prop::collection::vec(any::<u8>(), 0..64),
        requests in prop::collection::vec(1i64..=12, 1..12),
    ) {
        let tally = SourceTally::default();
        let publisher = {
            let items = items.clone();
            let tally = tally.clone();
            SourcePublisher::new(move || -> io::Result<ScriptedSource> {
                Ok(ScriptedSource::new(items.clone(), &tally))
            })
        };
        let recording = Recording::new();
        publisher.subscribe(recording.clone());

        let subscription = recording.subscription();
        let mut total = 0usize;
        for n in &requests {
            subscription.request(*n);
            total += *n as usize;
            let expected = total.min(items.len());
            prop_assert_eq!(recording.items(), items[..expected].to_vec());
        }

        prop_assert_eq!(recording.completed(), total > items.len());
        prop_assert!(recording.errors().is_empty());
        prop_assert!(recording.terminal_count() <= 1);
        prop_assert_eq!(tally.releases(), usize::from(total > items.len()));
    }
}
