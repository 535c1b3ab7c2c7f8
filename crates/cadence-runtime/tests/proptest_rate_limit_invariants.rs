//! Property-based invariant tests for debounce and throttle gates.
//!
//! 1. A debounced burst emits exactly once, with the last value.
//! 2. Cancelling a debounced burst emits nothing.
//! 3. Throttled emissions are at least one window apart.
//! 4. Throttled emission count is bounded by `D / W + 2` for a burst of span
//!    `D`, which is `ceil(D / W) + 1` whenever `D` is not a multiple of `W`.
//! 5. The first throttled emission is immediate and the last carries the last
//!    value.
//! 6. The debounced projection settles on the source's final value.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::{Observable, Scheduler};
use cadence_runtime::rate_limit::{Debouncer, Throttler, debounced, throttled};
use proptest::prelude::*;
use web_time::{Duration, Instant};

// ── Helpers ──────────────────────────────────────────────────────────

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Gaps (ms) between consecutive calls; the first call happens at t = 0.
fn arb_gaps(max_gap: u64) -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(0..=max_gap, 0..40)
}

// ═════════════════════════════════════════════════════════════════════════
// 1–2. Debounce
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn debounce_burst_emits_once(window in 1u64..100, gaps in arb_gaps(99)) {
        let gaps: Vec<u64> = gaps.into_iter().map(|g| g.min(window - 1)).collect();
        let (sched, _lab) = Scheduler::lab();
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&out);
        let gate = Debouncer::new(&sched, ms(window), move |v: usize| sink.borrow_mut().push(v));

        gate.call(0);
        for (i, gap) in gaps.iter().enumerate() {
            sched.advance(ms(*gap));
            gate.call(i + 1);
        }
        prop_assert!(out.borrow().is_empty());
        prop_assert!(gate.is_pending());

        sched.advance(ms(window));
        prop_assert_eq!(&*out.borrow(), &vec![gaps.len()]);
        prop_assert!(!gate.is_pending());
        prop_assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn cancelled_debounce_emits_nothing(window in 1u64..100, gaps in arb_gaps(50)) {
        let (sched, _lab) = Scheduler::lab();
        let count = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&count);
        let gate = Debouncer::new(&sched, ms(window), move |_: u8| *sink.borrow_mut() += 1);

        let gaps: Vec<u64> = gaps.into_iter().map(|g| g.min(window - 1)).collect();
        gate.call(0);
        for gap in &gaps {
            sched.advance(ms(*gap));
            gate.call(1);
        }
        gate.cancel();
        sched.advance(ms(window * 4));
        prop_assert_eq!(*count.borrow(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3–5. Throttle
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn throttle_spacing_and_bound(window in 1u64..60, gaps in arb_gaps(120)) {
        let (sched, _lab) = Scheduler::lab();
        let start = sched.now();
        let emitted: Rc<RefCell<Vec<(Instant, usize)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&emitted);
        let clock = sched.clock();
        let gate = Throttler::new(&sched, ms(window), move |v: usize| {
            sink.borrow_mut().push((clock.now(), v));
        });

        gate.call(0);
        prop_assert_eq!(emitted.borrow().len(), 1);
        prop_assert_eq!(emitted.borrow()[0].0, start);

        for (i, gap) in gaps.iter().enumerate() {
            sched.advance(ms(*gap));
            gate.call(i + 1);
        }
        let span: u64 = gaps.iter().sum();
        sched.advance(ms(window * 2));

        let emitted = emitted.borrow();
        for pair in emitted.windows(2) {
            prop_assert!(pair[1].0.duration_since(pair[0].0) >= ms(window));
        }
        prop_assert!(emitted.len() as u64 <= span / window + 2);
        prop_assert_eq!(emitted.last().map(|(_, v)| *v), Some(gaps.len()));
        prop_assert!(!gate.is_cooling());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Projections over observables
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn projections_settle_on_final_value(
        window in 1u64..50,
        steps in proptest::collection::vec((0u64..80, any::<i16>()), 1..30),
    ) {
        let (sched, _lab) = Scheduler::lab();
        let source = Observable::new(0i16);
        let deb = debounced(&source, ms(window), &sched);
        let thr = throttled(&source, ms(window), &sched);

        for (gap, value) in &steps {
            sched.advance(ms(*gap));
            source.set(*value);
        }
        sched.advance(ms(window * 2));

        prop_assert_eq!(deb.get(), source.get());
        prop_assert_eq!(thr.get(), source.get());
        prop_assert!(!deb.is_pending());
        prop_assert!(!thr.is_pending());
    }
}
