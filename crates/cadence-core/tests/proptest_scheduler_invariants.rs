//! Property-based invariant tests for the timer scheduler.
//!
//! 1. Timeouts fire in deadline order, ties in scheduling order.
//! 2. Cleared timers never fire, and `pending` counts only live timers.
//! 3. An interval of period `p` fires `floor(T / p)` times over `T`.
//! 4. Advancing in pieces fires the same timers as one large advance.
//! 5. A lab clock observed inside a callback reads the timer's deadline.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::{Scheduler, TimerId};
use proptest::prelude::*;
use web_time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ═════════════════════════════════════════════════════════════════════════
// 1–2. Ordering and clearing
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn timeouts_fire_in_deadline_order(delays in proptest::collection::vec(0u64..500, 0..50)) {
        let (sched, _lab) = Scheduler::lab();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (i, delay) in delays.iter().enumerate() {
            let f = Rc::clone(&fired);
            sched.set_timeout(ms(*delay), move || f.borrow_mut().push(i));
        }
        sched.advance(ms(500));

        let mut expected: Vec<usize> = (0..delays.len()).collect();
        expected.sort_by_key(|&i| delays[i]);
        prop_assert_eq!(&*fired.borrow(), &expected);
        prop_assert_eq!(sched.pending(), 0);
        prop_assert_eq!(sched.fired_total(), delays.len() as u64);
    }

    #[test]
    fn cleared_timers_never_fire(
        timers in proptest::collection::vec((1u64..300, any::<bool>()), 0..40),
    ) {
        let (sched, _lab) = Scheduler::lab();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let ids: Vec<(TimerId, bool)> = timers
            .iter()
            .enumerate()
            .map(|(i, (delay, keep))| {
                let f = Rc::clone(&fired);
                (sched.set_timeout(ms(*delay), move || f.borrow_mut().push(i)), *keep)
            })
            .collect();
        for (id, keep) in &ids {
            if !keep {
                prop_assert!(sched.clear(*id));
                prop_assert!(!sched.is_pending(*id));
            }
        }
        let live = ids.iter().filter(|(_, keep)| *keep).count();
        prop_assert_eq!(sched.pending(), live);

        sched.advance(ms(300));
        let fired = fired.borrow();
        prop_assert_eq!(fired.len(), live);
        prop_assert!(fired.iter().all(|&i| timers[i].1));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3–4. Intervals and piecewise advance
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn interval_fire_count(period in 1u64..50, total in 0u64..1_000) {
        let (sched, _lab) = Scheduler::lab();
        let count = Rc::new(RefCell::new(0u64));
        let c = Rc::clone(&count);
        let id = sched.set_interval(ms(period), move || *c.borrow_mut() += 1);
        sched.advance(ms(total));
        prop_assert_eq!(*count.borrow(), total / period);
        prop_assert!(sched.is_pending(id));
    }

    #[test]
    fn piecewise_advance_matches_single(
        delays in proptest::collection::vec(0u64..400, 0..30),
        steps in proptest::collection::vec(0u64..60, 0..20),
    ) {
        let total: u64 = steps.iter().sum();
        let run = |pieces: &[u64]| {
            let (sched, _lab) = Scheduler::lab();
            let fired = Rc::new(RefCell::new(Vec::new()));
            for (i, delay) in delays.iter().enumerate() {
                let f = Rc::clone(&fired);
                sched.set_timeout(ms(*delay), move || f.borrow_mut().push(i));
            }
            for piece in pieces {
                sched.advance(ms(*piece));
            }
            sched.advance(Duration::ZERO);
            let out = fired.borrow().clone();
            out
        };
        prop_assert_eq!(run(&steps), run(&[total]));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Lab time inside callbacks
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn callbacks_observe_their_deadline(delays in proptest::collection::vec(0u64..200, 1..20)) {
        let (sched, lab) = Scheduler::lab();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for delay in &delays {
            let s = Rc::clone(&seen);
            let lab = lab.clone();
            let delay = *delay;
            sched.set_timeout(ms(delay), move || {
                s.borrow_mut().push((delay, lab.elapsed()));
            });
        }
        sched.advance(ms(250));
        for (delay, elapsed) in seen.borrow().iter() {
            prop_assert_eq!(*elapsed, ms(*delay));
        }
        prop_assert_eq!(lab.elapsed(), ms(250));
    }
}
