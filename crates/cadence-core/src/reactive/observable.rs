#![forbid(unsafe_code)]

//! Shared, version-tracked values with change notification.
//!
//! # Invariants
//!
//! 1. `version` increments exactly once per effective write.
//! 2. Listeners are notified synchronously, in registration order, with the
//!    `(new, old)` pair of the write that triggered them.
//! 3. [`set`](Observable::set) with a value equal to the current one is a no-op.
//! 4. No borrow is held while listeners run. A listener may read or write the
//!    observable it is attached to.
//!
//! # Failure Modes
//!
//! - **Re-entrant write**: a listener that writes the same observable triggers
//!   a nested notification with the nested pair. The outer notification then
//!   resumes with its own pair, so later listeners may see an `old`/`new` that
//!   is no longer current. Read [`get`](Observable::get) when that matters.
//! - **Listener panics**: the value has already been written; remaining
//!   listeners of that write are skipped.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Listener<T> = dyn Fn(&T, &T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    listeners: Vec<Weak<Listener<T>>>,
}

/// A shared mutable value that notifies listeners when it changes.
///
/// Cloning an `Observable` clones the handle, not the value: all clones see
/// the same state.
///
/// # Example
///
/// ```
/// use cadence_core::reactive::Observable;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = Observable::new(0);
/// let seen = Rc::new(Cell::new(0));
/// let s = Rc::clone(&seen);
/// let _sub = count.subscribe(move |v| s.set(*v));
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// assert_eq!(count.version(), 1);
/// ```
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<T: Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> Observable<T> {
    /// Create an observable holding `value` at version 0.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// `f` must not write to this observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of effective writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Listen for new values. The listener lives as long as the returned guard.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.watch(move |new, _old| f(new))
    }

    /// Listen for `(new, old)` pairs. The listener lives as long as the
    /// returned guard.
    pub fn watch(&self, f: impl Fn(&T, &T) + 'static) -> Subscription {
        let listener: Rc<Listener<T>> = Rc::new(f);
        self.inner
            .borrow_mut()
            .listeners
            .push(Rc::downgrade(&listener));
        Subscription {
            _listener: Box::new(listener),
        }
    }

    /// Number of listeners whose guard is still alive.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Whether two handles share the same state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn live_listeners(&self) -> Vec<Rc<Listener<T>>> {
        let mut inner = self.inner.borrow_mut();
        inner.listeners.retain(|w| w.strong_count() > 0);
        inner.listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Write `value` and notify, even if it equals the current value.
    pub fn replace(&self, value: T) {
        let old = {
            let mut inner = self.inner.borrow_mut();
            inner.version += 1;
            std::mem::replace(&mut inner.value, value)
        };
        self.notify(old);
    }

    /// Mutate the value in place and notify.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let old = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.value.clone();
            f(&mut inner.value);
            inner.version += 1;
            old
        };
        self.notify(old);
    }

    fn notify(&self, old: T) {
        let listeners = self.live_listeners();
        if listeners.is_empty() {
            return;
        }
        let new = self.get();
        for listener in listeners {
            listener(&new, &old);
        }
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Write `value` if it differs from the current value.
    ///
    /// Returns `true` when the write took effect.
    pub fn set(&self, value: T) -> bool {
        if self.inner.borrow().value == value {
            return false;
        }
        self.replace(value);
        true
    }
}

/// RAII guard for a listener registered with [`Observable::subscribe`] or
/// [`Observable::watch`]. Dropping it detaches the listener.
pub struct Subscription {
    _listener: Box<dyn Any>,
}

impl Subscription {
    /// Detach the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
