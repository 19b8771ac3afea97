//! Serialization strategies for freelist state
//!
//! A pool picks its strategy through a type parameter, once, at
//! construction:
//! - [`Unguarded`]: state lives in a `RefCell`. The pool is `Send` but not
//!   `Sync`, so concurrent use without external locking does not compile.
//! - [`Locked`]: state lives behind one `parking_lot::Mutex`, held for the
//!   whole of every allocate, free and refill.
//!
//! Closures passed to [`GuardCell::with`] must not call back into the same
//! pool: an `Unguarded` cell panics on the nested borrow and a `Locked` cell
//! deadlocks.

use core::cell::RefCell;

use parking_lot::Mutex;

mod sealed {
    pub trait Sealed {}
}

/// Selects how a pool serializes access to its mutable state
pub trait GuardStrategy: sealed::Sealed + 'static {
    /// Whether pools using this strategy may be shared between threads
    const THREAD_SAFE: bool;

    /// Container that holds the pool state
    type Cell<T>: GuardCell<T>;
}

/// Interior-mutability container used by a [`GuardStrategy`]
pub trait GuardCell<T>: sealed::Sealed {
    /// Wrap `value`
    fn new(value: T) -> Self;

    /// Run `f` with exclusive access to the value
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;

    /// Exclusive access through a unique borrow, without locking
    fn get_mut(&mut self) -> &mut T;
}

/// No internal serialization; the caller provides it
#[derive(Debug, Clone, Copy, Default)]
pub struct Unguarded;

/// One pool-wide mutex around all mutable state
#[derive(Debug, Clone, Copy, Default)]
pub struct Locked;

impl sealed::Sealed for Unguarded {}
impl sealed::Sealed for Locked {}

impl GuardStrategy for Unguarded {
    const THREAD_SAFE: bool = false;
    type Cell<T> = UnguardedCell<T>;
}

impl GuardStrategy for Locked {
    const THREAD_SAFE: bool = true;
    type Cell<T> = LockedCell<T>;
}

/// State container for [`Unguarded`] pools
#[derive(Debug)]
pub struct UnguardedCell<T>(RefCell<T>);

impl<T> sealed::Sealed for UnguardedCell<T> {}

impl<T> GuardCell<T> for UnguardedCell<T> {
    fn new(value: T) -> Self {
        Self(RefCell::new(value))
    }

    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}

/// State container for [`Locked`] pools
#[derive(Debug)]
pub struct LockedCell<T>(Mutex<T>);

impl<T> sealed::Sealed for LockedCell<T> {}

impl<T> GuardCell<T> for LockedCell<T> {
    fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut guard)
    }

    fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}
