// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronous, single-threaded publish/subscribe with weak observers.
//!
//! A [`Bus`] never owns its observers. Each [`Bus::subscribe`] returns a
//! [`Subscription`] token; dropping the token (or calling
//! [`Subscription::cancel`]) deregisters the observer immediately. Call
//! [`Subscription::detach`] to let the observer's own lifetime decide instead.
//!
//! ## Delivery
//!
//! [`Bus::broadcast`] snapshots the live observers and then calls them in
//! order on the calling thread. Observers that subscribe or unsubscribe during
//! a broadcast only affect later broadcasts; an observer already in the
//! snapshot still receives the in-flight one.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::{Rc, Weak};
//! use understory_keyboard_guide::observer::Bus;
//!
//! trait Ping {
//!     fn ping(&self);
//! }
//! struct Counter(Cell<u32>);
//! impl Ping for Counter {
//!     fn ping(&self) {
//!         self.0.set(self.0.get() + 1);
//!     }
//! }
//!
//! let bus: Bus<dyn Ping> = Bus::new();
//! let counter = Rc::new(Counter(Cell::new(0)));
//! let subscription = bus.subscribe(Rc::downgrade(&counter) as Weak<dyn Ping>);
//!
//! bus.broadcast(|o| o.ping());
//! drop(subscription);
//! bus.broadcast(|o| o.ping());
//!
//! assert_eq!(counter.0.get(), 1);
//! ```

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use smallvec::SmallVec;

/// A multicast channel with weakly held observers.
pub struct Bus<O: ?Sized> {
    inner: Rc<BusInner<O>>,
}

struct BusInner<O: ?Sized> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry<O>>>,
}

struct Entry<O: ?Sized> {
    id: u64,
    observer: Weak<O>,
}

trait Unsubscribe {
    fn unsubscribe(&self, id: u64);
}

impl<O: ?Sized> Unsubscribe for BusInner<O> {
    fn unsubscribe(&self, id: u64) {
        self.entries.borrow_mut().retain(|e| e.id != id);
    }
}

impl<O: ?Sized + 'static> Bus<O> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(BusInner {
                next_id: Cell::new(0),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register `observer` and return the token that keeps it registered.
    pub fn subscribe(&self, observer: Weak<O>) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.entries.borrow_mut().push(Entry { id, observer });
        let bus: Weak<dyn Unsubscribe> = Rc::downgrade(&self.inner) as Weak<dyn Unsubscribe>;
        Subscription { bus, id: Some(id) }
    }

    /// Deregister every subscription whose observer is `observer`.
    ///
    /// Outstanding [`Subscription`] tokens for it become inert.
    pub fn unsubscribe<T: ?Sized>(&self, observer: *const T) {
        self.inner
            .entries
            .borrow_mut()
            .retain(|e| !core::ptr::addr_eq(e.observer.as_ptr(), observer));
    }

    /// Deliver `f` to every live observer, synchronously and in subscription order.
    ///
    /// Dead observers are pruned before delivery. Returns the number of
    /// observers notified.
    pub fn broadcast(&self, mut f: impl FnMut(&O)) -> usize {
        let snapshot: SmallVec<[Rc<O>; 8]> = {
            let mut entries = self.inner.entries.borrow_mut();
            entries.retain(|e| e.observer.strong_count() > 0);
            entries.iter().filter_map(|e| e.observer.upgrade()).collect()
        };
        for observer in &snapshot {
            f(observer);
        }
        snapshot.len()
    }

    /// Number of registered observers that are still alive.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|e| e.observer.strong_count() > 0)
            .count()
    }

    /// Whether no live observer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<O: ?Sized + 'static> Default for Bus<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> fmt::Debug for Bus<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("entries", &self.inner.entries.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Token for one registration on a [`Bus`].
///
/// Holds only a weak reference to the bus, so it never keeps the bus alive.
/// Dropping the token deregisters the observer.
#[must_use = "dropping a Subscription deregisters the observer immediately"]
pub struct Subscription {
    bus: Weak<dyn Unsubscribe>,
    id: Option<u64>,
}

impl Subscription {
    /// Deregister now.
    pub fn cancel(mut self) {
        self.release();
    }

    /// Keep the registration for as long as the observer lives, without a token.
    pub fn detach(mut self) {
        self.id = None;
    }

    /// Whether both the bus and the registration still exist.
    pub fn is_active(&self) -> bool {
        self.bus.strong_count() > 0 && self.id.is_some()
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take()
            && let Some(bus) = self.bus.upgrade()
        {
            bus.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
