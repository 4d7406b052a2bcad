//! Observable value container.
//!
//! A [`MutableValueCell`] holds a value and notifies subscribers
//! synchronously, in subscription order, on every change. New subscribers
//! receive the current value immediately. [`ValueCell`] is the read-only
//! facade handed to consumers that must not write.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type SubscriberId = u64;
type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct CellInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<(SubscriberId, Callback<T>)>>,
    next_id: Cell<SubscriberId>,
}

impl<T: Clone + 'static> CellInner<T> {
    fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    fn subscribe(self: &Rc<Self>, callback: impl FnMut(&T) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        self.subscribers.borrow_mut().push((id, callback.clone()));

        // Immediate replay of the current value to the new subscriber.
        let current = self.value.borrow().clone();
        callback.borrow_mut()(&current);

        let weak = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .subscribers
                    .borrow_mut()
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    fn notify(&self) {
        // Snapshot before dispatch so callbacks may subscribe or dispose
        // without poisoning the iteration; changes apply from the next
        // notification.
        let subscribers: Vec<Callback<T>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        let current = self.value.borrow().clone();
        for callback in subscribers {
            callback.borrow_mut()(&current);
        }
    }
}

/// Read-only handle to an observable value.
pub struct ValueCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> ValueCell<T> {
    /// Returns a snapshot of the current value.
    pub fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Registers `callback`, invoking it immediately with the current value
    /// and then on every subsequent change. Dropping the returned
    /// [`Subscription`] unregisters it.
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        self.inner.subscribe(callback)
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("value", &self.value())
            .finish()
    }
}

/// Writable observable value.
pub struct MutableValueCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for MutableValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> MutableValueCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(CellInner::new(value)),
        }
    }

    /// Returns the read-only facade over the same cell.
    pub fn as_cell(&self) -> ValueCell<T> {
        ValueCell {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        self.inner.subscribe(callback)
    }

    /// Replaces the value and notifies subscribers synchronously.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.inner.notify();
    }

    /// Mutates the value in place and notifies subscribers synchronously.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.inner.notify();
        result
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for MutableValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableValueCell")
            .field("value", &self.value())
            .finish()
    }
}

/// Guard for an active subscription. Unregisters on [`dispose`] or drop.
///
/// [`dispose`]: Subscription::dispose
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unregisters the callback. Idempotent.
    pub fn dispose(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
