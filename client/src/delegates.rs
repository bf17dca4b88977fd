// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::{Arc, Mutex};

/// A list of callbacks sharing one signature, invoked in registration order.
///
/// The list is shared behind an `Arc` so a broadcast closure handed to a
/// callback executor can outlive the borrow of the owning context.
pub struct MulticastDelegate<T> {
    listeners: Arc<Mutex<Vec<Box<dyn Fn(&T) + Send>>>>,
}

impl<T> Default for MulticastDelegate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MulticastDelegate<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> MulticastDelegate<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a callback.
    ///
    /// # Panics
    ///
    /// Panics if the listener lock is poisoned.
    pub fn add<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + 'static,
    {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// Invoke every registered callback with `arg`.
    ///
    /// # Panics
    ///
    /// Panics if the listener lock is poisoned.
    pub fn broadcast(&self, arg: &T) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener(arg);
        }
    }

    /// Returns true if no callback is registered.
    ///
    /// # Panics
    ///
    /// Panics if the listener lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_broadcast_reaches_all_listeners() {
        let delegate = MulticastDelegate::<bool>::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            delegate.add(move |_arg| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        delegate.broadcast(&true);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_clone_shares_listeners() {
        let delegate = MulticastDelegate::<u16>::new();
        let cloned = delegate.clone();
        delegate.add(|_arg| {});
        assert!(!cloned.is_empty());
    }
}
