//! Generic publish/subscribe helper.
//!
//! A minimal synchronous emitter: listeners are plain closures, invoked in
//! registration order on every emit. Test harnesses hang listeners on the
//! mock to observe what it did instead of polling its store.

use parking_lot::Mutex;
use std::sync::Arc;

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

pub struct Emitter<T> {
    listeners: Arc<Mutex<Vec<Listener<T>>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Call every registered listener with `event`, in registration order.
    ///
    /// Listeners run while the internal lock is held; registering a listener
    /// from inside a callback would deadlock.
    pub fn emit(&self, event: &T) {
        for listener in self.listeners.lock().iter() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let emitter: Emitter<u32> = Emitter::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        emitter.add_listener(move |value| sink.lock().push(*value));
        let sink = Arc::clone(&second);
        emitter.add_listener(move |value| sink.lock().push(*value));

        emitter.emit(&2);

        assert_eq!(*first.lock(), vec![2]);
        assert_eq!(*second.lock(), vec![2]);
    }

    #[test]
    fn test_emit_without_listeners_is_a_no_op() {
        let emitter: Emitter<&str> = Emitter::new();
        emitter.emit(&"nobody home");
    }

    #[test]
    fn test_cloned_handles_share_listeners() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&seen);
        emitter.clone().add_listener(move |value| *sink.lock() += value);
        emitter.emit(&3);

        assert_eq!(*seen.lock(), 3);
    }
}
