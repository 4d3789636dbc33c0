use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;
use wsbridge_frame::CommandFrame;

/// A reader predicate. Returns `true` when it consumed the frame.
pub type ReaderFn = Arc<dyn Fn(&CommandFrame) -> bool + Send + Sync>;

/// Handle for removing a registered reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(Uuid);

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reader-{}", self.0.simple())
    }
}

/// Concurrent set of inbound frame handlers.
///
/// Every inbound frame is offered to the registered readers until one
/// returns `true`. Offer order between readers is unspecified.
#[derive(Default)]
pub struct ReaderRegistry {
    readers: RwLock<HashMap<ReaderId, ReaderFn>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reader and return its handle.
    pub fn register<F>(&self, reader: F) -> ReaderId
    where
        F: Fn(&CommandFrame) -> bool + Send + Sync + 'static,
    {
        let mut readers = self.readers.write();
        let id = loop {
            let candidate = ReaderId(Uuid::new_v4());
            if !readers.contains_key(&candidate) {
                break candidate;
            }
        };
        readers.insert(id, Arc::new(reader));
        id
    }

    /// Remove a reader. Removing an unknown handle is a no-op.
    pub fn unregister(&self, id: ReaderId) -> bool {
        self.readers.write().remove(&id).is_some()
    }

    /// Offer `frame` to the readers; returns whether one consumed it.
    ///
    /// Readers run outside the lock, so a reader may register or unregister
    /// (itself included) while handling a frame.
    pub fn dispatch(&self, frame: &CommandFrame) -> bool {
        let snapshot: Vec<ReaderFn> = self.readers.read().values().cloned().collect();
        snapshot.iter().any(|reader| reader(frame))
    }

    pub fn len(&self) -> usize {
        self.readers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.read().is_empty()
    }
}

impl fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("readers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use bytes::Bytes;
    use wsbridge_frame::CommandCode;

    use super::*;

    fn frame(id: u32) -> CommandFrame {
        CommandFrame::new(CommandCode::Connect, Bytes::new()).with_id(id)
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ReaderRegistry::new();
        let id = registry.register(|_| false);
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn dispatch_stops_at_first_consumer() {
        let registry = ReaderRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            registry.register(move |frame| {
                seen.fetch_add(1, Ordering::SeqCst);
                frame.id == 5
            });
        }

        assert!(registry.dispatch(&frame(5)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        seen.store(0, Ordering::SeqCst);
        assert!(!registry.dispatch(&frame(6)));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn reader_can_unregister_itself_during_dispatch() {
        let registry = Arc::new(ReaderRegistry::new());
        let slot = Arc::new(parking_lot::Mutex::new(None));

        let id = {
            let registry = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            registry.clone().register(move |_| {
                if let Some(id) = slot.lock().take() {
                    registry.unregister(id);
                }
                true
            })
        };
        *slot.lock() = Some(id);

        assert!(registry.dispatch(&frame(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_register_and_unregister() {
        let registry = Arc::new(ReaderRegistry::new());
        let baseline = registry.register(|_| false);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for n in 0..200u32 {
                        let id = registry.register(move |frame| frame.id == n);
                        registry.dispatch(&frame(n));
                        registry.unregister(id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread should finish");
        }

        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(baseline));
    }
}
