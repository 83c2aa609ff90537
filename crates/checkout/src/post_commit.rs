//! Hooks that run only once a unit of work has committed.

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Queue of actions deferred until after commit.
///
/// The orchestrator registers hooks while the unit of work is open, then
/// either fires them after a successful commit or discards them on rollback.
/// Both consume the queue, so a hook runs at most once.
#[derive(Default)]
pub struct PostCommitQueue {
    hooks: Vec<Hook>,
}

impl PostCommitQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers `hook` until [`fire`](Self::fire).
    pub fn register(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Runs every hook in registration order. Returns how many ran.
    pub fn fire(self) -> usize {
        let count = self.hooks.len();
        for hook in self.hooks {
            hook();
        }
        count
    }

    /// Drops every hook without running it. Returns how many were dropped.
    pub fn discard(self) -> usize {
        let count = self.hooks.len();
        if count > 0 {
            tracing::debug!(count, "discarding post-commit hooks");
        }
        count
    }

    /// Returns the number of pending hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hook is pending.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for PostCommitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCommitQueue")
            .field("pending", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fire_runs_hooks_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut queue = PostCommitQueue::new();
        for i in 0..3 {
            let order = order.clone();
            queue.register(move || order.lock().unwrap().push(i));
        }

        assert_eq!(queue.fire(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_discard_runs_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut queue = PostCommitQueue::new();
        queue.register(counting_hook(&counter));
        queue.register(counting_hook(&counter));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.discard(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_queue() {
        let queue = PostCommitQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.fire(), 0);
    }
}
