use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    aborted: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.abort();
        }
    }
}

/// Cooperative stop signal for a run.
///
/// Aborting stops new requests from being issued; requests already in flight
/// finish and are recorded. Aborting a handle also aborts every child made
/// from it, but not the other way round.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<Inner>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// A handle that is aborted together with this one and can also be
    /// aborted on its own.
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Parent may have been aborted before registration finished.
        if self.is_aborted() {
            child.abort();
        }
        child
    }

    /// Resolves once the handle is aborted.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let handle = AbortHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cancelled().await })
        };
        tokio::task::yield_now().await;
        handle.abort();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn abort_reaches_children_only_downward() {
        let parent = AbortHandle::new();
        let child = parent.child();
        let sibling = parent.child();

        child.abort();
        assert!(child.is_aborted());
        assert!(!parent.is_aborted());
        assert!(!sibling.is_aborted());

        parent.abort();
        assert!(sibling.is_aborted());

        let late = parent.child();
        assert!(late.is_aborted());
    }
}
