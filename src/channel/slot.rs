//! Single-writer accessor for the live channel.
//!
//! [`ChannelSlot`] wraps a [`tokio::sync::watch`] cell. The connection
//! manager is the only writer; the heartbeat monitor and request dispatcher
//! read the current handle on demand and can subscribe to be told when it
//! changes, so a reconnect or teardown is visible everywhere at once.

use std::sync::Arc;

use tokio::sync::watch;

/// Holder of the current channel handle, if any.
#[derive(Debug)]
pub struct ChannelSlot<C> {
    tx: watch::Sender<Option<Arc<C>>>,
}

impl<C> ChannelSlot<C> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Returns the current channel handle.
    #[must_use]
    pub fn current(&self) -> Option<Arc<C>> {
        self.tx.borrow().as_ref().map(Arc::clone)
    }

    /// Returns `true` if `channel` is the current channel.
    #[must_use]
    pub fn is_current(&self, channel: &Arc<C>) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, channel))
    }

    /// Installs `channel` and returns the previous one.
    pub fn replace(&self, channel: Option<Arc<C>>) -> Option<Arc<C>> {
        self.tx.send_replace(channel)
    }

    /// Subscribes to slot changes. The current value is marked seen.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Arc<C>>> {
        self.tx.subscribe()
    }
}

impl<C> Default for ChannelSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let slot: ChannelSlot<u8> = ChannelSlot::new();
        assert!(slot.current().is_none());
    }

    #[test]
    fn replace_returns_previous() {
        let slot = ChannelSlot::new();
        let a = Arc::new(1u8);
        let b = Arc::new(2u8);
        assert!(slot.replace(Some(Arc::clone(&a))).is_none());
        assert!(slot.is_current(&a));
        let Some(prev) = slot.replace(Some(Arc::clone(&b))) else {
            panic!("expected previous channel");
        };
        assert!(Arc::ptr_eq(&prev, &a));
        assert!(!slot.is_current(&a));
        assert!(slot.is_current(&b));
    }

    #[tokio::test]
    async fn watchers_see_teardown() {
        let slot = ChannelSlot::new();
        slot.replace(Some(Arc::new(1u8)));
        let mut rx = slot.watch();
        slot.replace(None);
        assert!(rx.changed().await.is_ok());
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn watcher_is_woken_only_by_a_swap() {
        let slot = ChannelSlot::new();
        slot.replace(Some(Arc::new(1u8)));
        let mut rx = slot.watch();
        let mut changed = tokio_test::task::spawn(rx.changed());
        tokio_test::assert_pending!(changed.poll());

        slot.replace(Some(Arc::new(2u8)));
        assert!(changed.is_woken());
        tokio_test::assert_ready_ok!(changed.poll());
    }
}
