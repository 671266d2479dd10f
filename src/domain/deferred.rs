//! Promise-like values handed back by collaborators that finish their work
//! later (custom embed construction, async thumbnail lookups).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug)]
enum Inner<T> {
    Ready(Option<T>),
    Waiting(oneshot::Receiver<T>),
}

/// A value that is either available now or will be delivered through the
/// paired [`Resolver`]. Resolves to `None` when the resolver is dropped
/// without a value.
#[derive(Debug)]
pub struct Deferred<T> {
    inner: Inner<T>,
}

/// Write half of a [`Deferred`].
#[derive(Debug)]
pub struct Resolver<T> {
    sender: oneshot::Sender<T>,
}

impl<T> Deferred<T> {
    pub fn ready(value: T) -> Self {
        Self {
            inner: Inner::Ready(Some(value)),
        }
    }

    pub fn channel() -> (Resolver<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            Resolver { sender },
            Self {
                inner: Inner::Waiting(receiver),
            },
        )
    }

    /// Non-blocking check. `Ready(None)` means the value will never arrive.
    pub fn try_take(&mut self) -> Poll<Option<T>> {
        match &mut self.inner {
            Inner::Ready(value) => Poll::Ready(value.take()),
            Inner::Waiting(receiver) => match receiver.try_recv() {
                Ok(value) => Poll::Ready(Some(value)),
                Err(oneshot::error::TryRecvError::Empty) => Poll::Pending,
                Err(oneshot::error::TryRecvError::Closed) => Poll::Ready(None),
            },
        }
    }

    /// Waits for the value, giving up after `timeout` when one is set.
    pub async fn wait(self, timeout: Option<Duration>) -> Option<T> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self).await.ok().flatten(),
            None => self.await,
        }
    }
}

impl<T> Resolver<T> {
    /// Delivers the value. Returns it back if the deferred side was dropped.
    pub fn resolve(self, value: T) -> std::result::Result<(), T> {
        self.sender.send(value)
    }
}

// The value is never pinned in place; it is only moved out.
impl<T> Unpin for Deferred<T> {}

impl<T> Future for Deferred<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Ready(value) => Poll::Ready(value.take()),
            Inner::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|result| result.ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_value_is_taken_once() {
        let mut deferred = Deferred::ready(7);
        assert_eq!(deferred.try_take(), Poll::Ready(Some(7)));
        assert_eq!(deferred.try_take(), Poll::Ready(None));
    }

    #[test]
    fn test_channel_pending_until_resolved() {
        let (resolver, mut deferred) = Deferred::channel();
        assert_eq!(deferred.try_take(), Poll::Pending);
        resolver.resolve("done").unwrap();
        assert_eq!(deferred.try_take(), Poll::Ready(Some("done")));
    }

    #[test]
    fn test_dropped_resolver_yields_none() {
        let (resolver, mut deferred) = Deferred::<u8>::channel();
        drop(resolver);
        assert_eq!(deferred.try_take(), Poll::Ready(None));
    }

    #[test]
    fn test_future_wakes_on_resolve() {
        let (resolver, deferred) = Deferred::channel();
        let mut task = tokio_test::task::spawn(deferred);
        tokio_test::assert_pending!(task.poll());

        resolver.resolve(5u8).unwrap();
        assert!(task.is_woken());
        assert_eq!(tokio_test::assert_ready!(task.poll()), Some(5));
    }

    #[test]
    fn test_ready_value_resolves_as_future() {
        assert_eq!(tokio_test::block_on(Deferred::ready("x")), Some("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let (_resolver, deferred) = Deferred::<u8>::channel();
        let value = deferred.wait(Some(Duration::from_secs(2))).await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_wait_receives_value() {
        let (resolver, deferred) = Deferred::channel();
        tokio::spawn(async move {
            let _ = resolver.resolve(42u32);
        });
        assert_eq!(deferred.wait(None).await, Some(42));
    }
}
