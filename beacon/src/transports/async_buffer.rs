use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::{beacon_debug, TransportError};

/// A bounded set of in-flight tasks.
///
/// Admitted tasks are spawned onto the current tokio runtime right away.
/// Once `limit` tasks are in flight further tasks are rejected with
/// [`TransportError::BufferFull`] without ever being polled.
///
/// Clones share the same set of tasks.
#[derive(Clone, Debug)]
pub struct AsyncBuffer {
    limit: usize,
    in_flight: Arc<watch::Sender<usize>>,
}

/// Removes a task from the in-flight count when it settles, panics or is
/// cancelled.
struct Settle(Arc<watch::Sender<usize>>);

impl Drop for Settle {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl AsyncBuffer {
    /// Creates a buffer admitting at most `limit` concurrent tasks.
    pub fn new(limit: usize) -> AsyncBuffer {
        let (in_flight, _) = watch::channel(0);
        AsyncBuffer {
            limit,
            in_flight: Arc::new(in_flight),
        }
    }

    /// The number of tasks that have not settled yet.
    pub fn len(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Returns `true` if no task is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admits and spawns a task.
    ///
    /// The returned future resolves with the task's result.  Dropping it does
    /// not cancel the task.
    pub fn add<F, T>(&self, task: F) -> BoxFuture<'static, Result<T, TransportError>>
    where
        F: Future<Output = Result<T, TransportError>> + Send + 'static,
        T: Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                beacon_debug!("[AsyncBuffer] Not adding task outside of a runtime: {}", err);
                return future::ready(Err(TransportError::NetworkFailure {
                    reason: err.to_string(),
                }))
                .boxed();
            }
        };

        let admitted = self.in_flight.send_if_modified(|count| {
            if *count >= self.limit {
                return false;
            }
            *count += 1;
            true
        });
        if !admitted {
            beacon_debug!("[AsyncBuffer] Not adding task due to buffer limit reached");
            return future::ready(Err(TransportError::BufferFull)).boxed();
        }

        let settle = Settle(self.in_flight.clone());
        let handle = runtime.spawn(async move {
            let _settle = settle;
            task.await
        });
        async move {
            handle
                .await
                .unwrap_or_else(|err| Err(TransportError::NetworkFailure {
                    reason: err.to_string(),
                }))
        }
        .boxed()
    }

    /// Waits until every task admitted so far has settled.
    ///
    /// Resolves `true` if that happened within `timeout`.  A zero timeout
    /// only checks whether the buffer is already empty.  Tasks are never
    /// cancelled.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let mut in_flight = self.in_flight.subscribe();
        if timeout.is_zero() {
            return *in_flight.borrow() == 0;
        }

        let settled = tokio::time::timeout(timeout, in_flight.wait_for(|count| *count == 0))
            .await
            .is_ok();
        if !settled {
            beacon_debug!(
                "[AsyncBuffer] Drain timed out with {} tasks in flight",
                self.len()
            );
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_settled_tasks_are_removed() {
        let buffer = AsyncBuffer::new(2);
        let ok = buffer.add(async { Ok::<_, TransportError>(1) });
        let err = buffer.add(async { Err::<u32, _>(TransportError::BufferFull) });

        assert_eq!(ok.await, Ok(1));
        assert_eq!(err.await, Err(TransportError::BufferFull));
        assert!(buffer.drain(Duration::from_millis(10)).await);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_backpressure() {
        let buffer = AsyncBuffer::new(1);
        let (release, blocked) = oneshot::channel::<()>();
        let first = buffer.add(async move {
            let _ = blocked.await;
            Ok::<_, TransportError>(())
        });

        let invoked = Arc::new(AtomicBool::new(false));
        let second = buffer.add({
            let invoked = invoked.clone();
            async move {
                invoked.store(true, Ordering::SeqCst);
                Ok::<_, TransportError>(())
            }
        });

        assert_eq!(second.await, Err(TransportError::BufferFull));
        tokio::task::yield_now().await;
        assert!(!invoked.load(Ordering::SeqCst));
        assert_eq!(buffer.len(), 1);

        release.send(()).unwrap();
        assert_eq!(first.await, Ok(()));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_everything() {
        let buffer = AsyncBuffer::new(0);
        let result = buffer.add(async { Ok::<_, TransportError>(()) }).await;
        assert_eq!(result, Err(TransportError::BufferFull));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout() {
        let buffer = AsyncBuffer::new(10);
        for i in 0..5u64 {
            // dropping the result future does not cancel the task
            drop(buffer.add(async move {
                tokio::time::sleep(Duration::from_millis(i * 100)).await;
                Ok::<_, TransportError>(())
            }));
        }
        assert_eq!(buffer.len(), 5);

        assert!(!buffer.drain(Duration::from_millis(250)).await);
        assert_eq!(buffer.len(), 2);

        assert!(buffer.drain(Duration::from_millis(250)).await);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_drain_zero_timeout() {
        let buffer = AsyncBuffer::new(1);
        assert!(buffer.drain(Duration::ZERO).await);

        let (release, blocked) = oneshot::channel::<()>();
        let pending = buffer.add(async move {
            let _ = blocked.await;
            Ok::<_, TransportError>(())
        });
        assert!(!buffer.drain(Duration::ZERO).await);

        release.send(()).unwrap();
        pending.await.unwrap();
        assert!(buffer.drain(Duration::ZERO).await);
    }

    #[test]
    fn test_add_outside_runtime() {
        let buffer = AsyncBuffer::new(1);
        let result = futures::executor::block_on(buffer.add(async { Ok::<_, TransportError>(()) }));
        assert!(matches!(result, Err(TransportError::NetworkFailure { .. })));
        assert!(buffer.is_empty());
    }
}
