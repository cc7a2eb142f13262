use core::{
    cell::RefCell,
    pin::{pin, Pin},
    task::{Context, Poll, Waker},
};

use cassette::Cassette;
use critical_section::Mutex;
use futures::Future;

struct TransferWatcherInner {
    happened: bool,
    waker: Option<Waker>,
}

/// Hands a "transfer complete" event from interrupt context to the
/// context that waits for it.
///
/// The interrupt handler calls [`signal`](TransferWatcher::signal);
/// waiters either poll, await [`finished`](TransferWatcher::finished),
/// or block with [`block_until_finished`](TransferWatcher::block_until_finished).
pub struct TransferWatcher {
    inner: Mutex<RefCell<TransferWatcherInner>>,
}

impl TransferWatcher {
    /// Creates a watcher with no pending event.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(TransferWatcherInner {
                happened: false,
                waker: None,
            })),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut TransferWatcherInner) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    /// Marks the current transfer as complete and wakes the waiter.
    ///
    /// Safe to call from an interrupt handler.
    pub fn signal(&self) {
        self.with_inner(|inner| {
            inner.happened = true;
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
        });
    }

    /// Forgets a previous completion; called before starting a transfer.
    pub fn clear(&self) {
        self.with_inner(|inner| {
            inner.happened = false;
        });
    }

    /// Whether the current transfer has completed.
    pub fn poll(&self) -> bool {
        self.with_inner(|inner| inner.happened)
    }

    /// A future that resolves once the current transfer has completed.
    pub fn finished(&self) -> TransferFinished<'_> {
        TransferFinished(self)
    }

    /// Blocks until the transfer completes, giving up after `max_polls` polls.
    ///
    /// `None` never gives up. Between polls, `idle` is invoked; drivers use
    /// it to advance time or to spin.
    pub fn block_until_finished(&self, max_polls: Option<u32>, mut idle: impl FnMut()) -> bool {
        let finished = pin!(self.finished());
        let mut finished = Cassette::new(finished);
        let mut polls = 0u32;

        loop {
            if finished.poll_on().is_some() {
                return true;
            }

            if let Some(max_polls) = max_polls {
                if polls >= max_polls {
                    return false;
                }
            }
            polls = polls.saturating_add(1);

            idle();
        }
    }
}

impl Default for TransferWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`TransferWatcher::finished`].
pub struct TransferFinished<'a>(&'a TransferWatcher);

impl Future for TransferFinished<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.with_inner(|inner| {
            if inner.happened {
                Poll::Ready(())
            } else {
                let new_waker = cx.waker();

                // Keep the old waker if it wakes the same task
                match &inner.waker {
                    Some(old_waker) if old_waker.will_wake(new_waker) => {}
                    _ => {
                        if let Some(old_waker) = inner.waker.replace(new_waker.clone()) {
                            // Another task was waiting; let it re-register itself.
                            old_waker.wake()
                        }
                    }
                }

                Poll::Pending
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;

    #[test]
    fn signal_completes_the_future() {
        let watcher = TransferWatcher::new();
        assert!(!watcher.poll());

        let finished = pin!(watcher.finished());
        let mut finished = Cassette::new(finished);
        assert!(finished.poll_on().is_none());

        watcher.signal();
        assert!(finished.poll_on().is_some());
        assert!(watcher.poll());

        watcher.clear();
        assert!(!watcher.poll());
    }

    #[test]
    fn blocking_wait_gives_up() {
        let watcher = TransferWatcher::new();
        let idles = Cell::new(0);

        assert!(!watcher.block_until_finished(Some(3), || idles.set(idles.get() + 1)));
        assert_eq!(idles.get(), 3);
    }

    #[test]
    fn blocking_wait_sees_signal_from_idle() {
        let watcher = TransferWatcher::new();
        let idles = Cell::new(0);

        let finished = watcher.block_until_finished(None, || {
            idles.set(idles.get() + 1);
            if idles.get() == 5 {
                watcher.signal();
            }
        });

        assert!(finished);
        assert_eq!(idles.get(), 5);
    }
}
