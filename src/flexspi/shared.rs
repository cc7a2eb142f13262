use core::cell::RefCell;

use critical_section::Mutex;
use imxrt_ral as ral;

use crate::driver::TransferWatcher;

/// Words pushed into the TX FIFO per watermark event.
pub(super) const TX_WATERMARK_WORDS: usize = 16;

pub(super) struct FeedState<const N: u8> {
    pub flexspi: ral::flexspi::Instance<N>,
    pub next: *const u32,
    pub remaining: usize,
}

// SAFETY: `next` points into the driver's word pool. It is only set while a
// transfer is active, and the driver clears it before the buffer can be
// freed or reused.
unsafe impl<const N: u8> Send for FeedState<N> {}

/// State shared between a [`FlexSpiDriver`](super::FlexSpiDriver) and the
/// FlexSPI interrupt.
///
/// Must live in a `static`:
///
/// ```ignore
/// static SHARED: FlexSpiShared<2> = FlexSpiShared::new();
///
/// #[interrupt]
/// fn FLEXSPI2() {
///     SHARED.on_interrupt();
/// }
/// ```
pub struct FlexSpiShared<const N: u8> {
    pub(super) feed: Mutex<RefCell<Option<FeedState<N>>>>,
    pub(super) watcher: TransferWatcher,
}

impl<const N: u8> FlexSpiShared<N> {
    /// Creates the shared state.
    pub const fn new() -> Self {
        Self {
            feed: Mutex::new(RefCell::new(None)),
            watcher: TransferWatcher::new(),
        }
    }

    /// Refills the TX FIFO and detects the end of a transfer.
    ///
    /// Needs to be called inside of the FlexSPI interrupt handler.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let mut feed = self.feed.borrow(cs).borrow_mut();
            let Some(state) = feed.as_mut() else {
                return;
            };

            if state.remaining > 0 && ral::read_reg!(ral::flexspi, state.flexspi, INTR, IPTXWE == 1)
            {
                let chunk = state.remaining.min(TX_WATERMARK_WORDS);
                for i in 0..TX_WATERMARK_WORDS {
                    let word = if i < chunk {
                        // SAFETY: `remaining` words are left behind `next`.
                        unsafe { state.next.add(i).read() }
                    } else {
                        0
                    };
                    ral::write_reg!(ral::flexspi, state.flexspi, TFDR[i], word);
                }

                // SAFETY: `chunk <= remaining`, so this stays within the buffer.
                state.next = unsafe { state.next.add(chunk) };
                state.remaining -= chunk;

                // Push the watermark's worth of data into the FIFO
                ral::write_reg!(ral::flexspi, state.flexspi, INTR, IPTXWE: 1);

                if state.remaining == 0 {
                    ral::modify_reg!(ral::flexspi, state.flexspi, INTEN, IPTXWEEN: 0);
                }
            }

            if ral::read_reg!(ral::flexspi, state.flexspi, INTR, IPCMDDONE == 1) {
                if ral::read_reg!(ral::flexspi, state.flexspi, INTR, IPCMDERR == 1) {
                    let errcode = ral::read_reg!(ral::flexspi, state.flexspi, STS1, IPCMDERRCODE);
                    log::error!("FlexSPI write failed! Error code: {}", errcode);
                }

                ral::write_reg!(
                    ral::flexspi, state.flexspi, INTR,
                    IPCMDDONE: 1,
                    IPCMDERR: 1,
                    IPTXWE: 1
                );
                ral::write_reg!(ral::flexspi, state.flexspi, INTEN, 0);

                *feed = None;
                self.watcher.signal();
            }
        });
    }
}

impl<const N: u8> Default for FlexSpiShared<N> {
    fn default() -> Self {
        Self::new()
    }
}
