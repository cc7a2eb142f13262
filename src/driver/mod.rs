//! The hardware side: a narrow contract for DMA-driven multi-line SPI peripherals.

use core::ops::DerefMut;

use crate::errors::DriverError;

mod buffer;
mod completion;
mod config;

#[cfg(any(test, feature = "mock"))]
mod mock;

pub use buffer::DmaBuffer;
pub use completion::{TransferFinished, TransferWatcher};
pub use config::{
    BusConfig, Timeout, DEFAULT_CLOCK_HZ, DEFAULT_WAIT_TIMEOUT, MAX_TRANSFER_BYTES,
};

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub use mock::{MockDriver, MockEvent, MockTransfer};

/// A multi-line SPI peripheral that transmits asynchronously via DMA.
///
/// At most one transfer is in flight at any time. Configuration problems
/// are reported as errors, never as panics; a driver whose `begin()` failed
/// stays uninitialized, and every allocation or transfer fails cleanly.
pub trait DmaDriver {
    /// DMA-capable, word aligned memory.
    type Buffer: DerefMut<Target = [u8]>;

    /// Configures the peripheral: bus role, clock, clock pin, data pins and
    /// multi-line mode.
    ///
    /// Calling it again after a success does nothing.
    fn begin(&mut self, config: &BusConfig) -> Result<(), DriverError>;

    /// Allocates `size` bytes of memory the DMA engine can read.
    ///
    /// Returns `None` when uninitialized or out of DMA memory.
    fn allocate_dma_buffer(&mut self, size: usize) -> Option<Self::Buffer>;

    /// Releases memory obtained from [`allocate_dma_buffer`](DmaDriver::allocate_dma_buffer).
    fn free_dma_buffer(&mut self, buffer: Self::Buffer);

    /// Queues the first `len` bytes of `buffer` for transmission and returns
    /// without waiting for the transfer.
    ///
    /// If a transfer is still in flight, waits for it first. The buffer must
    /// not be modified until [`wait_complete`](DmaDriver::wait_complete) has
    /// returned `true`.
    ///
    /// Note that peripherals usually count transfers in bits; `len` is
    /// always in bytes and converted by the driver.
    fn transmit_async(&mut self, buffer: &Self::Buffer, len: usize) -> Result<(), DriverError>;

    /// Blocks until the in-flight transfer is done.
    ///
    /// Returns `false` on timeout. Returns `true` right away if nothing is in flight.
    fn wait_complete(&mut self, timeout: Timeout) -> bool;

    /// Whether a transfer is in flight. Never blocks.
    fn is_busy(&self) -> bool;

    /// Ends a transfer that did not complete in time.
    ///
    /// Afterwards the driver is idle and accepts new transfers.
    fn force_complete(&mut self);

    /// The largest transfer the peripheral accepts, in bytes.
    fn max_transfer_bytes(&self) -> usize {
        MAX_TRANSFER_BYTES
    }
}

impl<T: DmaDriver + ?Sized> DmaDriver for &mut T {
    type Buffer = T::Buffer;

    fn begin(&mut self, config: &BusConfig) -> Result<(), DriverError> {
        (**self).begin(config)
    }

    fn allocate_dma_buffer(&mut self, size: usize) -> Option<Self::Buffer> {
        (**self).allocate_dma_buffer(size)
    }

    fn free_dma_buffer(&mut self, buffer: Self::Buffer) {
        (**self).free_dma_buffer(buffer)
    }

    fn transmit_async(&mut self, buffer: &Self::Buffer, len: usize) -> Result<(), DriverError> {
        (**self).transmit_async(buffer, len)
    }

    fn wait_complete(&mut self, timeout: Timeout) -> bool {
        (**self).wait_complete(timeout)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn force_complete(&mut self) {
        (**self).force_complete()
    }

    fn max_transfer_bytes(&self) -> usize {
        (**self).max_transfer_bytes()
    }
}
