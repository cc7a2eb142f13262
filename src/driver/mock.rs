use alloc::{boxed::Box, vec, vec::Vec};

use super::{BusConfig, DmaBuffer, DmaDriver, Timeout, TransferWatcher, MAX_TRANSFER_BYTES};
use crate::errors::DriverError;
use crate::transposer::MAX_SUPPORTED_LANES;

const DEFAULT_AVAILABLE_PINS: u8 = 48;
const DEFAULT_DMA_CAPACITY: usize = 256 * 1024;

/// Something the [`MockDriver`] did, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    /// `begin()` configured the bus.
    Begin,
    /// A DMA buffer was handed out.
    Allocate {
        /// Size in bytes.
        size: usize,
    },
    /// A DMA buffer was returned.
    Free {
        /// Size in bytes.
        size: usize,
    },
    /// A transfer was queued.
    Queue {
        /// Transfer number, counting from zero.
        id: u32,
    },
    /// A transfer finished.
    Complete {
        /// Transfer number.
        id: u32,
    },
    /// A wait gave up before the transfer finished.
    Timeout {
        /// Transfer number.
        id: u32,
    },
    /// A transfer was ended by `force_complete()`.
    Forced {
        /// Transfer number.
        id: u32,
    },
    /// A transfer was refused by injected failure.
    Reject,
}

/// A transfer as it would appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTransfer {
    /// Transfer number, counting from zero.
    pub id: u32,
    /// The transmitted bytes.
    pub data: Vec<u8>,
    /// The transfer length as handed to the peripheral, in bits.
    pub bits: usize,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTransfer {
    id: u32,
    remaining_us: u64,
}

/// A driver without hardware, for tests and host builds.
///
/// It checks the configuration like a real peripheral would, hands out
/// buffers from a bounded pool, records every transfer, and simulates wire
/// time from the clock frequency and number of data lines. Time only passes
/// while waiting, or through [`advance_us`](MockDriver::advance_us).
pub struct MockDriver {
    config: Option<BusConfig>,
    available_pins: u8,
    dma_capacity: usize,
    dma_in_use: usize,
    allocations: usize,
    frees: usize,
    reject_next: u32,
    stalled: bool,
    active: Option<ActiveTransfer>,
    next_id: u32,
    now_us: u64,
    transfers: Vec<MockTransfer>,
    events: Vec<MockEvent>,
    watcher: TransferWatcher,
}

impl MockDriver {
    /// Creates an unconfigured mock with 48 pins and 256 KiB of DMA memory.
    pub fn new() -> Self {
        Self {
            config: None,
            available_pins: DEFAULT_AVAILABLE_PINS,
            dma_capacity: DEFAULT_DMA_CAPACITY,
            dma_in_use: 0,
            allocations: 0,
            frees: 0,
            reject_next: 0,
            stalled: false,
            active: None,
            next_id: 0,
            now_us: 0,
            transfers: Vec::new(),
            events: Vec::new(),
            watcher: TransferWatcher::new(),
        }
    }

    /// Limits the DMA memory pool.
    pub fn with_dma_capacity(mut self, bytes: usize) -> Self {
        self.dma_capacity = bytes;
        self
    }

    /// Limits the valid pins to `0..count`.
    pub fn with_available_pins(mut self, count: u8) -> Self {
        self.available_pins = count;
        self
    }

    /// Makes the next `count` calls to `transmit_async` fail with [`DriverError::Rejected`].
    pub fn reject_next_transmits(&mut self, count: u32) {
        self.reject_next = count;
    }

    /// While stalled, queued transfers never complete on their own.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Lets `us` microseconds of wire time pass.
    pub fn advance_us(&mut self, us: u64) {
        self.now_us += us;
        if self.stalled {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            if active.remaining_us <= us {
                // Completion interrupt
                self.watcher.signal();
                self.events.push(MockEvent::Complete { id: active.id });
                self.active = None;
            } else {
                active.remaining_us -= us;
            }
        }
    }

    /// The configuration accepted by `begin()`.
    pub fn config(&self) -> Option<&BusConfig> {
        self.config.as_ref()
    }

    /// Whether `begin()` succeeded.
    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// Every transfer queued so far.
    pub fn transfers(&self) -> &[MockTransfer] {
        &self.transfers
    }

    /// Everything that happened so far.
    pub fn events(&self) -> &[MockEvent] {
        &self.events
    }

    /// The number of buffers handed out.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// The number of buffers returned.
    pub fn frees(&self) -> usize {
        self.frees
    }

    /// Bytes of DMA memory currently handed out.
    pub fn dma_in_use(&self) -> usize {
        self.dma_in_use
    }

    /// Simulated time in microseconds.
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    fn transfer_duration_us(config: &BusConfig, bits: usize) -> u64 {
        let lanes = config.lanes().max(1) as u64;
        let clocks = (bits as u64 + lanes - 1) / lanes;
        let hz = u64::from(config.clock_hz);
        ((clocks * 1_000_000 + hz - 1) / hz).max(1)
    }

    fn check_config(&self, config: &BusConfig) -> Result<(), DriverError> {
        let count = config.lanes();
        if count == 0 || count > MAX_SUPPORTED_LANES {
            return Err(DriverError::UnsupportedLaneCount { count });
        }

        if config.clock_hz == 0 {
            return Err(DriverError::InvalidClock {
                hz: config.clock_hz,
            });
        }

        let mut used = [false; 256];
        for pin in core::iter::once(config.clock_pin).chain(config.data_pins.iter().copied()) {
            if pin >= self.available_pins {
                return Err(DriverError::InvalidPin { pin });
            }
            if core::mem::replace(&mut used[usize::from(pin)], true) {
                return Err(DriverError::DuplicatePin { pin });
            }
        }

        Ok(())
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaDriver for MockDriver {
    type Buffer = DmaBuffer<Box<[u32]>>;

    fn begin(&mut self, config: &BusConfig) -> Result<(), DriverError> {
        if self.config.is_some() {
            return Ok(());
        }

        self.check_config(config)?;

        log::debug!("Initializing mock bus #{}.", config.bus);
        log::debug!("    Clock pin: {}", config.clock_pin);
        log::debug!("    Data pins: {:?}", config.data_pins);
        log::debug!("    Clock: {} Hz", config.clock_hz);

        self.config = Some(config.clone());
        self.events.push(MockEvent::Begin);
        Ok(())
    }

    fn allocate_dma_buffer(&mut self, size: usize) -> Option<Self::Buffer> {
        self.config.as_ref()?;

        if self.dma_in_use + size > self.dma_capacity {
            log::warn!(
                "Out of DMA memory: {} bytes requested, {} of {} in use.",
                size,
                self.dma_in_use,
                self.dma_capacity
            );
            return None;
        }

        let words = vec![0u32; DmaBuffer::<Box<[u32]>>::words_for(size)].into_boxed_slice();
        let buffer = DmaBuffer::new(words, size)?;

        self.dma_in_use += size;
        self.allocations += 1;
        self.events.push(MockEvent::Allocate { size });
        Some(buffer)
    }

    fn free_dma_buffer(&mut self, buffer: Self::Buffer) {
        let size = buffer.len();
        self.dma_in_use = self.dma_in_use.saturating_sub(size);
        self.frees += 1;
        self.events.push(MockEvent::Free { size });
    }

    fn transmit_async(&mut self, buffer: &Self::Buffer, len: usize) -> Result<(), DriverError> {
        let config = self.config.as_ref().ok_or(DriverError::NotInitialized)?;

        if len == 0 {
            return Err(DriverError::EmptyTransfer);
        }

        let max = buffer.len().min(self.max_transfer_bytes());
        if len > max {
            return Err(DriverError::TransferTooLarge { len, max });
        }

        let bits = len * 8;
        let remaining_us = Self::transfer_duration_us(config, bits);

        if self.active.is_some() && !self.wait_complete(Timeout::Forever) {
            return Err(DriverError::Busy);
        }

        if self.reject_next > 0 {
            self.reject_next -= 1;
            self.events.push(MockEvent::Reject);
            return Err(DriverError::Rejected);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.watcher.clear();
        self.active = Some(ActiveTransfer { id, remaining_us });
        self.transfers.push(MockTransfer {
            id,
            data: buffer[..len].to_vec(),
            bits,
        });
        self.events.push(MockEvent::Queue { id });

        Ok(())
    }

    fn wait_complete(&mut self, timeout: Timeout) -> bool {
        let Some(ActiveTransfer { id, remaining_us }) = self.active else {
            return true;
        };

        let budget = match timeout {
            Timeout::Forever => None,
            Timeout::Micros(us) => Some(us),
        };

        if self.stalled {
            self.now_us += budget.map_or(0, u64::from);
            self.events.push(MockEvent::Timeout { id });
            log::warn!("Transfer {} is stalled.", id);
            return false;
        }

        // One poll per simulated microsecond; the completion interrupt
        // fires once the wire time has passed.
        let watcher = &self.watcher;
        let mut elapsed = 0u64;
        let finished = watcher.block_until_finished(budget, || {
            elapsed += 1;
            if elapsed == remaining_us {
                watcher.signal();
            }
        });

        self.now_us += elapsed;
        if finished {
            self.active = None;
            self.events.push(MockEvent::Complete { id });
        } else {
            self.active = Some(ActiveTransfer {
                id,
                remaining_us: remaining_us - elapsed,
            });
            self.events.push(MockEvent::Timeout { id });
        }

        finished
    }

    fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    fn force_complete(&mut self) {
        if let Some(active) = self.active.take() {
            log::warn!("Forcing transfer {} to an end.", active.id);
            self.watcher.signal();
            self.events.push(MockEvent::Forced { id: active.id });
        }
    }

    fn max_transfer_bytes(&self) -> usize {
        self.config
            .as_ref()
            .map_or(MAX_TRANSFER_BYTES, |config| config.max_transfer_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_config() -> BusConfig {
        BusConfig::new(2, 12, &[11, 13, 14, 15])
    }

    fn begun() -> MockDriver {
        let mut driver = MockDriver::new();
        driver.begin(&quad_config()).unwrap();
        driver
    }

    #[test]
    fn begin_rejects_bad_configurations() {
        let mut driver = MockDriver::new().with_available_pins(16);

        assert_eq!(
            driver.begin(&BusConfig::new(2, 12, &[11, 13, 14, 40])),
            Err(DriverError::InvalidPin { pin: 40 })
        );
        assert_eq!(
            driver.begin(&BusConfig::new(2, 12, &[11, 12, 14, 15])),
            Err(DriverError::DuplicatePin { pin: 12 })
        );
        assert_eq!(
            driver.begin(&BusConfig::new(2, 12, &[])),
            Err(DriverError::UnsupportedLaneCount { count: 0 })
        );
        assert_eq!(
            driver.begin(&quad_config().with_clock_hz(0)),
            Err(DriverError::InvalidClock { hz: 0 })
        );
        assert!(!driver.is_initialized());
    }

    #[test]
    fn failed_begin_leaves_driver_unusable() {
        let mut driver = MockDriver::new().with_available_pins(4);
        assert!(driver.begin(&quad_config()).is_err());

        assert!(driver.allocate_dma_buffer(16).is_none());

        let buffer = DmaBuffer::new(vec![0u32; 4].into_boxed_slice(), 16).unwrap();
        assert_eq!(
            driver.transmit_async(&buffer, 16),
            Err(DriverError::NotInitialized)
        );
    }

    #[test]
    fn begin_is_idempotent() {
        let mut driver = begun();
        driver.begin(&quad_config()).unwrap();
        assert_eq!(driver.events(), &[MockEvent::Begin]);
    }

    #[test]
    fn allocation_is_bounded() {
        let mut driver = MockDriver::new().with_dma_capacity(1000);
        driver.begin(&quad_config()).unwrap();

        let first = driver.allocate_dma_buffer(600).unwrap();
        assert!(driver.allocate_dma_buffer(600).is_none());
        assert_eq!(driver.dma_in_use(), 600);

        driver.free_dma_buffer(first);
        assert_eq!(driver.dma_in_use(), 0);
        assert!(driver.allocate_dma_buffer(600).is_some());
        assert_eq!(driver.allocations(), 2);
        assert_eq!(driver.frees(), 1);
    }

    #[test]
    fn transfer_length_is_converted_to_bits() {
        let mut driver = begun();
        let mut buffer = driver.allocate_dma_buffer(8).unwrap();
        buffer.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        driver.transmit_async(&buffer, 6).unwrap();

        let transfer = &driver.transfers()[0];
        assert_eq!(transfer.bits, 48);
        assert_eq!(transfer.data, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn transfer_validation() {
        let mut driver = MockDriver::new();
        driver
            .begin(&quad_config().with_max_transfer_bytes(8))
            .unwrap();
        let buffer = driver.allocate_dma_buffer(16).unwrap();

        assert_eq!(
            driver.transmit_async(&buffer, 0),
            Err(DriverError::EmptyTransfer)
        );
        assert_eq!(
            driver.transmit_async(&buffer, 12),
            Err(DriverError::TransferTooLarge { len: 12, max: 8 })
        );
    }

    #[test]
    fn second_transmit_waits_for_the_first() {
        let mut driver = begun();
        let mut buffer = driver.allocate_dma_buffer(4).unwrap();

        buffer.copy_from_slice(&[0xAA; 4]);
        driver.transmit_async(&buffer, 4).unwrap();
        assert!(driver.is_busy());

        driver.transmit_async(&buffer, 4).unwrap();

        assert_eq!(
            driver.events(),
            &[
                MockEvent::Begin,
                MockEvent::Allocate { size: 4 },
                MockEvent::Queue { id: 0 },
                MockEvent::Complete { id: 0 },
                MockEvent::Queue { id: 1 },
            ]
        );
        assert_eq!(driver.transfers().len(), 2);
        assert_eq!(driver.transfers()[0].data, [0xAA; 4]);
    }

    #[test]
    fn wire_time_follows_clock_and_lanes() {
        let mut driver = MockDriver::new();
        driver
            .begin(&quad_config().with_clock_hz(1_000_000))
            .unwrap();
        let buffer = driver.allocate_dma_buffer(100).unwrap();

        // 800 bits over 4 lines at 1 MHz
        driver.transmit_async(&buffer, 100).unwrap();
        assert!(!driver.wait_complete(Timeout::Micros(150)));
        assert!(driver.is_busy());
        assert!(driver.wait_complete(Timeout::Micros(50)));
        assert!(!driver.is_busy());
        assert_eq!(driver.now_us(), 200);
    }

    #[test]
    fn advancing_time_completes_transfers() {
        let mut driver = MockDriver::new();
        driver
            .begin(&quad_config().with_clock_hz(1_000_000))
            .unwrap();
        let buffer = driver.allocate_dma_buffer(100).unwrap();

        driver.transmit_async(&buffer, 100).unwrap();
        driver.advance_us(199);
        assert!(driver.is_busy());
        driver.advance_us(1);
        assert!(!driver.is_busy());
        assert!(driver.wait_complete(Timeout::Micros(0)));
    }

    #[test]
    fn stalled_transfers_time_out_and_can_be_forced() {
        let mut driver = begun();
        let buffer = driver.allocate_dma_buffer(4).unwrap();

        driver.set_stalled(true);
        driver.transmit_async(&buffer, 4).unwrap();
        assert!(!driver.wait_complete(Timeout::Forever));
        assert_eq!(driver.transmit_async(&buffer, 4), Err(DriverError::Busy));

        driver.force_complete();
        assert!(!driver.is_busy());
        assert!(driver.transmit_async(&buffer, 4).is_ok());
    }

    #[test]
    fn injected_rejections() {
        let mut driver = begun();
        let buffer = driver.allocate_dma_buffer(4).unwrap();

        driver.reject_next_transmits(1);
        assert_eq!(driver.transmit_async(&buffer, 4), Err(DriverError::Rejected));
        assert!(driver.transmit_async(&buffer, 4).is_ok());
        assert_eq!(driver.transfers().len(), 1);
    }
}
