use alloc::{vec, vec::Vec};

use crate::{
    chipset::Chipset,
    driver::{BusConfig, DmaDriver, Timeout, DEFAULT_WAIT_TIMEOUT},
    errors::{DriverError, FinalizeError, LaneError},
    lane::{Lane, LaneId, LaneSlot},
    padding::PaddingFrame,
    transposer::{BusWidth, Quad, Transposer, MAX_SUPPORTED_LANES},
};

/// The number of lanes of a Quad-SPI bus.
pub const MAX_LANES: usize = Quad::LANES;

/// Lanes shorter than this percentage of the longest lane trigger a warning.
pub const LENGTH_MISMATCH_PERCENT: usize = 90;

/// What [`LaneController::transmit`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitStatus {
    /// The frame was queued.
    Queued,
    /// The frame was queued on the second attempt.
    Retried,
    /// Every lane was empty; nothing was sent.
    Idle,
    /// The controller is not begun, or could not be finalized.
    NotReady,
    /// The driver refused the frame twice; it was dropped.
    Dropped,
}

/// The shortest and longest lane of a suspicious topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    /// Length of the shortest lane, in bytes.
    pub shortest: usize,
    /// Length of the longest lane, in bytes.
    pub longest: usize,
}

/// Non-fatal conditions the controller ran into.
///
/// Each of them is also logged as a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// The longest lane exceeded the transfer ceiling and was cut to
    /// [`LaneController::max_lane_len`]; this is its original length.
    pub truncated_from: Option<usize>,
    /// Lane lengths differ by more than 10%.
    pub length_mismatch: Option<LengthMismatch>,
    /// Frames that were only queued after a retry.
    pub retried_frames: u32,
    /// Frames that were dropped.
    pub dropped_frames: u32,
    /// Transfers that had to be forced to an end.
    pub forced_completions: u32,
    /// Frames in which a lane carried more than
    /// [`LaneController::max_lane_len`] bytes; the excess was cut off.
    pub truncated_frames: u32,
}

/// Drives several LED strips ("lanes") over one multi-line SPI bus.
///
/// Lifecycle:
///
/// 1. [`begin`](Self::begin) configures the bus through the driver.
/// 2. [`add_lane`](Self::add_lane) registers every strip.
/// 3. [`finalize`](Self::finalize) fixes the geometry and allocates the
///    transmit buffer. After this, no buffer grows anymore.
/// 4. [`transmit`](Self::transmit) sends one frame; called once per animation frame.
///
/// At most one transfer is in flight. Every `transmit` first waits for
/// the previous one, so the transmit buffer is never rewritten while the
/// DMA engine may still read it.
pub struct LaneController<D: DmaDriver, W: BusWidth = Quad> {
    driver: D,
    begun: bool,
    finalized: bool,
    lanes: Vec<Option<LaneSlot>>,
    transposer: Transposer<W>,
    tx_buffer: Option<D::Buffer>,
    max_lane_len: usize,
    transfer_ceiling: usize,
    transaction_active: bool,
    wait_timeout: Timeout,
    diagnostics: Diagnostics,
}

impl<D: DmaDriver, W: BusWidth> LaneController<D, W> {
    /// Creates a controller on top of `driver`.
    ///
    /// `driver` may also be a `&mut` reference to a driver that outlives the controller.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            begun: false,
            finalized: false,
            lanes: vec![None; W::LANES],
            transposer: Transposer::new(),
            tx_buffer: None,
            max_lane_len: 0,
            transfer_ceiling: 0,
            transaction_active: false,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Sets how long to wait for the previous transfer before forcing it to an end.
    ///
    /// Defaults to [`DEFAULT_WAIT_TIMEOUT`]: unbounded on bare-metal targets,
    /// one second on hosted ones.
    pub fn with_wait_timeout(mut self, timeout: Timeout) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// How long to wait for the previous transfer.
    pub fn wait_timeout(&self) -> Timeout {
        self.wait_timeout
    }

    /// Configures the bus. Does nothing if already begun.
    ///
    /// The configuration must provide exactly one data pin per lane.
    pub fn begin(&mut self, config: &BusConfig) -> Result<(), DriverError> {
        if self.begun {
            return Ok(());
        }

        if config.lanes() != W::LANES {
            return Err(DriverError::UnsupportedLaneCount {
                count: config.lanes(),
            });
        }

        self.driver.begin(config)?;

        self.transfer_ceiling = config
            .max_transfer_bytes
            .min(self.driver.max_transfer_bytes());
        self.begun = true;

        log::debug!(
            "Bus #{} ready: {} lanes, {} bytes max per transfer.",
            config.bus,
            W::LANES,
            self.transfer_ceiling
        );
        Ok(())
    }

    /// Registers a lane of `len` bytes on the lowest free data line.
    pub fn add_lane(&mut self, len: usize, padding: PaddingFrame) -> Result<LaneId, LaneError> {
        if self.finalized {
            return Err(LaneError::AlreadyFinalized);
        }

        let index = self
            .lanes
            .iter()
            .position(Option::is_none)
            .ok_or(LaneError::NoFreeLane)?;

        self.add_lane_manual(index, len, padding)
    }

    /// Registers a lane of `len` bytes on data line `index`.
    pub fn add_lane_manual(
        &mut self,
        index: usize,
        len: usize,
        padding: PaddingFrame,
    ) -> Result<LaneId, LaneError> {
        if self.finalized {
            return Err(LaneError::AlreadyFinalized);
        }

        let slot = self
            .lanes
            .get_mut(index)
            .ok_or(LaneError::LaneOutOfRange {
                index,
                lanes: W::LANES,
            })?;

        if slot.is_some() {
            return Err(LaneError::LaneOccupied { index });
        }

        *slot = Some(LaneSlot { len, padding });
        log::debug!("Lane {}: {} bytes, padding {:02X?}", index, len, padding.as_bytes());

        // `index < W::LANES <= MAX_SUPPORTED_LANES`, so it fits.
        Ok(LaneId(index as u8))
    }

    /// Registers a strip of `num_leds` LEDs of chipset `C`.
    pub fn add_chipset_lane<C: Chipset>(&mut self, num_leds: usize) -> Result<LaneId, LaneError> {
        self.add_lane(C::encoded_len(num_leds), C::PADDING)
    }

    /// The number of registered lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.iter().flatten().count()
    }

    /// Fixes the lane geometry and allocates the transmit buffer.
    ///
    /// Does nothing if already finalized. Lengths that would exceed the
    /// transfer ceiling are clamped, and very uneven lanes are reported;
    /// both only produce warnings.
    pub fn finalize(&mut self) -> Result<(), FinalizeError> {
        if self.finalized {
            return Ok(());
        }

        let mut registered = self.lanes.iter().flatten().map(|slot| slot.len);
        let Some(first) = registered.next() else {
            log::debug!("Nothing to finalize, no lanes registered.");
            return Err(FinalizeError::NoLanes);
        };
        let (shortest, longest) = registered.fold((first, first), |(shortest, longest), len| {
            (shortest.min(len), longest.max(len))
        });

        if longest == 0 {
            log::warn!("All lanes are empty, not finalizing.");
            return Err(FinalizeError::AllLanesEmpty);
        }

        if !self.begun {
            return Err(FinalizeError::NotBegun);
        }

        let mut max_lane_len = longest;
        let ceiling = self.transfer_ceiling / W::LANES;
        if ceiling == 0 {
            log::warn!(
                "Transfer ceiling of {} bytes cannot hold {} lanes, not finalizing.",
                self.transfer_ceiling,
                W::LANES
            );
            return Err(FinalizeError::CeilingTooSmall {
                ceiling: self.transfer_ceiling,
                lanes: W::LANES,
            });
        }
        if max_lane_len > ceiling {
            log::warn!(
                "Lane of {} bytes exceeds the transfer ceiling of {} bytes; truncating to {} bytes.",
                longest,
                self.transfer_ceiling,
                ceiling
            );
            self.diagnostics.truncated_from = Some(longest);
            max_lane_len = ceiling;
        }

        // Lengths are unchecked user input; widen so this cannot overflow.
        if (shortest as u128) * 100 < (longest as u128) * (LENGTH_MISMATCH_PERCENT as u128) {
            log::warn!(
                "Lane lengths differ by more than {}%: shortest {} bytes, longest {} bytes.",
                100 - LENGTH_MISMATCH_PERCENT,
                shortest,
                longest
            );
            self.diagnostics.length_mismatch = Some(LengthMismatch { shortest, longest });
        }

        let size = max_lane_len * W::LANES;
        if self.tx_buffer.is_none() {
            let buffer = self
                .driver
                .allocate_dma_buffer(size)
                .ok_or(FinalizeError::BufferAllocation { size })?;
            self.tx_buffer = Some(buffer);
        }
        self.transposer.reserve(max_lane_len);

        log::debug!(
            "Finalized {} lanes of {} bytes; {} bytes per frame.",
            self.lane_count(),
            max_lane_len,
            size
        );

        self.max_lane_len = max_lane_len;
        self.finalized = true;
        Ok(())
    }

    /// Sends one frame.
    ///
    /// `frame[i]` holds the encoded bytes of the lane with
    /// [`LaneId::index`] `i`; missing entries count as empty lanes. The
    /// bytes are interleaved and copied before this returns, so they only
    /// need to live for the duration of the call.
    ///
    /// Finalizes first if needed. Never fails; a frame that cannot be sent
    /// is dropped with a warning and the next frame tries again.
    pub fn transmit(&mut self, frame: &[&[u8]]) -> TransmitStatus {
        if !self.begun {
            log::warn!("transmit() called before begin().");
            return TransmitStatus::NotReady;
        }

        if !self.finalized {
            if let Err(e) = self.finalize() {
                log::debug!("Unable to finalize: {}", e);
                return TransmitStatus::NotReady;
            }
        }

        let mut lanes = [None; MAX_SUPPORTED_LANES];
        let mut has_data = false;
        let mut overlong = None;
        for (index, slot) in self.lanes.iter().enumerate() {
            if let Some(slot) = slot {
                let data = frame.get(index).copied().unwrap_or(&[]);
                has_data |= !data.is_empty();
                if data.len() > self.max_lane_len && overlong.is_none() {
                    overlong = Some((index, data.len()));
                }
                lanes[index] = Some(Lane::new(data, slot.padding));
            }
        }

        if let Some((index, len)) = overlong {
            // Once per topology
            if self.diagnostics.truncated_frames == 0 {
                log::warn!(
                    "Lane {} carries {} bytes, more than the {} bytes per lane; cutting off the rest.",
                    index,
                    len,
                    self.max_lane_len
                );
            }
            self.diagnostics.truncated_frames = self.diagnostics.truncated_frames.saturating_add(1);
        }

        if !has_data {
            return TransmitStatus::Idle;
        }

        if !self.wait_complete() {
            log::warn!("Previous transfer is stuck; forcing it to an end.");
            self.driver.force_complete();
            self.diagnostics.forced_completions += 1;
            self.transaction_active = false;
        }

        let Some(tx_buffer) = self.tx_buffer.as_mut() else {
            return TransmitStatus::NotReady;
        };

        let interleaved = self
            .transposer
            .transpose(&lanes[..W::LANES], self.max_lane_len);
        let len = interleaved.len();
        tx_buffer[..len].copy_from_slice(interleaved);

        match self.driver.transmit_async(tx_buffer, len) {
            Ok(()) => {
                self.transaction_active = true;
                TransmitStatus::Queued
            }
            Err(e) => {
                log::warn!("Transmit failed: {}; retrying once.", e);
                if self.driver.is_busy() {
                    self.driver.force_complete();
                    self.diagnostics.forced_completions += 1;
                }

                match self.driver.transmit_async(tx_buffer, len) {
                    Ok(()) => {
                        self.transaction_active = true;
                        self.diagnostics.retried_frames += 1;
                        TransmitStatus::Retried
                    }
                    Err(e) => {
                        log::warn!("Transmit failed again: {}; dropping frame.", e);
                        self.diagnostics.dropped_frames += 1;
                        TransmitStatus::Dropped
                    }
                }
            }
        }
    }

    /// Waits for the in-flight transfer, if any.
    ///
    /// Returns `false` if it did not complete within the wait timeout.
    pub fn wait_complete(&mut self) -> bool {
        if !self.transaction_active {
            return true;
        }

        let completed = self.driver.wait_complete(self.wait_timeout);
        if completed {
            self.transaction_active = false;
        } else {
            log::warn!("Timed out waiting for transfer completion.");
        }
        completed
    }

    /// Whether a transfer is in flight. Never blocks.
    pub fn is_busy(&self) -> bool {
        self.driver.is_busy()
    }

    /// Drops all lanes and the transmit buffer, so the topology can be rebuilt.
    ///
    /// The bus stays configured.
    pub fn reset(&mut self) {
        self.release_buffer();
        self.lanes.fill(None);
        self.finalized = false;
        self.max_lane_len = 0;
        self.diagnostics = Diagnostics::default();
    }

    fn release_buffer(&mut self) {
        if self.transaction_active || self.driver.is_busy() {
            if !self.driver.wait_complete(self.wait_timeout) {
                self.driver.force_complete();
            }
            self.transaction_active = false;
        }

        if let Some(buffer) = self.tx_buffer.take() {
            self.driver.free_dma_buffer(buffer);
        }
    }

    /// Whether [`begin`](Self::begin) succeeded.
    pub fn is_begun(&self) -> bool {
        self.begun
    }

    /// Whether [`finalize`](Self::finalize) succeeded.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The common length of all lanes after finalizing, in bytes.
    pub fn max_lane_len(&self) -> usize {
        self.max_lane_len
    }

    /// The size of the transmit buffer, if allocated.
    pub fn transmit_buffer_len(&self) -> Option<usize> {
        self.tx_buffer.as_deref().map(<[u8]>::len)
    }

    /// The allocated capacity of the interleave buffer.
    pub fn interleave_capacity(&self) -> usize {
        self.transposer.capacity()
    }

    /// Warnings and counters collected so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: DmaDriver, W: BusWidth> Drop for LaneController<D, W> {
    fn drop(&mut self) {
        self.release_buffer();
    }
}
