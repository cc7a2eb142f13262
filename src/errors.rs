use snafu::prelude::*;

/// Errors of a [`DmaDriver`](crate::driver::DmaDriver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum DriverError {
    /// The driver was used before a successful `begin()`.
    NotInitialized,
    /// The peripheral cannot drive this many data lines.
    #[snafu(display("Unsupported number of data lines: {count}"))]
    UnsupportedLaneCount {
        /// The requested number of data lines.
        count: usize,
    },
    /// A pin is not available on this peripheral.
    #[snafu(display("Invalid pin: {pin}"))]
    InvalidPin {
        /// The offending pin.
        pin: u8,
    },
    /// A pin was assigned more than one role.
    #[snafu(display("Pin {pin} is used more than once"))]
    DuplicatePin {
        /// The offending pin.
        pin: u8,
    },
    /// The clock frequency cannot be produced.
    #[snafu(display("Invalid clock frequency: {hz} Hz"))]
    InvalidClock {
        /// The requested frequency.
        hz: u32,
    },
    /// The transfer exceeds the peripheral's maximum transfer size.
    #[snafu(display("Transfer of {len} bytes exceeds the maximum of {max} bytes"))]
    TransferTooLarge {
        /// The requested transfer length.
        len: usize,
        /// The maximum transfer length.
        max: usize,
    },
    /// A transfer of zero bytes was requested.
    EmptyTransfer,
    /// The previous transfer did not finish in time.
    Busy,
    /// The peripheral refused the transfer.
    Rejected,
}

/// Errors of [`LaneController::add_lane`](crate::LaneController::add_lane)
/// and [`LaneController::add_lane_manual`](crate::LaneController::add_lane_manual).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum LaneError {
    /// Lanes cannot be added after `finalize()`; call `reset()` first.
    AlreadyFinalized,
    /// The lane index does not exist on this bus.
    #[snafu(display("Lane {index} is out of range; the bus has {lanes} lanes"))]
    LaneOutOfRange {
        /// The requested lane.
        index: usize,
        /// The number of lanes of the bus.
        lanes: usize,
    },
    /// The lane is already registered.
    #[snafu(display("Lane {index} is already in use"))]
    LaneOccupied {
        /// The requested lane.
        index: usize,
    },
    /// All lanes are in use.
    NoFreeLane,
}

/// Errors of [`LaneController::finalize`](crate::LaneController::finalize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum FinalizeError {
    /// `begin()` has not succeeded yet.
    NotBegun,
    /// No lane is registered.
    NoLanes,
    /// Every registered lane has a length of zero.
    AllLanesEmpty,
    /// The transfer ceiling cannot hold a single byte of every lane.
    #[snafu(display("Transfer ceiling of {ceiling} bytes is below one byte per lane ({lanes} lanes)"))]
    CeilingTooSmall {
        /// The effective transfer ceiling, in bytes.
        ceiling: usize,
        /// The number of lanes of the bus.
        lanes: usize,
    },
    /// The driver could not provide a transmit buffer.
    #[snafu(display("Unable to allocate a DMA buffer of {size} bytes"))]
    BufferAllocation {
        /// The requested buffer size.
        size: usize,
    },
}
