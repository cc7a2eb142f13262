use alloc::vec::Vec;

/// The largest single transfer a bus accepts by default, in bytes.
pub const MAX_TRANSFER_BYTES: usize = 65536;

/// The default bus clock.
pub const DEFAULT_CLOCK_HZ: u32 = 20_000_000;

/// Physical configuration of a multi-line SPI bus.
///
/// Clock frequencies above what the peripheral can safely produce are a
/// caller error; drivers only reject frequencies they cannot generate at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Peripheral instance, e.g. `2` for SPI2 or FlexSPI2.
    pub bus: u8,
    /// The clock line.
    pub clock_pin: u8,
    /// The data lines; lane `j` drives `data_pins[j]`.
    pub data_pins: Vec<u8>,
    /// Bus clock frequency in Hz.
    pub clock_hz: u32,
    /// Upper bound for a single transfer, in bytes.
    pub max_transfer_bytes: usize,
}

impl BusConfig {
    /// Creates a configuration with the default clock and transfer ceiling.
    pub fn new(bus: u8, clock_pin: u8, data_pins: &[u8]) -> Self {
        Self {
            bus,
            clock_pin,
            data_pins: data_pins.to_vec(),
            clock_hz: DEFAULT_CLOCK_HZ,
            max_transfer_bytes: MAX_TRANSFER_BYTES,
        }
    }

    /// Sets the bus clock frequency.
    pub fn with_clock_hz(mut self, clock_hz: u32) -> Self {
        self.clock_hz = clock_hz;
        self
    }

    /// Sets the transfer ceiling.
    pub fn with_max_transfer_bytes(mut self, max_transfer_bytes: usize) -> Self {
        self.max_transfer_bytes = max_transfer_bytes;
        self
    }

    /// The number of data lines.
    pub fn lanes(&self) -> usize {
        self.data_pins.len()
    }
}

/// How long to wait for a transfer to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait until the transfer is done.
    Forever,
    /// Give up after the given number of microseconds.
    Micros(u32),
}

/// The default wait timeout: unbounded on bare-metal targets, one second
/// on hosted ones.
#[cfg(target_os = "none")]
pub const DEFAULT_WAIT_TIMEOUT: Timeout = Timeout::Forever;

/// The default wait timeout: unbounded on bare-metal targets, one second
/// on hosted ones.
#[cfg(not(target_os = "none"))]
pub const DEFAULT_WAIT_TIMEOUT: Timeout = Timeout::Micros(1_000_000);

impl Default for Timeout {
    fn default() -> Self {
        DEFAULT_WAIT_TIMEOUT
    }
}
