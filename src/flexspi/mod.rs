//! Quad-SPI output on the i.MX RT FlexSPI peripheral.

use core::ops::Deref;

use imxrt_ral as ral;

use ral::{flexspi, Valid};

use crate::{
    driver::{BusConfig, DmaBuffer, DmaDriver, Timeout},
    errors::DriverError,
};

mod shared;

pub use shared::FlexSpiShared;
use shared::{FeedState, TX_WATERMARK_WORDS};

/// FlexSPI counts IP transfers in a 16-bit field; keep it a multiple of 8.
pub const FLEXSPI_MAX_TRANSFER_BYTES: usize = 0xFFF8;

/// Busy-wait iterations per microsecond, approximately, at 600 MHz.
const POLLS_PER_MICROSECOND: u32 = 10;

const LUT_KEY: u32 = 0x5AF0_5AF0;
const LUT_OPCODE_WRITE_SDR: u32 = 0x08;
const LUT_PADS_QUAD: u32 = 0x02;

/// A FlexSPI peripheral which is temporarily disabled.
struct Disabled<'a, const N: u8> {
    flexspi: &'a flexspi::Instance<N>,
    disabled: bool,
}

impl<'a, const N: u8> Disabled<'a, N> {
    fn new(flexspi: &'a mut flexspi::Instance<N>) -> Self {
        let disabled = ral::read_reg!(ral::flexspi, flexspi, MCR0, MDIS == 1);
        ral::modify_reg!(ral::flexspi, flexspi, MCR0, MDIS: 1);
        Self { flexspi, disabled }
    }
}

impl<const N: u8> Drop for Disabled<'_, N> {
    fn drop(&mut self) {
        ral::modify_reg!(ral::flexspi, self.flexspi, MCR0, MDIS: self.disabled as u32);
    }
}

/// Drives four LED lanes from the FlexSPI DATA0..DATA3 pads.
///
/// Every frame is sent as one IP write command. The CPU feeds the TX FIFO
/// from the FlexSPI interrupt; [`FlexSpiShared::on_interrupt`] must be
/// called from the interrupt handler of instance `N`. Waiting also services
/// the FIFO, so blocking use works without the interrupt.
///
/// The pads and the FlexSPI root clock have to be configured by the caller.
/// There is no further clock divider; the bus runs at the root clock.
pub struct FlexSpiDriver<const N: u8>
where
    flexspi::Instance<N>: Valid,
{
    flexspi: flexspi::Instance<N>,
    shared: &'static FlexSpiShared<N>,
    pool: Option<&'static mut [u32]>,
    root_clock_hz: u32,
    config: Option<BusConfig>,
    active: bool,
}

impl<const N: u8> FlexSpiDriver<N>
where
    flexspi::Instance<N>: Valid,
{
    /// Creates the driver.
    ///
    /// `pool` is handed out as the transmit buffer; it has to hold one frame.
    /// `root_clock_hz` is the FlexSPI root clock as configured in the CCM.
    pub fn new(
        flexspi: flexspi::Instance<N>,
        shared: &'static FlexSpiShared<N>,
        pool: &'static mut [u32],
        root_clock_hz: u32,
    ) -> Self {
        Self {
            flexspi,
            shared,
            pool: Some(pool),
            root_clock_hz,
            config: None,
            active: false,
        }
    }

    fn check_config(&self, config: &BusConfig) -> Result<(), DriverError> {
        let count = config.lanes();
        if count != 4 {
            return Err(DriverError::UnsupportedLaneCount { count });
        }

        if config.clock_hz != self.root_clock_hz {
            return Err(DriverError::InvalidClock {
                hz: config.clock_hz,
            });
        }

        // Lane `i` is wired to DATAi.
        for (line, &pin) in config.data_pins.iter().enumerate() {
            if usize::from(pin) == line {
                continue;
            }
            if config.data_pins[..line].contains(&pin) {
                return Err(DriverError::DuplicatePin { pin });
            }
            return Err(DriverError::InvalidPin { pin });
        }

        Ok(())
    }

    fn init_hardware(&mut self) {
        // Enable and wait for reset finished
        ral::modify_reg!(ral::flexspi, self.flexspi, MCR0, MDIS: 0);
        while ral::read_reg!(ral::flexspi, self.flexspi, MCR0, SWRESET == 1) {}

        self.disabled(|disabled| {
            ral::modify_reg!(
                ral::flexspi,
                disabled.flexspi,
                MCR0,
                SCKFREERUNEN: SCKFREERUNEN_0,
                COMBINATIONEN: COMBINATIONEN_0,
                DOZEEN: DOZEEN_0,
                HSEN: HSEN_0,
                ATDFEN: ATDFEN_0,
                ARDFEN: ARDFEN_0,
                RXCLKSRC: RXCLKSRC_0
            );

            ral::write_reg!(
                ral::flexspi,
                disabled.flexspi,
                MCR1,
                SEQWAIT: 0xffff,
                AHBBUSWAIT: 0xffff
            );

            ral::modify_reg!(
                ral::flexspi,
                disabled.flexspi,
                MCR2,
                RESUMEWAIT: 0x2f,
                SCKBDIFFOPT: SCKBDIFFOPT_0,
                SAMEDEVICEEN: SAMEDEVICEEN_1,
                CLRAHBBUFOPT: CLRAHBBUFOPT_0
            );

            ral::modify_reg!(
                ral::flexspi,
                disabled.flexspi,
                DLLCR[0],
                OVRDVAL: 0,
                OVRDEN: 1,
                SLVDLYTARGET: 0,
                DLLRESET: 0,
                DLLEN: 0
            );

            // IP commands need a non-empty device on port A1; size in KB
            ral::write_reg!(ral::flexspi, disabled.flexspi, FLSHCR0[0], FLSHSZ: 64);
        });

        // Sequence 0: WRITE_SDR on four pads, then STOP
        ral::write_reg!(ral::flexspi, self.flexspi, LUTKEY, LUT_KEY);
        ral::write_reg!(ral::flexspi, self.flexspi, LUTCR, LOCK: 0, UNLOCK: 1);
        for i in 0..self.flexspi.LUT.len() {
            ral::write_reg!(ral::flexspi, self.flexspi, LUT[i], 0);
        }
        ral::write_reg!(
            ral::flexspi, self.flexspi, LUT[0],
            OPCODE0: LUT_OPCODE_WRITE_SDR, NUM_PADS0: LUT_PADS_QUAD, OPERAND0: 0,
            OPCODE1: 0x00, NUM_PADS1: 0x0, OPERAND1: 0x00
        );
        ral::write_reg!(ral::flexspi, self.flexspi, LUTKEY, LUT_KEY);
        ral::write_reg!(ral::flexspi, self.flexspi, LUTCR, LOCK: 1, UNLOCK: 0);

        // Watermark in units of 64 bits
        ral::write_reg!(
            ral::flexspi, self.flexspi, IPTXFCR,
            TXWMRK: (TX_WATERMARK_WORDS / 2 - 1) as u32,
            TXDMAEN: 0,
            CLRIPTXF: 1
        );

        // Soft Reset to properly apply settings
        self.soft_reset();
    }

    fn soft_reset(&mut self) {
        ral::modify_reg!(ral::flexspi, self.flexspi, MCR0, SWRESET: 1);
        while ral::read_reg!(ral::flexspi, self.flexspi, MCR0, SWRESET == 1) {}
    }

    /// Temporarily disable the FlexSPI peripheral.
    ///
    /// The handle to a [`Disabled`] driver lets you modify FlexSPI settings
    /// that require a fully disabled peripheral.
    fn disabled<R>(&mut self, func: impl FnOnce(&mut Disabled<N>) -> R) -> R {
        let mut disabled = Disabled::new(&mut self.flexspi);
        func(&mut disabled)
    }

    fn start(&mut self, buffer: &DmaBuffer<&'static mut [u32]>, len: usize) {
        let words = &buffer.words()[..DmaBuffer::<&'static mut [u32]>::words_for(len)];

        self.shared.watcher.clear();
        critical_section::with(|cs| {
            *self.shared.feed.borrow(cs).borrow_mut() = Some(FeedState {
                // SAFETY: a second handle to the same instance, only used
                // inside of critical sections.
                flexspi: unsafe { flexspi::Instance::<N>::new(self.flexspi.deref()) },
                next: words.as_ptr(),
                remaining: words.len(),
            });
        });

        ral::modify_reg!(ral::flexspi, self.flexspi, IPTXFCR, CLRIPTXF: 1);

        /*
            From reference manual:

            1. Fill IP TX FIFO with programming data.
            2. Set flash access start address (IPCR0[SFAR]).
            3. Write the IPCR1 with the data size, sequence index, and sequence number.
            4. Trigger flash access command by writing 1 to IPCMD[TRG].
            5. Wait for INTR[IPCMDDONE].

            The FIFO is refilled from the watermark interrupt while the command runs.
        */
        ral::write_reg!(ral::flexspi, self.flexspi, IPCR0, SFAR: 0);
        ral::write_reg!(
            ral::flexspi, self.flexspi, IPCR1,
            IPAREN: 0,
            ISEQID: 0,
            ISEQNUM: 0,
            IDATSZ: len as u32
        );

        // Reset interrupt flags
        ral::write_reg!(
            ral::flexspi, self.flexspi, INTR,
            IPCMDDONE: 1,
            IPCMDERR: 1,
            IPCMDGE: 1
        );

        self.shared.on_interrupt();

        ral::write_reg!(
            ral::flexspi, self.flexspi, INTEN,
            IPCMDDONEEN: 1,
            IPCMDERREN: 1,
            IPTXWEEN: 1
        );

        // Start!
        ral::write_reg!(ral::flexspi, self.flexspi, IPCMD, TRG: 1);

        self.active = true;
    }
}

impl<const N: u8> DmaDriver for FlexSpiDriver<N>
where
    flexspi::Instance<N>: Valid,
{
    type Buffer = DmaBuffer<&'static mut [u32]>;

    fn begin(&mut self, config: &BusConfig) -> Result<(), DriverError> {
        if self.config.is_some() {
            return Ok(());
        }

        self.check_config(config)?;

        log::debug!("Initializing FlexSPI #{}.", N);
        log::debug!("    Clock: {} Hz", config.clock_hz);
        log::debug!("    Data pins: {:?}", config.data_pins);
        if config.bus != N {
            log::warn!("Configured for bus #{}, but running on FlexSPI #{}.", config.bus, N);
        }

        self.init_hardware();
        self.config = Some(config.clone());
        Ok(())
    }

    fn allocate_dma_buffer(&mut self, size: usize) -> Option<Self::Buffer> {
        self.config.as_ref()?;

        let Some(pool) = self.pool.take() else {
            log::warn!("Transmit buffer is already handed out.");
            return None;
        };

        if DmaBuffer::<&'static mut [u32]>::words_for(size) > pool.len() {
            log::warn!(
                "Out of DMA memory: {} bytes requested, pool holds {}.",
                size,
                pool.len() * 4
            );
            self.pool = Some(pool);
            return None;
        }

        DmaBuffer::new(pool, size)
    }

    fn free_dma_buffer(&mut self, buffer: Self::Buffer) {
        if self.active {
            self.force_complete();
        }
        self.pool = Some(buffer.into_storage());
    }

    fn transmit_async(&mut self, buffer: &Self::Buffer, len: usize) -> Result<(), DriverError> {
        if self.config.is_none() {
            return Err(DriverError::NotInitialized);
        }

        if len == 0 {
            return Err(DriverError::EmptyTransfer);
        }

        let max = buffer.len().min(self.max_transfer_bytes());
        if len > max {
            return Err(DriverError::TransferTooLarge { len, max });
        }

        if self.active && !self.wait_complete(Timeout::Forever) {
            return Err(DriverError::Busy);
        }

        self.start(buffer, len);
        Ok(())
    }

    fn wait_complete(&mut self, timeout: Timeout) -> bool {
        if !self.active {
            return true;
        }

        let max_polls = match timeout {
            Timeout::Forever => None,
            Timeout::Micros(us) => Some(us.saturating_mul(POLLS_PER_MICROSECOND)),
        };

        let shared = self.shared;
        let finished = shared.watcher.block_until_finished(max_polls, || {
            shared.on_interrupt();
            core::hint::spin_loop();
        });

        if finished {
            self.active = false;
        }
        finished
    }

    fn is_busy(&self) -> bool {
        self.active && !self.shared.watcher.poll()
    }

    fn force_complete(&mut self) {
        if !self.active {
            return;
        }

        log::warn!("Aborting FlexSPI #{} transfer.", N);

        ral::write_reg!(ral::flexspi, self.flexspi, INTEN, 0);
        critical_section::with(|cs| {
            *self.shared.feed.borrow(cs).borrow_mut() = None;
        });

        // Aborts the IP command and flushes the FIFOs
        self.soft_reset();
        ral::write_reg!(
            ral::flexspi, self.flexspi, INTR,
            IPCMDDONE: 1,
            IPCMDERR: 1,
            IPCMDGE: 1,
            IPTXWE: 1
        );

        self.shared.watcher.signal();
        self.active = false;
    }

    fn max_transfer_bytes(&self) -> usize {
        self.config
            .as_ref()
            .map_or(FLEXSPI_MAX_TRANSFER_BYTES, |config| {
                config.max_transfer_bytes.min(FLEXSPI_MAX_TRANSFER_BYTES)
            })
    }
}
