//! Per-chipset padding frames and encoded lengths.
//!
//! Encoding the actual colors is up to the caller; a lane only needs to know
//! how many bytes a strip of a given length takes, and what an "off" LED
//! looks like on the wire.

use crate::padding::PaddingFrame;

/// The parts of a chipset's wire protocol the lane controller relies on.
pub trait Chipset {
    /// A frame that represents a dark LED.
    const PADDING: PaddingFrame;

    /// The number of bytes a fully encoded strip of `num_leds` LEDs takes.
    fn encoded_len(num_leds: usize) -> usize;
}

// Lengths saturate; the controller clamps them to the transfer ceiling.
fn div_ceil(n: usize, d: usize) -> usize {
    n / d + usize::from(n % d != 0)
}

/// APA102 / DotStar.
///
/// Start frame of 4 zero bytes, 4 bytes per LED, and an end frame
/// of at least one clock edge per two LEDs.
pub struct Apa102;

impl Chipset for Apa102 {
    const PADDING: PaddingFrame = PaddingFrame::quad([0xE0, 0x00, 0x00, 0x00]);

    fn encoded_len(num_leds: usize) -> usize {
        4usize
            .saturating_add(num_leds.saturating_mul(4))
            .saturating_add(div_ceil(num_leds, 16))
    }
}

/// LPD8806, 7-bit color with the MSB set in every data byte.
pub struct Lpd8806;

impl Chipset for Lpd8806 {
    const PADDING: PaddingFrame = PaddingFrame::single(0x80);

    fn encoded_len(num_leds: usize) -> usize {
        // One zero latch byte per 32 LEDs
        num_leds
            .saturating_mul(3)
            .saturating_add(div_ceil(num_leds, 32))
    }
}

/// WS2801, raw 24-bit RGB.
pub struct Ws2801;

impl Chipset for Ws2801 {
    const PADDING: PaddingFrame = PaddingFrame::single(0x00);

    fn encoded_len(num_leds: usize) -> usize {
        num_leds.saturating_mul(3)
    }
}

/// P9813, flag/checksum byte followed by BGR.
pub struct P9813;

impl Chipset for P9813 {
    const PADDING: PaddingFrame = PaddingFrame::quad([0xFF, 0x00, 0x00, 0x00]);

    fn encoded_len(num_leds: usize) -> usize {
        // Zero start and end frames
        num_leds.saturating_mul(4).saturating_add(8)
    }
}
