/// The widest bus any [`BusWidth`] may describe.
pub const MAX_SUPPORTED_LANES: usize = 8;

/// The number of data lines a bus transmits on in parallel.
///
/// Every lane gets one bit of every data line clock cycle; lane `j` drives
/// data line `j`. For each lane byte position, [`interleave`](BusWidth::interleave)
/// turns one byte of every lane into `LANES` bytes on the wire.
pub trait BusWidth {
    /// The number of lanes, and the number of output bytes per lane byte.
    const LANES: usize;

    /// Interleaves one byte of every lane.
    ///
    /// `lane_bytes` and `out` must both hold exactly `LANES` bytes.
    /// Bit `LANES * k + j` of the big-endian word stored to `out`
    /// is bit `k` of `lane_bytes[j]`.
    fn interleave(lane_bytes: &[u8], out: &mut [u8]);
}

/// Four data lines (Quad-SPI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quad;

/// Eight data lines (Octal-SPI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Octal;

// Moves bit k of x to bit 4k.
fn spread4(x: u8) -> u32 {
    let mut x = u32::from(x);

    x = (x | (x << 12)) & 0x000F000F;
    x = (x | (x << 6)) & 0x03030303;
    x = (x | (x << 3)) & 0x11111111;

    x
}

// Moves bit k of x to bit 8k.
fn spread8(x: u8) -> u64 {
    let mut x = u64::from(x);

    x = (x | (x << 28)) & 0x0000_000F_0000_000F;
    x = (x | (x << 14)) & 0x0003_0003_0003_0003;
    x = (x | (x << 7)) & 0x0101_0101_0101_0101;

    x
}

impl BusWidth for Quad {
    const LANES: usize = 4;

    #[inline]
    fn interleave(lane_bytes: &[u8], out: &mut [u8]) {
        let word = lane_bytes
            .iter()
            .take(Self::LANES)
            .enumerate()
            .fold(0u32, |word, (lane, &byte)| word | (spread4(byte) << lane));

        // MSB first on the wire
        out[..Self::LANES].copy_from_slice(&word.to_be_bytes());
    }
}

impl BusWidth for Octal {
    const LANES: usize = 8;

    #[inline]
    fn interleave(lane_bytes: &[u8], out: &mut [u8]) {
        let word = lane_bytes
            .iter()
            .take(Self::LANES)
            .enumerate()
            .fold(0u64, |word, (lane, &byte)| word | (spread8(byte) << lane));

        out[..Self::LANES].copy_from_slice(&word.to_be_bytes());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Bit-by-bit version of [`BusWidth::interleave`].
    pub(crate) fn interleave_naive(lanes: usize, lane_bytes: &[u8], out: &mut [u8]) {
        for (byte_pos, out_byte) in out.iter_mut().take(lanes).enumerate() {
            *out_byte = 0;
            for bit_pos in 0..8 {
                let word_bit = (lanes - 1 - byte_pos) * 8 + bit_pos;
                let lane = word_bit % lanes;
                let lane_bit = word_bit / lanes;
                let bit = (lane_bytes[lane] >> lane_bit) & 1;
                *out_byte |= bit << bit_pos;
            }
        }
    }

    /// Reconstructs the lane bytes from one interleaved group.
    pub(crate) fn deinterleave(lanes: usize, group: &[u8], lane_bytes: &mut [u8]) {
        lane_bytes[..lanes].fill(0);
        for (byte_pos, &byte) in group.iter().take(lanes).enumerate() {
            for bit_pos in 0..8 {
                let word_bit = (lanes - 1 - byte_pos) * 8 + bit_pos;
                let bit = (byte >> bit_pos) & 1;
                lane_bytes[word_bit % lanes] |= bit << (word_bit / lanes);
            }
        }
    }

    #[test]
    fn spread4_moves_every_bit() {
        for bit in 0..8 {
            assert_eq!(spread4(1 << bit), 1 << (4 * bit));
        }
        assert_eq!(spread4(0xFF), 0x11111111);
    }

    #[test]
    fn spread8_moves_every_bit() {
        for bit in 0..8 {
            assert_eq!(spread8(1 << bit), 1 << (8 * bit));
        }
        assert_eq!(spread8(0xFF), 0x0101_0101_0101_0101);
    }

    #[test]
    fn quad_lane_maps_to_data_line() {
        let mut out = [0; 4];

        Quad::interleave(&[0xFF, 0x00, 0x00, 0x00], &mut out);
        assert_eq!(out, [0x11; 4]);

        Quad::interleave(&[0x00, 0x00, 0x00, 0xFF], &mut out);
        assert_eq!(out, [0x88; 4]);

        // MSB of lane 3 is the first bit on data line 3
        Quad::interleave(&[0x00, 0x00, 0x00, 0x80], &mut out);
        assert_eq!(out, [0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn octal_lane_maps_to_data_line() {
        let mut out = [0; 8];

        Octal::interleave(&[0x80, 0, 0, 0, 0, 0, 0, 0x01], &mut out);
        assert_eq!(out, [0x01, 0, 0, 0, 0, 0, 0, 0x80]);

        Octal::interleave(&[0xFF, 0, 0, 0, 0, 0, 0, 0], &mut out);
        assert_eq!(out, [0x01; 8]);
    }

    #[test]
    fn optimized_matches_naive_on_every_single_bit() {
        for lane in 0..4 {
            for bit in 0..8 {
                let mut input = [0u8; 4];
                input[lane] = 1 << bit;

                let mut fast = [0; 4];
                let mut slow = [0; 4];
                Quad::interleave(&input, &mut fast);
                interleave_naive(4, &input, &mut slow);
                assert_eq!(fast, slow, "lane {lane}, bit {bit}");
            }
        }

        for lane in 0..8 {
            for bit in 0..8 {
                let mut input = [0u8; 8];
                input[lane] = 1 << bit;

                let mut fast = [0; 8];
                let mut slow = [0; 8];
                Octal::interleave(&input, &mut fast);
                interleave_naive(8, &input, &mut slow);
                assert_eq!(fast, slow, "lane {lane}, bit {bit}");
            }
        }
    }

    #[test]
    fn deinterleave_inverts_interleave() {
        let input = [0xAA, 0x55, 0xFF, 0x00];
        let mut out = [0; 4];
        Quad::interleave(&input, &mut out);

        let mut restored = [0; 4];
        deinterleave(4, &out, &mut restored);
        assert_eq!(restored, input);
    }
}
