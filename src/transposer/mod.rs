//! Bit-interleaving of several lanes into one multi-line bus stream.

use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::lane::Lane;

mod bus_width;

pub use bus_width::{BusWidth, Octal, Quad, MAX_SUPPORTED_LANES};

#[cfg(test)]
pub(crate) use bus_width::tests::deinterleave;

/// Interleaves `lanes` into `out`.
///
/// Every lane is stretched to `lane_len` bytes: shorter lanes are prefixed
/// with their padding frame, longer ones are cut off. Slots that are `None`
/// (or missing) are filled with the padding frame of the first present lane,
/// or with `0x00` if there is none.
///
/// `out` must hold at least `lane_len * W::LANES` bytes; excess bytes
/// are left untouched.
pub fn interleave_into<W: BusWidth>(lanes: &[Option<Lane<'_>>], lane_len: usize, out: &mut [u8]) {
    let fill = lanes.iter().flatten().next().map(Lane::padding).unwrap_or_default();

    let mut gathered = [0u8; MAX_SUPPORTED_LANES];
    let gathered = &mut gathered[..W::LANES];

    for (pos, group) in out.chunks_exact_mut(W::LANES).take(lane_len).enumerate() {
        for (slot, byte) in gathered.iter_mut().enumerate() {
            *byte = match lanes.get(slot) {
                Some(Some(lane)) => lane.byte_at(pos, lane_len),
                _ => fill.byte_at(pos),
            };
        }
        W::interleave(gathered, group);
    }
}

/// Owns the interleaved output buffer and refills it every frame.
///
/// The buffer only grows when the lane length grows; once sized,
/// transposing the same geometry again never allocates.
#[derive(Debug)]
pub struct Transposer<W: BusWidth = Quad> {
    buffer: Vec<u8>,
    _width: PhantomData<W>,
}

impl<W: BusWidth> Transposer<W> {
    /// Creates a transposer with an empty buffer.
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            _width: PhantomData,
        }
    }

    /// Sizes the buffer for lanes of `lane_len` bytes.
    pub fn reserve(&mut self, lane_len: usize) {
        let size = lane_len * W::LANES;
        if self.buffer.len() != size {
            log::debug!(
                "Resizing interleave buffer from {} to {} bytes.",
                self.buffer.len(),
                size
            );
            self.buffer.resize(size, 0);
        }
    }

    /// Interleaves `lanes`, stretched to `lane_len` bytes each.
    ///
    /// Returns an empty slice if no lane is present.
    pub fn transpose(&mut self, lanes: &[Option<Lane<'_>>], lane_len: usize) -> &[u8] {
        if lanes.iter().all(Option::is_none) {
            return &[];
        }

        self.reserve(lane_len);
        interleave_into::<W>(lanes, lane_len, &mut self.buffer);
        &self.buffer
    }

    /// Interleaves `lanes`, stretching them to the longest one.
    pub fn transpose_to_longest(&mut self, lanes: &[Option<Lane<'_>>]) -> &[u8] {
        let lane_len = lanes.iter().flatten().map(Lane::len).max().unwrap_or(0);
        self.transpose(lanes, lane_len)
    }

    /// The most recently interleaved frame.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The allocated capacity of the interleave buffer, in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

impl<W: BusWidth> Default for Transposer<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::bus_width::tests::{deinterleave, interleave_naive};
    use super::*;
    use crate::padding::PaddingFrame;

    struct XorShift(u32);

    impl XorShift {
        fn next_u8(&mut self) -> u8 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            (self.0 >> 24) as u8
        }
    }

    fn lanes_of<'a>(data: &[&'a [u8]], padding: PaddingFrame) -> Vec<Option<Lane<'a>>> {
        data.iter().map(|d| Some(Lane::new(d, padding))).collect()
    }

    fn deinterleave_all(lanes: usize, interleaved: &[u8]) -> Vec<Vec<u8>> {
        let mut restored = vec![Vec::new(); lanes];
        let mut bytes = [0u8; MAX_SUPPORTED_LANES];
        for group in interleaved.chunks_exact(lanes) {
            deinterleave(lanes, group, &mut bytes);
            for (lane, restored) in restored.iter_mut().enumerate() {
                restored.push(bytes[lane]);
            }
        }
        restored
    }

    #[test]
    fn round_trip_bit_patterns() {
        let patterns: [[u8; 4]; 3] = [
            [0x00, 0x00, 0x00, 0x00],
            [0xFF, 0xFF, 0xFF, 0xFF],
            [0xAA, 0x55, 0xFF, 0x00],
        ];

        let mut transposer = Transposer::<Quad>::new();
        for pattern in patterns {
            let data: Vec<Vec<u8>> = pattern.iter().map(|&b| vec![b; 16]).collect();
            let views: Vec<&[u8]> = data.iter().map(Vec::as_slice).collect();
            let lanes = lanes_of(&views, PaddingFrame::default());

            let out = transposer.transpose_to_longest(&lanes);
            assert_eq!(out.len(), 16 * 4);
            assert_eq!(deinterleave_all(4, out), data);
        }
    }

    #[test]
    fn round_trip_mixed_content_octal() {
        let data: Vec<Vec<u8>> = (0..8u8)
            .map(|lane| (0..10u8).map(|i| lane.wrapping_mul(37) ^ i).collect())
            .collect();
        let views: Vec<&[u8]> = data.iter().map(Vec::as_slice).collect();
        let lanes = lanes_of(&views, PaddingFrame::default());

        let mut transposer = Transposer::<Octal>::new();
        let out = transposer.transpose_to_longest(&lanes);
        assert_eq!(out.len(), 10 * 8);
        assert_eq!(deinterleave_all(8, out), data);
    }

    #[test]
    fn optimized_matches_naive_for_random_frames() {
        let mut rng = XorShift(0x1234_5678);
        let mut transposer = Transposer::<Quad>::new();

        for _ in 0..128 {
            let data: Vec<Vec<u8>> = (0..4)
                .map(|_| (0..24).map(|_| rng.next_u8()).collect())
                .collect();
            let views: Vec<&[u8]> = data.iter().map(Vec::as_slice).collect();
            let lanes = lanes_of(&views, PaddingFrame::default());

            let fast = transposer.transpose_to_longest(&lanes).to_vec();

            let mut slow = vec![0u8; fast.len()];
            for (pos, group) in slow.chunks_exact_mut(4).enumerate() {
                let column = [data[0][pos], data[1][pos], data[2][pos], data[3][pos]];
                interleave_naive(4, &column, group);
            }

            assert_eq!(fast, slow);
        }
    }

    #[test]
    fn padding_is_prepended_so_lanes_end_together() {
        let padding = PaddingFrame::quad([0xE0, 0x00, 0x00, 0x00]);
        let short = [0x11, 0x22, 0x33, 0x44];
        let long = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C];
        let lanes = lanes_of(&[&long[..], &short[..]], padding);

        let mut transposer = Transposer::<Quad>::new();
        let restored = deinterleave_all(4, transposer.transpose_to_longest(&lanes));

        assert_eq!(restored[0], long);
        assert_eq!(
            restored[1],
            [0xE0, 0x00, 0x00, 0x00, 0xE0, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44]
        );

        // Real content of both lanes ends on the last byte
        assert_eq!(restored[0].last(), Some(&0x0C));
        assert_eq!(restored[1].last(), Some(&0x44));
    }

    #[test]
    fn unused_slots_get_first_lane_padding() {
        let lanes = [
            None,
            Some(Lane::new(&[0x12, 0x34], PaddingFrame::single(0x80))),
            None,
            None,
        ];

        let mut transposer = Transposer::<Quad>::new();
        let restored = deinterleave_all(4, transposer.transpose_to_longest(&lanes));

        assert_eq!(restored[0], [0x80, 0x80]);
        assert_eq!(restored[1], [0x12, 0x34]);
        assert_eq!(restored[2], [0x80, 0x80]);
        assert_eq!(restored[3], [0x80, 0x80]);
    }

    #[test]
    fn no_lanes_yields_empty_output() {
        let mut transposer = Transposer::<Quad>::new();
        assert!(transposer.transpose(&[], 10).is_empty());
        assert!(transposer.transpose(&[None, None, None, None], 10).is_empty());
        assert_eq!(transposer.capacity(), 0);
    }

    #[test]
    fn repeated_frames_reuse_the_buffer() {
        let data = [0x5A; 100];
        let lanes = [Some(Lane::new(&data, PaddingFrame::default()))];

        let mut transposer = Transposer::<Quad>::new();
        transposer.reserve(100);
        let ptr = transposer.buffer().as_ptr();
        let capacity = transposer.capacity();

        for _ in 0..10 {
            assert_eq!(transposer.transpose(&lanes, 100).len(), 400);
        }

        assert_eq!(transposer.capacity(), capacity);
        assert_eq!(transposer.buffer().as_ptr(), ptr);
    }
}
