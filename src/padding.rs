/// The largest padding frame a chipset may declare.
pub const MAX_PADDING_FRAME_LEN: usize = 4;

/// A fixed byte sequence that means "output nothing visible" for a chipset.
///
/// Lanes that are shorter than the longest lane get this frame repeated
/// in front of their data, and unused lanes are filled with it entirely.
///
/// Frames are plain `Copy` values, so they are never allocated per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingFrame {
    bytes: [u8; MAX_PADDING_FRAME_LEN],
    len: u8,
}

impl PaddingFrame {
    /// A frame consisting of a single byte.
    pub const fn single(byte: u8) -> Self {
        Self {
            bytes: [byte, 0, 0, 0],
            len: 1,
        }
    }

    /// A four byte frame.
    pub const fn quad(bytes: [u8; 4]) -> Self {
        Self { bytes, len: 4 }
    }

    /// Creates a frame from 1 to 4 bytes.
    ///
    /// Returns `None` if `bytes` is empty or longer than [`MAX_PADDING_FRAME_LEN`].
    pub const fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > MAX_PADDING_FRAME_LEN {
            return None;
        }

        let mut frame = [0; MAX_PADDING_FRAME_LEN];
        let mut i = 0;
        while i < bytes.len() {
            frame[i] = bytes[i];
            i += 1;
        }

        Some(Self {
            bytes: frame,
            len: bytes.len() as u8,
        })
    }

    /// The bytes of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// The number of bytes in the frame.
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Always `false`; a frame has at least one byte.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The byte at position `pos` of an endless repetition of this frame.
    #[inline]
    pub const fn byte_at(&self, pos: usize) -> u8 {
        self.bytes[pos % self.len as usize]
    }
}

impl Default for PaddingFrame {
    fn default() -> Self {
        Self::single(0x00)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_at_repeats_the_frame() {
        let frame = PaddingFrame::quad([0xE0, 0x01, 0x02, 0x03]);
        let repeated: [u8; 6] = core::array::from_fn(|i| frame.byte_at(i));
        assert_eq!(repeated, [0xE0, 0x01, 0x02, 0x03, 0xE0, 0x01]);

        let frame = PaddingFrame::single(0x80);
        assert_eq!(frame.byte_at(0), 0x80);
        assert_eq!(frame.byte_at(17), 0x80);
    }

    #[test]
    fn from_slice_rejects_bad_lengths() {
        assert_eq!(PaddingFrame::from_slice(&[]), None);
        assert_eq!(PaddingFrame::from_slice(&[0; 5]), None);

        let frame = PaddingFrame::from_slice(&[0xFF, 0x00]).unwrap();
        assert_eq!(frame.as_bytes(), &[0xFF, 0x00]);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn default_is_a_zero_byte() {
        assert_eq!(PaddingFrame::default().as_bytes(), &[0x00]);
    }
}
