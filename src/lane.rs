use crate::padding::PaddingFrame;

/// Identifies a registered lane; equal to the data line it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneId(pub(crate) u8);

impl LaneId {
    /// The lane index, in `[0, LANES)`.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A borrowed view of one strip's encoded bytes for the current frame.
///
/// Lanes never own their data. The borrow only has to live until the
/// interleaved frame has been produced, which happens inside
/// [`LaneController::transmit`](crate::LaneController::transmit).
#[derive(Debug, Clone, Copy)]
pub struct Lane<'a> {
    data: &'a [u8],
    padding: PaddingFrame,
}

impl<'a> Lane<'a> {
    /// Creates a lane view.
    pub fn new(data: &'a [u8], padding: PaddingFrame) -> Self {
        Self { data, padding }
    }

    /// The encoded bytes of this lane.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The number of encoded bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the lane has no data this frame.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The padding frame of the lane's chipset.
    pub fn padding(&self) -> PaddingFrame {
        self.padding
    }

    /// Returns the byte this lane emits at `pos` when stretched to `target_len`.
    ///
    /// Lanes shorter than `target_len` are prefixed with their padding frame,
    /// so their real content ends at the same position as the longest lane.
    /// Lanes longer than `target_len` are truncated at the end.
    #[inline]
    pub(crate) fn byte_at(&self, pos: usize, target_len: usize) -> u8 {
        let len = self.data.len().min(target_len);
        let lead = target_len - len;
        if pos < lead {
            self.padding.byte_at(pos)
        } else {
            self.data[pos - lead]
        }
    }
}

/// The registered shape of a lane: how long it is expected to be,
/// and which padding its chipset uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LaneSlot {
    pub len: usize,
    pub padding: PaddingFrame,
}
