use core::ops::{Deref, DerefMut};

/// A byte buffer backed by 32-bit words, so it is always word aligned.
///
/// `S` is the word storage, e.g. a boxed slice on hosted targets or a
/// `&'static mut [u32]` carved out of DMA-reachable RAM on embedded ones.
#[derive(Debug)]
pub struct DmaBuffer<S> {
    words: S,
    len: usize,
}

impl<S> DmaBuffer<S>
where
    S: AsRef<[u32]> + AsMut<[u32]>,
{
    /// Wraps `words` as a buffer of `len` bytes.
    ///
    /// Returns `None` if the storage is too small.
    pub fn new(words: S, len: usize) -> Option<Self> {
        if len > words.as_ref().len() * 4 {
            return None;
        }
        Some(Self { words, len })
    }

    /// The number of words needed to hold `len` bytes.
    pub const fn words_for(len: usize) -> usize {
        (len + 3) / 4
    }

    /// The backing words, including the unused tail of the last word.
    pub fn words(&self) -> &[u32] {
        let words = self.words.as_ref();
        &words[..Self::words_for(self.len)]
    }

    /// Gives the storage back.
    pub fn into_storage(self) -> S {
        self.words
    }
}

impl<S> Deref for DmaBuffer<S>
where
    S: AsRef<[u32]> + AsMut<[u32]>,
{
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        let ptr = self.words.as_ref().as_ptr().cast();

        /* SAFETY
            `u32` has no padding bytes and a stricter alignment than `u8`,
            and `new` made sure that `len` bytes fit into the words.
        */
        unsafe { core::slice::from_raw_parts(ptr, self.len) }
    }
}

impl<S> DerefMut for DmaBuffer<S>
where
    S: AsRef<[u32]> + AsMut<[u32]>,
{
    fn deref_mut(&mut self) -> &mut [u8] {
        let ptr = self.words.as_mut().as_mut_ptr().cast();

        // SAFETY: see `deref`.
        unsafe { core::slice::from_raw_parts_mut(ptr, self.len) }
    }
}
