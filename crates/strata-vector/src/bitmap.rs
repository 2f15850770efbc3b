#![forbid(unsafe_code)]

/// A compact bit vector used for bool columns and null masks.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// As a null mask, the empty bit vector (the *zero* value) means "no nulls" regardless of the
/// length of the vector it annotates; [`BitVec::value`] reads it as all-false.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
            ones: 0,
        }
    }

    /// The "no nulls" mask.
    pub fn zero() -> Self {
        Self::new()
    }

    pub fn with_capacity_bits(bits: usize) -> Self {
        let words = (bits + 63) / 64;
        Self {
            words: Vec::with_capacity(words),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_len_all_true(bits: usize) -> Self {
        if bits == 0 {
            return Self::new();
        }

        let word_len = (bits + 63) / 64;
        let mut words = vec![u64::MAX; word_len];
        let rem = bits % 64;
        if rem != 0 {
            let mask = (1u64 << rem) - 1;
            if let Some(last) = words.last_mut() {
                *last = mask;
            }
        }

        Self {
            words,
            len: bits,
            ones: bits,
        }
    }

    pub fn with_len_all_false(bits: usize) -> Self {
        if bits == 0 {
            return Self::new();
        }
        let word_len = (bits + 63) / 64;
        Self {
            words: vec![0u64; word_len],
            len: bits,
            ones: 0,
        }
    }

    pub fn from_bools(bits: impl IntoIterator<Item = bool>) -> Self {
        let iter = bits.into_iter();
        let mut out = Self::with_capacity_bits(iter.size_hint().0);
        for b in iter {
            out.push(b);
        }
        out
    }

    /// Builds a mask of length `len` with the listed positions set.
    pub fn from_positions(len: usize, positions: &[u32]) -> Self {
        let mut out = Self::with_len_all_false(len);
        for &p in positions {
            out.set(p as usize, true);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True for the zero mask (no bits at all).
    pub fn is_zero(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }

        if value {
            let word = self.len / 64;
            self.words[word] |= 1u64 << bit;
            self.ones += 1;
        }

        self.len += 1;
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        let word = self.words[index / 64];
        let bit = index % 64;
        ((word >> bit) & 1) == 1
    }

    /// Reads slot `slot`, treating the zero mask as all-false.
    pub fn value(&self, slot: u32) -> bool {
        let slot = slot as usize;
        slot < self.len && self.get(slot)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        let word_idx = index / 64;
        let bit = index % 64;
        let mask = 1u64 << bit;
        let was_set = (self.words[word_idx] & mask) != 0;

        match (was_set, value) {
            (true, false) => {
                self.words[word_idx] &= !mask;
                self.ones -= 1;
            }
            (false, true) => {
                self.words[word_idx] |= mask;
                self.ones += 1;
            }
            _ => {}
        }
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn true_count(&self) -> u32 {
        self.ones as u32
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn any(&self) -> bool {
        self.ones > 0
    }

    pub fn as_words(&self) -> &[u64] {
        &self.words
    }

    /// Positions of the set bits, in order.
    pub fn ones(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros();
                word &= word - 1;
                Some((w * 64) as u32 + bit)
            })
        })
    }

    pub fn positions(&self) -> Vec<u32> {
        self.ones().collect()
    }

    /// Gathers the bits at `index`. A zero mask stays zero.
    pub fn pick(&self, index: &[u32]) -> BitVec {
        if self.is_zero() {
            return BitVec::zero();
        }
        BitVec::from_bools(index.iter().map(|&i| self.get(i as usize)))
    }

    pub fn and_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "BitVec length mismatch");
        let len = self.len;
        let full_words = len / 64;
        let rem_bits = len % 64;

        let mut ones: usize = 0;
        for (i, w) in self.words.iter_mut().enumerate().take(full_words) {
            *w &= other.words.get(i).copied().unwrap_or(0);
            ones = ones.saturating_add(w.count_ones() as usize);
        }

        if rem_bits > 0 {
            let mask = (1u64 << rem_bits) - 1;
            if let Some(last) = self.words.get_mut(full_words) {
                *last &= other.words.get(full_words).copied().unwrap_or(0);
                *last &= mask;
                ones = ones.saturating_add(last.count_ones() as usize);
            }
        }

        self.ones = ones;
    }

    pub fn or_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "BitVec length mismatch");
        let len = self.len;
        let full_words = len / 64;
        let rem_bits = len % 64;

        let mut ones: usize = 0;
        for (i, w) in self.words.iter_mut().enumerate().take(full_words) {
            *w |= other.words.get(i).copied().unwrap_or(0);
            ones = ones.saturating_add(w.count_ones() as usize);
        }

        if rem_bits > 0 {
            let mask = (1u64 << rem_bits) - 1;
            if let Some(last) = self.words.get_mut(full_words) {
                *last |= other.words.get(full_words).copied().unwrap_or(0);
                *last &= mask;
                ones = ones.saturating_add(last.count_ones() as usize);
            }
        }

        self.ones = ones;
    }

    pub fn not_inplace(&mut self) {
        if self.len == 0 {
            return;
        }

        for w in &mut self.words {
            *w = !*w;
        }

        let rem_bits = self.len % 64;
        if rem_bits != 0 {
            let mask = (1u64 << rem_bits) - 1;
            if let Some(last) = self.words.last_mut() {
                *last &= mask;
            }
        }

        self.ones = self.len.saturating_sub(self.ones);
    }

    /// Union of two masks; a zero operand contributes nothing.
    pub fn or(a: &BitVec, b: &BitVec) -> BitVec {
        if a.is_zero() {
            return b.clone();
        }
        if b.is_zero() {
            return a.clone();
        }
        let mut out = a.clone();
        out.or_inplace(b);
        out
    }

    /// Intersection of two masks; a zero operand yields zero.
    pub fn and(a: &BitVec, b: &BitVec) -> BitVec {
        if a.is_zero() || b.is_zero() {
            return BitVec::zero();
        }
        let mut out = a.clone();
        out.and_inplace(b);
        out
    }

    pub fn not(a: &BitVec) -> BitVec {
        let mut out = a.clone();
        out.not_inplace();
        out
    }

    /// `a & !b`.
    pub fn and_not(a: &BitVec, b: &BitVec) -> BitVec {
        if a.is_zero() || b.is_zero() {
            return a.clone();
        }
        BitVec::and(a, &BitVec::not(b))
    }

    /// Expands a zero mask to an explicit all-false mask of `len` bits.
    pub fn expand(&self, len: usize) -> BitVec {
        if self.is_zero() {
            BitVec::with_len_all_false(len)
        } else {
            self.clone()
        }
    }

    /// Collapses an all-false mask back to zero.
    pub fn compact(self) -> BitVec {
        if self.ones == 0 {
            BitVec::zero()
        } else {
            self
        }
    }

    /// Appends all bits of `other` (of logical length `len`, zero meaning all-false).
    pub fn extend_from(&mut self, other: &BitVec, len: usize) {
        if other.is_zero() {
            for _ in 0..len {
                self.push(false);
            }
            return;
        }
        for i in 0..other.len {
            self.push(other.get(i));
        }
    }

    /// Reconstruct a [`BitVec`] from a raw word buffer and a bit length.
    ///
    /// Used by the columnar loader, which stores `u64` words directly.
    pub fn from_words(words: Vec<u64>, len: usize) -> Self {
        if len == 0 {
            return Self::new();
        }

        let full_words = len / 64;
        let rem_bits = len % 64;
        let mut words = words;
        words.resize((len + 63) / 64, 0);
        let mut ones: usize = 0;

        for w in words.iter().take(full_words) {
            ones = ones.saturating_add(w.count_ones() as usize);
        }

        if rem_bits > 0 {
            if let Some(last) = words.get_mut(full_words) {
                *last &= (1u64 << rem_bits) - 1;
                ones = ones.saturating_add(last.count_ones() as usize);
            }
        }

        Self { words, len, ones }
    }
}

impl Default for BitVec {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<bool> for BitVec {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        BitVec::from_bools(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_mask_reads_false() {
        let z = BitVec::zero();
        assert!(z.is_zero());
        assert!(!z.value(12));
        assert!(BitVec::and(&z, &BitVec::with_len_all_true(3)).is_zero());
        assert_eq!(BitVec::or(&z, &BitVec::with_len_all_true(3)).true_count(), 3);
    }

    #[test]
    fn ones_iterates_positions_across_words() {
        let bits = BitVec::from_positions(200, &[0, 63, 64, 130, 199]);
        assert_eq!(bits.positions(), vec![0, 63, 64, 130, 199]);
        assert_eq!(bits.pick(&[199, 1, 64]).positions(), vec![0, 2]);
    }

    #[test]
    fn from_words_masks_the_tail() {
        let bits = BitVec::from_words(vec![u64::MAX], 3);
        assert_eq!(bits.true_count(), 3);
        assert_eq!(bits.as_words(), &[0b111]);
    }

    proptest! {
        #[test]
        fn true_count_of_new_true(n in 0usize..500) {
            prop_assert_eq!(BitVec::with_len_all_true(n).true_count() as usize, n);
        }

        #[test]
        fn or_and_not_partition(a in proptest::collection::vec(any::<bool>(), 1..300), seed in any::<u64>()) {
            let n = a.len();
            let b: Vec<bool> = (0..n).map(|i| (seed >> (i % 64)) & 1 == 1).collect();
            let a = BitVec::from_bools(a);
            let b = BitVec::from_bools(b);
            let either = BitVec::or(&a, &b).true_count();
            let neither = BitVec::and(&BitVec::not(&a), &BitVec::not(&b)).true_count();
            prop_assert_eq!((either + neither) as usize, n);
        }
    }
}
