//! Growth policies for a single bucket.
//!
//! A grower owns the "size degree" of one open-addressing table: the slot
//! array holds `1 << size_degree` slots and is considered full at half
//! occupancy. Probing positions are derived from the low bits of the hash.

/// Capacity rule consumed by [`HashTable`](crate::HashTable).
pub trait Grower: Clone + Default {
    /// Current size degree; the buffer holds `1 << size_degree()` slots.
    fn size_degree(&self) -> u8;

    /// Overwrites the size degree.
    fn set_size_degree(&mut self, degree: u8);

    /// Initial degree a fresh grower starts from.
    fn initial_size_degree(&self) -> u8;

    /// Grows the size degree one step.
    fn increase_size(&mut self);

    #[inline]
    fn buf_size(&self) -> usize {
        1usize << self.size_degree()
    }

    #[inline]
    fn max_fill(&self) -> usize {
        1usize << (self.size_degree() - 1)
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buf_size() - 1
    }

    /// Slot where probing for `hash` starts.
    #[inline]
    fn place(&self, hash: u64) -> usize {
        (hash as usize) & self.mask()
    }

    /// Next slot in the probe sequence.
    #[inline]
    fn next(&self, pos: usize) -> usize {
        (pos + 1) & self.mask()
    }

    /// Whether holding `elems` cells requires a larger buffer.
    #[inline]
    fn overflow(&self, elems: usize) -> bool {
        elems > self.max_fill()
    }

    /// Sizes the grower so that `num_elems` cells fit without resizing.
    fn set(&mut self, num_elems: usize) {
        let initial = self.initial_size_degree();
        let degree = if num_elems <= 1 {
            initial
        } else {
            initial.max((num_elems - 1).ilog2() as u8 + 2)
        };
        self.set_size_degree(degree);
    }
}

/// Grower of a standalone table: doubles twice per step until the buffer
/// reaches `2^23` slots, then doubles once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashTableGrower<const INITIAL: u8 = 8> {
    size_degree: u8,
}

impl<const INITIAL: u8> Default for HashTableGrower<INITIAL> {
    fn default() -> Self {
        Self {
            size_degree: INITIAL,
        }
    }
}

impl<const INITIAL: u8> Grower for HashTableGrower<INITIAL> {
    #[inline]
    fn size_degree(&self) -> u8 {
        self.size_degree
    }

    #[inline]
    fn set_size_degree(&mut self, degree: u8) {
        self.size_degree = degree;
    }

    #[inline]
    fn initial_size_degree(&self) -> u8 {
        INITIAL
    }

    fn increase_size(&mut self) {
        self.size_degree += if self.size_degree >= 23 { 1 } else { 2 };
    }
}

/// Grower of a bucket inside a [`TwoLevelHashTable`](crate::TwoLevelHashTable).
///
/// Buckets hold a fraction of the data, so the fast x4 steps stop much
/// earlier, at `2^15` slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TwoLevelHashTableGrower<const INITIAL: u8 = 8> {
    size_degree: u8,
}

impl<const INITIAL: u8> Default for TwoLevelHashTableGrower<INITIAL> {
    fn default() -> Self {
        Self {
            size_degree: INITIAL,
        }
    }
}

impl<const INITIAL: u8> Grower for TwoLevelHashTableGrower<INITIAL> {
    #[inline]
    fn size_degree(&self) -> u8 {
        self.size_degree
    }

    #[inline]
    fn set_size_degree(&mut self, degree: u8) {
        self.size_degree = degree;
    }

    #[inline]
    fn initial_size_degree(&self) -> u8 {
        INITIAL
    }

    fn increase_size(&mut self) {
        self.size_degree += if self.size_degree >= 15 { 1 } else { 2 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_level_grower_slows_down_after_threshold() {
        let mut g = TwoLevelHashTableGrower::<8>::default();
        let mut degrees = vec![g.size_degree()];
        for _ in 0..6 {
            g.increase_size();
            degrees.push(g.size_degree());
        }
        assert_eq!(degrees, vec![8, 10, 12, 14, 16, 17, 18]);
    }

    #[test]
    fn test_flat_grower_threshold() {
        let mut g = HashTableGrower::<22>::default();
        g.increase_size();
        assert_eq!(g.size_degree(), 24);
        g.increase_size();
        assert_eq!(g.size_degree(), 25);
    }

    #[test]
    fn test_set_from_element_count() {
        let mut g = TwoLevelHashTableGrower::<4>::default();
        g.set(0);
        assert_eq!(g.size_degree(), 4);
        g.set(1000);
        // floor(log2(999)) + 2 = 11
        assert_eq!(g.size_degree(), 11);
        assert!(!g.overflow(1000));
    }

    #[test]
    fn test_place_and_next_wrap() {
        let g = HashTableGrower::<3>::default();
        assert_eq!(g.buf_size(), 8);
        assert_eq!(g.max_fill(), 4);
        assert_eq!(g.place(0xFF), 7);
        assert_eq!(g.next(7), 0);
        assert!(g.overflow(5));
    }
}
