use std::collections::HashMap;

/// Sparse, unbounded memory for a single engine.
///
/// Memory layout: `[program image][sparse overflow]`
/// - **Program image**: dense cells holding the loaded program. Every address
///   below its length lives here, including cells the program overwrites.
/// - **Sparse overflow**: cells written beyond the image, allocated on first write.
///
/// Reading a cell that was never written yields zero.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// Dense cells, initialized from the program.
    image: Vec<i64>,
    /// Cells at addresses `>= image.len()` that have been written.
    overflow: HashMap<usize, i64>,
}

impl Memory {
    /// Creates memory whose first cells hold `image`.
    pub fn new(image: Vec<i64>) -> Self {
        Self {
            image,
            overflow: HashMap::new(),
        }
    }

    /// Returns the value at `addr`, or zero if it was never written.
    #[inline]
    pub fn read(&self, addr: usize) -> i64 {
        match self.image.get(addr) {
            Some(value) => *value,
            None => self.overflow.get(&addr).copied().unwrap_or(0),
        }
    }

    /// Stores `value` at `addr`, allocating the cell if needed.
    #[inline]
    pub fn write(&mut self, addr: usize, value: i64) {
        match self.image.get_mut(addr) {
            Some(slot) => *slot = value,
            None => {
                self.overflow.insert(addr, value);
            }
        }
    }

    /// Size of the dense program image.
    pub fn image_len(&self) -> usize {
        self.image.len()
    }

    /// Number of cells currently backed by storage.
    pub fn allocated(&self) -> usize {
        self.image.len() + self.overflow.len()
    }

    /// Returns the cells in `start..end` as a vector.
    pub fn snapshot(&self, start: usize, end: usize) -> Vec<i64> {
        (start..end).map(|addr| self.read(addr)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_cells_read_zero() {
        let mem = Memory::new(vec![1, 2, 3]);
        assert_eq!(mem.read(3), 0);
        assert_eq!(mem.read(1_000_000_000), 0);
        assert_eq!(mem.allocated(), 3);
    }

    #[test]
    fn writes_inside_image_overwrite_in_place() {
        let mut mem = Memory::new(vec![1, 2, 3]);
        mem.write(1, -7);
        assert_eq!(mem.read(1), -7);
        assert_eq!(mem.allocated(), 3);
    }

    #[test]
    fn writes_beyond_image_allocate() {
        let mut mem = Memory::new(vec![99]);
        mem.write(10_000, 42);
        assert_eq!(mem.read(10_000), 42);
        assert_eq!(mem.read(9_999), 0);
        assert_eq!(mem.allocated(), 2);

        mem.write(10_000, 43);
        assert_eq!(mem.read(10_000), 43);
        assert_eq!(mem.allocated(), 2);
    }

    #[test]
    fn snapshot_spans_image_and_overflow() {
        let mut mem = Memory::new(vec![5, 6]);
        mem.write(3, 8);
        assert_eq!(mem.snapshot(0, 5), vec![5, 6, 0, 8, 0]);
    }
}
