use alloc::{vec, vec::Vec};

use crate::word::{Addr, WORD_SIZE};

#[derive(Debug, Clone, PartialEq)]
pub enum HeapError {
    /// An allocation would move `here` past the end of the heap.
    Overflow { requested: usize, free: usize },
    /// An access touched bytes outside of the heap.
    OutOfBounds { addr: Addr, len: usize },
}

/// The linear, append-only heap.
///
/// Dictionary headers, compiled code and user data all live here, and every
/// address handed out by the VM is a byte offset into this buffer. `here`
/// only ever moves forward.
pub struct Heap {
    mem: Vec<u8>,
    here: Addr,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        Self {
            mem: vec![0u8; capacity],
            here: 0,
        }
    }

    /// Round `addr` up to the next cell boundary.
    #[inline]
    pub const fn aligned(addr: Addr) -> Addr {
        (addr + (WORD_SIZE - 1)) & !(WORD_SIZE - 1)
    }

    /// Reserve `n` bytes, returning the address of the first one.
    ///
    /// The reserved bytes are not written.
    pub fn allot(&mut self, n: usize) -> Result<Addr, HeapError> {
        let free = self.free();
        if n > free {
            return Err(HeapError::Overflow { requested: n, free });
        }
        let addr = self.here;
        self.here += n;
        Ok(addr)
    }

    /// Zero-pad `here` up to the next cell boundary.
    pub fn align(&mut self) -> Result<Addr, HeapError> {
        let pad = Self::aligned(self.here) - self.here;
        if pad != 0 {
            let start = self.allot(pad)?;
            self.mem[start..start + pad].fill(0);
        }
        Ok(self.here)
    }

    pub fn append_word(&mut self, value: i64) -> Result<Addr, HeapError> {
        let addr = self.allot(WORD_SIZE)?;
        self.write_word(addr, value)?;
        Ok(addr)
    }

    pub fn append_byte(&mut self, value: u8) -> Result<Addr, HeapError> {
        let addr = self.allot(1)?;
        self.write_byte(addr, value)?;
        Ok(addr)
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<Addr, HeapError> {
        let addr = self.allot(bytes.len())?;
        self.mem[addr..addr + bytes.len()].copy_from_slice(bytes);
        Ok(addr)
    }

    pub fn read_word(&self, addr: Addr) -> Result<i64, HeapError> {
        let bytes = self.read_bytes(addr, WORD_SIZE)?;
        let mut cell = [0u8; WORD_SIZE];
        cell.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(cell))
    }

    pub fn write_word(&mut self, addr: Addr, value: i64) -> Result<(), HeapError> {
        let range = self.range(addr, WORD_SIZE)?;
        self.mem[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_byte(&self, addr: Addr) -> Result<u8, HeapError> {
        self.mem
            .get(addr)
            .copied()
            .ok_or(HeapError::OutOfBounds { addr, len: 1 })
    }

    pub fn write_byte(&mut self, addr: Addr, value: u8) -> Result<(), HeapError> {
        let byte = self
            .mem
            .get_mut(addr)
            .ok_or(HeapError::OutOfBounds { addr, len: 1 })?;
        *byte = value;
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: Addr, bytes: &[u8]) -> Result<(), HeapError> {
        let range = self.range(addr, bytes.len())?;
        self.mem[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, addr: Addr, len: usize) -> Result<&[u8], HeapError> {
        let range = self.range(addr, len)?;
        Ok(&self.mem[range])
    }

    fn range(&self, addr: Addr, len: usize) -> Result<core::ops::Range<usize>, HeapError> {
        match addr.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(addr..end),
            _ => Err(HeapError::OutOfBounds { addr, len }),
        }
    }

    #[inline]
    pub fn here(&self) -> Addr {
        self.here
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.here
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.here
    }
}

#[cfg(test)]
pub mod test {
    use super::{Heap, HeapError};
    use crate::word::WORD_SIZE;

    #[test]
    fn do_a_bump() {
        let mut heap = Heap::new(256);

        // Be annoying
        let b = heap.append_byte(0xAA).unwrap();
        assert_eq!(b, 0);
        assert_eq!(heap.here(), 1);

        assert_eq!(heap.align().unwrap(), WORD_SIZE);
        assert_eq!(heap.align().unwrap(), WORD_SIZE);
        assert_eq!(heap.read_bytes(1, WORD_SIZE - 1).unwrap(), &[0u8; WORD_SIZE - 1]);

        for w in 0..10 {
            let addr = heap.append_word(w * 100).unwrap();
            assert_eq!(addr % WORD_SIZE, 0);
            assert_eq!(heap.read_word(addr).unwrap(), w * 100);
        }
        assert_eq!(heap.used(), 11 * WORD_SIZE);
    }

    #[test]
    fn overflow() {
        let mut heap = Heap::new(16);
        heap.append_word(1).unwrap();
        heap.append_byte(2).unwrap();
        assert_eq!(
            heap.append_word(3),
            Err(HeapError::Overflow {
                requested: WORD_SIZE,
                free: 7
            })
        );
        // a failed allocation doesn't move the cursor
        assert_eq!(heap.here(), 9);
        assert_eq!(heap.align().unwrap(), 16);
        assert!(heap.append_byte(0).is_err());
    }

    #[test]
    fn bounds() {
        let mut heap = Heap::new(32);
        assert!(heap.read_word(24).is_ok());
        assert_eq!(
            heap.read_word(25),
            Err(HeapError::OutOfBounds { addr: 25, len: WORD_SIZE })
        );
        assert!(heap.write_word(usize::MAX - 2, 0).is_err());
        assert!(heap.write_byte(32, 0).is_err());
        assert_eq!(heap.read_byte(31), Ok(0));
    }

    #[test]
    fn byte_ranges() {
        let mut heap = Heap::new(16);
        heap.allot(8).unwrap();
        heap.write_bytes(2, b"dup").unwrap();
        assert_eq!(heap.read_bytes(2, 3).unwrap(), b"dup");
        // anywhere in the arena, not just below `here`
        heap.write_bytes(13, b"rot").unwrap();
        assert_eq!(heap.here(), 8);
        assert_eq!(
            heap.write_bytes(14, b"rot"),
            Err(HeapError::OutOfBounds { addr: 14, len: 3 })
        );
    }
}
