//! The dictionary: a singly linked list of entries living in the heap.
//!
//! Each entry is laid out as:
//!
//! ```text
//! +-----------+-------------------+-------------+-----+--------------------
//! | link (8)  | len | flags (8)   | name bytes  | pad | body (codeword ...)
//! +-----------+-------------------+-------------+-----+--------------------
//! ^ entry address                                     ^ body address
//! ```
//!
//! `link` holds the address of the previous entry, or `-1` for the first
//! one. The three highest bits of the length cell are the hidden, immediate
//! and compile-only flags.

use tracing::debug;

use crate::{
    heap::{Heap, HeapError},
    word::{Addr, WORD_SIZE},
    Error,
};

const HIDDEN_FLAG: u64 = 1 << 63;
const IMMEDIATE_FLAG: u64 = 1 << 62;
const COMPILE_ONLY_FLAG: u64 = 1 << 61;
const LEN_MASK: u64 = !(HIDDEN_FLAG | IMMEDIATE_FLAG | COMPILE_ONLY_FLAG);

/// Link value of the oldest entry.
const NO_LINK: i64 = -1;

/// A decoded entry header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryHeader {
    pub link: Option<Addr>,
    pub len: usize,
    pub immediate: bool,
    pub hidden: bool,
    /// The outer interpreter refuses to execute it in run mode.
    pub compile_only: bool,
}

impl EntryHeader {
    fn from_cells(link: i64, len_flags: i64) -> Result<Self, Error> {
        let link = match link {
            NO_LINK => None,
            addr => Some(usize::try_from(addr).map_err(|_| Error::WordToUsizeInvalid(addr))?),
        };
        let bits = len_flags as u64;
        Ok(Self {
            link,
            len: (bits & LEN_MASK) as usize,
            immediate: bits & IMMEDIATE_FLAG != 0,
            hidden: bits & HIDDEN_FLAG != 0,
            compile_only: bits & COMPILE_ONLY_FLAG != 0,
        })
    }
}

/// Root of the entry list.
///
/// The entries themselves live in the [`Heap`]; the dictionary only tracks
/// the most recently defined one.
#[derive(Debug, Default)]
pub struct Dictionary {
    latest: Option<Addr>,
}

impl Dictionary {
    pub const fn new() -> Self {
        Self { latest: None }
    }

    #[inline]
    pub fn latest(&self) -> Option<Addr> {
        self.latest
    }

    /// Create a new (visible) entry header at the end of the heap and make it
    /// the latest entry. The caller appends the body right afterwards.
    pub fn define(&mut self, heap: &mut Heap, name: &[u8], immediate: bool) -> Result<Addr, Error> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let len = u64::try_from(name.len()).map_err(|_| Error::NameTooLong(name.len()))?;
        if len & !LEN_MASK != 0 {
            return Err(Error::NameTooLong(name.len()));
        }
        let flags = if immediate { IMMEDIATE_FLAG } else { 0 };

        // Make sure the whole header fits before writing any of it.
        let header_len = 2 * WORD_SIZE + name.len();
        let pad = Heap::aligned(heap.here()) - heap.here();
        if heap.free() < pad + Heap::aligned(header_len) {
            return Err(HeapError::Overflow {
                requested: pad + Heap::aligned(header_len),
                free: heap.free(),
            }
            .into());
        }

        heap.align()?;
        let link = match self.latest {
            Some(addr) => addr as i64,
            None => NO_LINK,
        };
        let entry = heap.append_word(link)?;
        heap.append_word((len | flags) as i64)?;
        heap.append_bytes(name)?;
        heap.align()?;
        self.latest = Some(entry);

        debug!(
            name = %DisplayName(name),
            entry,
            immediate,
            "defined word"
        );
        Ok(entry)
    }

    pub fn header(&self, heap: &Heap, entry: Addr) -> Result<EntryHeader, Error> {
        let link = heap.read_word(entry)?;
        let len_flags = heap.read_word(entry + WORD_SIZE)?;
        EntryHeader::from_cells(link, len_flags)
    }

    pub fn name<'h>(&self, heap: &'h Heap, entry: Addr) -> Result<&'h [u8], Error> {
        let hdr = self.header(heap, entry)?;
        Ok(heap.read_bytes(entry + 2 * WORD_SIZE, hdr.len)?)
    }

    /// Find the most recent visible entry named exactly `name`.
    pub fn lookup(&self, heap: &Heap, name: &[u8]) -> Result<Option<Addr>, Error> {
        for entry in self.entries(heap) {
            let (addr, hdr) = entry?;
            if hdr.hidden || hdr.len != name.len() {
                continue;
            }
            if heap.read_bytes(addr + 2 * WORD_SIZE, hdr.len)? == name {
                return Ok(Some(addr));
            }
        }
        Ok(None)
    }

    /// The address of the entry's codeword: the first aligned address after
    /// the name.
    pub fn body_address(&self, heap: &Heap, entry: Addr) -> Result<Addr, Error> {
        let hdr = self.header(heap, entry)?;
        Ok(Heap::aligned(entry + 2 * WORD_SIZE + hdr.len))
    }

    pub fn is_immediate(&self, heap: &Heap, entry: Addr) -> Result<bool, Error> {
        Ok(self.header(heap, entry)?.immediate)
    }

    pub fn is_hidden(&self, heap: &Heap, entry: Addr) -> Result<bool, Error> {
        Ok(self.header(heap, entry)?.hidden)
    }

    pub fn is_compile_only(&self, heap: &Heap, entry: Addr) -> Result<bool, Error> {
        Ok(self.header(heap, entry)?.compile_only)
    }

    pub fn toggle_immediate(&self, heap: &mut Heap, entry: Addr) -> Result<(), Error> {
        Self::toggle_flag(heap, entry, IMMEDIATE_FLAG)
    }

    pub fn toggle_hidden(&self, heap: &mut Heap, entry: Addr) -> Result<(), Error> {
        Self::toggle_flag(heap, entry, HIDDEN_FLAG)
    }

    pub fn toggle_compile_only(&self, heap: &mut Heap, entry: Addr) -> Result<(), Error> {
        Self::toggle_flag(heap, entry, COMPILE_ONLY_FLAG)
    }

    fn toggle_flag(heap: &mut Heap, entry: Addr, flag: u64) -> Result<(), Error> {
        let addr = entry + WORD_SIZE;
        let bits = heap.read_word(addr)? as u64;
        heap.write_word(addr, (bits ^ flag) as i64)?;
        Ok(())
    }

    /// Walk every entry, hidden or not, most recent first.
    pub fn entries<'h>(&self, heap: &'h Heap) -> Entries<'h> {
        Entries {
            heap,
            next: self.latest,
        }
    }
}

pub struct Entries<'h> {
    heap: &'h Heap,
    next: Option<Addr>,
}

impl<'h> Iterator for Entries<'h> {
    type Item = Result<(Addr, EntryHeader), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.next.take()?;
        let hdr = match (self.heap.read_word(addr), self.heap.read_word(addr + WORD_SIZE)) {
            (Ok(link), Ok(len_flags)) => EntryHeader::from_cells(link, len_flags),
            (Err(e), _) | (_, Err(e)) => Err(e.into()),
        };
        match hdr {
            Ok(hdr) => {
                // Links always point backwards; anything else is a corrupted
                // heap and would loop forever.
                self.next = hdr.link.filter(|&prev| prev < addr);
                Some(Ok((addr, hdr)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Lossy display of raw name bytes, for logs.
pub(crate) struct DisplayName<'a>(pub(crate) &'a [u8]);

impl core::fmt::Display for DisplayName<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&alloc::string::String::from_utf8_lossy(self.0))
    }
}
